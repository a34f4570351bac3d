//! Core wire types and codecs for the v3io data service.

#![warn(missing_docs)]

pub mod codec;
pub mod error;

pub use codec::{
    decode_file_mode, decode_framed_items, decode_item, encode_item, parse_mtime_header,
    AttrValue, FileMode, FrameValue, FramedItem, Item,
};
pub use error::{ErrorResponse, Result, V3ioError};
