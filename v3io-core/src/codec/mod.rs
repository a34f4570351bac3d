//! Wire codecs: typed-attribute envelopes, framed binary bodies and
//! the small scalar formats the service embeds in headers.

mod attributes;
mod frames;
mod scalars;

pub use attributes::{decode_item, encode_item, AttrValue, Item};
pub use frames::{
    decode_framed_items, encode_framed_body, Frame, FrameValue, FramedItem, MetadataPayload,
    ValuesPayload,
};
pub use scalars::{decode_file_mode, parse_mtime_header, FileMode};
