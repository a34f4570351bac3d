//! Framed binary envelope for bulk item reads.
//!
//! A body is a concatenation of independent length-prefixed frames. The last
//! frame is a metadata payload carrying the key table, its own value array
//! and the item list; every preceding frame is a value-extension payload
//! holding one more value array. An item's attributes are (key-index,
//! value-index) pairs, with value indices counting across all value arrays
//! in frame order (the metadata frame's own array last).
//!
//! Decoding is two-pass: first the per-frame value-array lengths are
//! accumulated into a cumulative table, then each value index is resolved by
//! a binary search over that table.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::attributes::{AttrValue, Item};
use crate::error::{Result, V3ioError};

/// Size of the frame length prefix.
const FRAME_LENGTH_FIELD: usize = 4;

const TAG_NOT_EXISTS: u8 = 0;
const TAG_QWORD: u8 = 1;
const TAG_UQWORD: u8 = 2;
const TAG_DFLOAT: u8 = 3;
const TAG_BOOLEAN: u8 = 4;
const TAG_STR: u8 = 5;
const TAG_BLOB: u8 = 6;
const TAG_TIME: u8 = 7;

/// A single frame: a 4-byte little-endian length prefix and a payload.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The frame payload (bytes after the length prefix).
    pub payload: Bytes,
}

impl Frame {
    /// Creates a frame around the given payload.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Writes this frame, prefix included, to the given buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(FRAME_LENGTH_FIELD + self.payload.len());
        dst.put_u32_le(self.payload.len() as u32);
        dst.put_slice(&self.payload);
    }

    /// Reads one frame from the buffer.
    ///
    /// Returns `None` when there isn't a complete frame left.
    pub fn read_from(src: &mut Bytes) -> Option<Self> {
        if src.len() < FRAME_LENGTH_FIELD {
            return None;
        }

        let payload_len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if src.len() < FRAME_LENGTH_FIELD + payload_len {
            return None;
        }

        src.advance(FRAME_LENGTH_FIELD);
        let payload = src.split_to(payload_len);
        Some(Self { payload })
    }
}

/// One value in a frame's value array, tagged by its wire discriminant.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameValue {
    /// The attribute does not exist on this item; skipped when decoding.
    NotExists,
    /// Signed 64-bit integer.
    Qword(i64),
    /// Unsigned 64-bit integer.
    Uqword(u64),
    /// Opaque byte blob.
    Blob(Vec<u8>),
    /// UTF-8 string.
    Str(String),
    /// Double-precision float.
    Dfloat(f64),
    /// Boolean.
    Boolean(bool),
    /// Timestamp as seconds plus nanoseconds.
    Time {
        /// Seconds since the Unix epoch.
        secs: i64,
        /// Nanosecond remainder.
        nanos: u32,
    },
}

impl FrameValue {
    /// Converts this wire value into an attribute value.
    ///
    /// `NotExists` yields `None`; unsigned values fold into the signed
    /// integer kind.
    pub fn into_attr(self) -> Option<AttrValue> {
        match self {
            FrameValue::NotExists => None,
            FrameValue::Qword(v) => Some(AttrValue::Int(v)),
            FrameValue::Uqword(v) => Some(AttrValue::Int(v as i64)),
            FrameValue::Blob(v) => Some(AttrValue::Bytes(v)),
            FrameValue::Str(v) => Some(AttrValue::Str(v)),
            FrameValue::Dfloat(v) => Some(AttrValue::Float(v)),
            FrameValue::Boolean(v) => Some(AttrValue::Bool(v)),
            FrameValue::Time { secs, nanos } => Some(AttrValue::Timestamp { secs, nanos }),
        }
    }

    fn write_to(&self, dst: &mut BytesMut) {
        match self {
            FrameValue::NotExists => dst.put_u8(TAG_NOT_EXISTS),
            FrameValue::Qword(v) => {
                dst.put_u8(TAG_QWORD);
                dst.put_i64_le(*v);
            }
            FrameValue::Uqword(v) => {
                dst.put_u8(TAG_UQWORD);
                dst.put_u64_le(*v);
            }
            FrameValue::Dfloat(v) => {
                dst.put_u8(TAG_DFLOAT);
                dst.put_f64_le(*v);
            }
            FrameValue::Boolean(v) => {
                dst.put_u8(TAG_BOOLEAN);
                dst.put_u8(u8::from(*v));
            }
            FrameValue::Str(v) => {
                dst.put_u8(TAG_STR);
                dst.put_u32_le(v.len() as u32);
                dst.put_slice(v.as_bytes());
            }
            FrameValue::Blob(v) => {
                dst.put_u8(TAG_BLOB);
                dst.put_u32_le(v.len() as u32);
                dst.put_slice(v);
            }
            FrameValue::Time { secs, nanos } => {
                dst.put_u8(TAG_TIME);
                dst.put_i64_le(*secs);
                dst.put_u32_le(*nanos);
            }
        }
    }

    fn read_from(src: &mut Bytes) -> Result<Self> {
        ensure(src, 1, "value tag")?;
        let tag = src.get_u8();
        match tag {
            TAG_NOT_EXISTS => Ok(FrameValue::NotExists),
            TAG_QWORD => {
                ensure(src, 8, "qword")?;
                Ok(FrameValue::Qword(src.get_i64_le()))
            }
            TAG_UQWORD => {
                ensure(src, 8, "uqword")?;
                Ok(FrameValue::Uqword(src.get_u64_le()))
            }
            TAG_DFLOAT => {
                ensure(src, 8, "dfloat")?;
                Ok(FrameValue::Dfloat(src.get_f64_le()))
            }
            TAG_BOOLEAN => {
                ensure(src, 1, "boolean")?;
                Ok(FrameValue::Boolean(src.get_u8() != 0))
            }
            TAG_STR => {
                let bytes = read_len_prefixed(src, "str")?;
                let text = String::from_utf8(bytes)
                    .map_err(|e| V3ioError::Decode(format!("str value is not UTF-8: {e}")))?;
                Ok(FrameValue::Str(text))
            }
            TAG_BLOB => Ok(FrameValue::Blob(read_len_prefixed(src, "blob")?)),
            TAG_TIME => {
                ensure(src, 12, "time")?;
                let secs = src.get_i64_le();
                let nanos = src.get_u32_le();
                Ok(FrameValue::Time { secs, nanos })
            }
            other => Err(V3ioError::Decode(format!("unknown value tag {other}"))),
        }
    }
}

/// A value-extension payload: one more value array.
#[derive(Debug, Clone, Default)]
pub struct ValuesPayload {
    /// The values carried by this frame.
    pub values: Vec<FrameValue>,
}

impl ValuesPayload {
    /// Serialises this payload into a buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        write_values(dst, &self.values);
    }

    /// Parses a value-extension payload.
    pub fn read_from(payload: &Bytes) -> Result<Self> {
        let mut src = payload.clone();
        let values = read_values(&mut src)?;
        Ok(Self { values })
    }
}

/// One item entry in the metadata payload.
#[derive(Debug, Clone)]
pub struct FramedItem {
    /// The item's key (its name inside the table).
    pub name: String,
    /// (key-index, value-index) pairs into the key table and value arrays.
    pub attributes: Vec<(u32, u32)>,
}

/// The trailing metadata payload: key table, value array and item list.
#[derive(Debug, Clone, Default)]
pub struct MetadataPayload {
    /// Attribute names addressed by key index.
    pub keys: Vec<String>,
    /// The metadata frame's own value array, indexed after all extensions.
    pub values: Vec<FrameValue>,
    /// The returned items.
    pub items: Vec<FramedItem>,
}

impl MetadataPayload {
    /// Serialises this payload into a buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.keys.len() as u32);
        for key in &self.keys {
            dst.put_u32_le(key.len() as u32);
            dst.put_slice(key.as_bytes());
        }

        write_values(dst, &self.values);

        dst.put_u32_le(self.items.len() as u32);
        for item in &self.items {
            dst.put_u32_le(item.name.len() as u32);
            dst.put_slice(item.name.as_bytes());
            dst.put_u32_le(item.attributes.len() as u32);
            for (key_index, value_index) in &item.attributes {
                dst.put_u32_le(*key_index);
                dst.put_u32_le(*value_index);
            }
        }
    }

    /// Parses a metadata payload.
    pub fn read_from(payload: &Bytes) -> Result<Self> {
        let mut src = payload.clone();

        ensure(&mut src, 4, "key table length")?;
        let key_count = src.get_u32_le() as usize;
        let mut keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            let bytes = read_len_prefixed(&mut src, "key")?;
            let key = String::from_utf8(bytes)
                .map_err(|e| V3ioError::Decode(format!("key is not UTF-8: {e}")))?;
            keys.push(key);
        }

        let values = read_values(&mut src)?;

        ensure(&mut src, 4, "item list length")?;
        let item_count = src.get_u32_le() as usize;
        let mut items = Vec::with_capacity(item_count);
        for _ in 0..item_count {
            let name_bytes = read_len_prefixed(&mut src, "item name")?;
            let name = String::from_utf8(name_bytes)
                .map_err(|e| V3ioError::Decode(format!("item name is not UTF-8: {e}")))?;

            ensure(&mut src, 4, "attribute pair count")?;
            let pair_count = src.get_u32_le() as usize;
            let mut attributes = Vec::with_capacity(pair_count);
            for _ in 0..pair_count {
                ensure(&mut src, 8, "attribute pair")?;
                let key_index = src.get_u32_le();
                let value_index = src.get_u32_le();
                attributes.push((key_index, value_index));
            }

            items.push(FramedItem { name, attributes });
        }

        Ok(Self { keys, values, items })
    }
}

fn write_values(dst: &mut BytesMut, values: &[FrameValue]) {
    dst.put_u32_le(values.len() as u32);
    for value in values {
        value.write_to(dst);
    }
}

fn read_values(src: &mut Bytes) -> Result<Vec<FrameValue>> {
    ensure(src, 4, "value array length")?;
    let count = src.get_u32_le() as usize;
    let mut values = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        values.push(FrameValue::read_from(src)?);
    }
    Ok(values)
}

fn read_len_prefixed(src: &mut Bytes, what: &str) -> Result<Vec<u8>> {
    ensure(src, 4, what)?;
    let len = src.get_u32_le() as usize;
    ensure(src, len, what)?;
    Ok(src.split_to(len).to_vec())
}

fn ensure(src: &Bytes, needed: usize, what: &str) -> Result<()> {
    if src.len() < needed {
        return Err(V3ioError::Decode(format!(
            "truncated {what}: need {needed} bytes, have {}",
            src.len()
        )));
    }
    Ok(())
}

/// Encodes a complete framed body from extension payloads and the trailing
/// metadata payload. Used by tests and tooling that fabricate server bodies.
pub fn encode_framed_body(extensions: &[ValuesPayload], metadata: &MetadataPayload) -> Bytes {
    let mut body = BytesMut::new();

    for extension in extensions {
        let mut payload = BytesMut::new();
        extension.write_to(&mut payload);
        Frame::new(payload.freeze()).write_to(&mut body);
    }

    let mut payload = BytesMut::new();
    metadata.write_to(&mut payload);
    Frame::new(payload.freeze()).write_to(&mut body);

    body.freeze()
}

/// Decodes a framed body into `(item key, attributes)` pairs.
///
/// Frames are read until the body is exhausted or a framing error stops the
/// scan; at least two frames (one extension, one metadata) must be present.
pub fn decode_framed_items(body: &[u8]) -> Result<Vec<(String, Item)>> {
    let mut src = Bytes::copy_from_slice(body);
    let mut frames = Vec::new();
    while let Some(frame) = Frame::read_from(&mut src) {
        frames.push(frame);
    }

    if frames.len() < 2 {
        return Err(V3ioError::Decode(format!(
            "got {} frames, expected at least 2",
            frames.len()
        )));
    }

    let metadata = MetadataPayload::read_from(&frames[frames.len() - 1].payload)?;

    let mut sections = Vec::with_capacity(frames.len());
    for frame in &frames[..frames.len() - 1] {
        sections.push(ValuesPayload::read_from(&frame.payload)?.values);
    }
    sections.push(metadata.values);

    // cumulative[i] = number of values in sections 0..=i
    let mut cumulative = Vec::with_capacity(sections.len());
    let mut total = 0usize;
    for section in &sections {
        total += section.len();
        cumulative.push(total);
    }

    let mut items = Vec::with_capacity(metadata.items.len());
    for framed in metadata.items {
        let mut attributes = Item::with_capacity(framed.attributes.len());
        for (key_index, value_index) in framed.attributes {
            let name = metadata.keys.get(key_index as usize).ok_or_else(|| {
                V3ioError::Decode(format!("key index {key_index} out of range"))
            })?;
            let value = resolve_value(&sections, &cumulative, value_index as usize)?;
            if let Some(attr) = value.clone().into_attr() {
                attributes.insert(name.clone(), attr);
            }
        }
        items.push((framed.name, attributes));
    }

    Ok(items)
}

/// Resolves a global value index to the section holding it by binary search
/// over the cumulative length table.
fn resolve_value<'a>(
    sections: &'a [Vec<FrameValue>],
    cumulative: &[usize],
    index: usize,
) -> Result<&'a FrameValue> {
    let section = cumulative.partition_point(|&len| len <= index);
    if section >= sections.len() {
        return Err(V3ioError::Decode(format!(
            "value index {index} out of range"
        )));
    }

    let preceding = if section == 0 { 0 } else { cumulative[section - 1] };
    Ok(&sections[section][index - preceding])
}
