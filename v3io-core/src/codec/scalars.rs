//! Header-embedded scalar formats: the transaction-verifier mtime pair and
//! the dual-base file mode.

use crate::error::{Result, V3ioError};

/// Parses the transaction-verifier header.
///
/// The header has the literal shape
/// `__mtime_secs==<n> and __mtime_nsecs==<n>`; any other shape is an error.
pub fn parse_mtime_header(header: &str) -> Result<(i64, i64)> {
    let mut mtime_secs = None;
    let mut mtime_nsecs = None;

    for expression in header.split("and") {
        let (key, value) = expression.split_once("==").ok_or_else(|| {
            V3ioError::Decode(format!("missing '==' in mtime expression: {expression:?}"))
        })?;

        let parsed = value.trim().parse::<i64>().map_err(|e| {
            V3ioError::Decode(format!("mtime value {:?}: {e}", value.trim()))
        })?;

        match key.trim() {
            "__mtime_secs" => mtime_secs = Some(parsed),
            "__mtime_nsecs" => mtime_nsecs = Some(parsed),
            other => {
                return Err(V3ioError::Decode(format!(
                    "unexpected symbol '{other}' in transaction verifier"
                )))
            }
        }
    }

    match (mtime_secs, mtime_nsecs) {
        (Some(secs), Some(nsecs)) => Ok((secs, nsecs)),
        _ => Err(V3ioError::Decode(format!(
            "incomplete transaction verifier: {header:?}"
        ))),
    }
}

/// Type bits of a decoded file mode (everything above the permission and
/// sticky/setuid range).
const FILE_TYPE_MASK: u32 = 0xffff_0000;
/// Directory bit after the octal remap.
const MODE_DIR: u32 = 1 << 31;
/// Upper file-type nibble in the POSIX octal rendering.
const S_IFMT: u64 = 0xf000;
/// Permission, sticky and set-id bits.
const IP_OFFMASK: u64 = 0x1fff;

/// A decoded file mode.
///
/// Listing APIs render modes in octal (`"0100664"`) while scan APIs render
/// the same mode in decimal (`"33204"`); both decode to a mode answering the
/// same `is_regular`/`is_dir`/`permissions` queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(u32);

impl FileMode {
    /// Returns the raw decoded bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` for a regular file (no type bits set).
    pub fn is_regular(self) -> bool {
        self.0 & FILE_TYPE_MASK == 0
    }

    /// Returns `true` for a directory.
    pub fn is_dir(self) -> bool {
        self.0 & MODE_DIR != 0
    }

    /// Returns the permission bits (`rwxrwxrwx`).
    pub fn permissions(self) -> u32 {
        self.0 & 0o777
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

/// Decodes a server-supplied file mode string.
///
/// A leading `0` selects the octal rendering, whose upper file-type nibble is
/// remapped (shifted left by 17, low 13 bits kept) so that directories land
/// on the high type bit and regular files carry no type bits. Anything else
/// is parsed as base-10 directly.
pub fn decode_file_mode(mode: &str) -> Result<FileMode> {
    if mode.starts_with('0') {
        let octal = u64::from_str_radix(mode, 8)
            .map_err(|e| V3ioError::Decode(format!("octal file mode {mode:?}: {e}")))?;
        let remapped = ((octal & S_IFMT) << 17) | (octal & IP_OFFMASK);
        return Ok(FileMode(remapped as u32));
    }

    let decimal = mode
        .parse::<u32>()
        .map_err(|e| V3ioError::Decode(format!("decimal file mode {mode:?}: {e}")))?;
    Ok(FileMode(decimal))
}
