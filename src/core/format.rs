//! Purpose: Record file header negotiation and the format/alphabet policy it implies.
//! Exports: `RecordFormat`, `FileHeader`, header prefix constants.
//! Role: Decides once per stream which alphabet governs the integer tokens after it.
//! Invariants: Writers only ever emit the current header; legacy is read-only.
//! Invariants: Header version numbers are plain decimal in both formats.

use serde::Serialize;

use crate::core::alphabet::Alphabet;
use crate::core::error::{Error, ErrorKind};

pub const LEGACY_PREFIX: &[u8] = b"version_";
pub const CURRENT_MAGIC: &[u8] = b"vtpos";
pub const CURRENT_RESERVED: u32 = 0;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    Legacy,
    Current,
}

impl RecordFormat {
    pub fn alphabet(self) -> Alphabet {
        match self {
            RecordFormat::Legacy => Alphabet::Legacy,
            RecordFormat::Current => Alphabet::Current,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct FileHeader {
    pub format: RecordFormat,
    pub version: u32,
}

impl FileHeader {
    pub fn current(version: u32) -> Self {
        Self {
            format: RecordFormat::Current,
            version,
        }
    }

    /// Header bytes as written by `RecordWriter`: `vtpos 0 <version>\n`.
    pub fn encode(&self) -> Vec<u8> {
        format!("vtpos {CURRENT_RESERVED} {}\n", self.version).into_bytes()
    }

    /// Parse a header from the leading tokens of a stream.
    ///
    /// `next_token` yields successive whitespace-delimited tokens and `None`
    /// at end of stream. Exactly one token is consumed for a legacy header and
    /// three for a current header.
    pub fn parse_tokens<F>(mut next_token: F) -> Result<Self, Error>
    where
        F: FnMut() -> Result<Option<Vec<u8>>, Error>,
    {
        let first = next_token()?.ok_or_else(|| {
            Error::new(ErrorKind::Format).with_message("stream ended before header")
        })?;

        if let Some(rest) = first.strip_prefix(LEGACY_PREFIX) {
            let version = parse_version(rest).map_err(|err| err.with_token(&first))?;
            return Ok(Self {
                format: RecordFormat::Legacy,
                version,
            });
        }

        if first.starts_with(CURRENT_MAGIC) {
            // Reserved field; historically always 0 and never checked.
            next_token()?.ok_or_else(truncated_header)?;
            let raw = next_token()?.ok_or_else(truncated_header)?;
            let version = parse_version(&raw).map_err(|err| err.with_token(&raw))?;
            return Ok(Self {
                format: RecordFormat::Current,
                version,
            });
        }

        Err(Error::new(ErrorKind::Format)
            .with_message("unrecognized record header")
            .with_token(&first))
    }
}

fn truncated_header() -> Error {
    Error::new(ErrorKind::Format).with_message("stream ended inside header")
}

fn parse_version(raw: &[u8]) -> Result<u32, Error> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.parse::<u32>().ok())
        .ok_or_else(|| Error::new(ErrorKind::Format).with_message("header version is not a number"))
}
