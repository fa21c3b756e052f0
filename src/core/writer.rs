// Record writer: always emits the current header and alphabet, plain or gzip.
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::alphabet::{Alphabet, MAX_ENCODED_LEN, Narrow, Sep};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::FileHeader;
use crate::core::reader::ABSENT_TOKEN;
use crate::core::stamp::RecordTime;
use crate::core::stream::{Compression, Sink};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WriterOptions {
    pub version: u32,
    pub compression: Compression,
}

impl WriterOptions {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            compression: Compression::None,
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

pub struct RecordWriter {
    path: PathBuf,
    sink: Option<Sink>,
    version: u32,
}

impl RecordWriter {
    /// Create (or truncate) `path` and write the `vtpos 0 <version>` header.
    ///
    /// The compression choice is fixed for the lifetime of the file.
    pub fn create(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut sink = Sink::create(&path, options.compression)?;
        sink.write_all(&FileHeader::current(options.version).encode())
            .map_err(|err| Error::io(Some(path.as_path()), err))?;
        debug!(
            path = %path.display(),
            version = options.version,
            compression = ?options.compression,
            "created record stream"
        );
        Ok(Self {
            path,
            sink: Some(sink),
            version: options.version,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    pub fn compression(&self) -> Option<Compression> {
        self.sink.as_ref().map(Sink::compression)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let sink = self.sink.as_mut().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("record writer is closed")
                .with_path(&self.path)
        })?;
        sink.write_all(bytes)
            .map_err(|err| Error::io(Some(self.path.as_path()), err))
    }

    /// Encode `value` in the current alphabet followed by `sep`.
    pub fn put_value(&mut self, value: u64, sep: Sep) -> Result<(), Error> {
        let mut digits = [0u8; MAX_ENCODED_LEN];
        let len = Alphabet::Current.encode_into(value, &mut digits);
        self.emit(&digits[..len])?;
        self.emit(&[sep.byte()])
    }

    pub fn write_int<T: Narrow>(&mut self, value: T) -> Result<(), Error> {
        self.put_value(value.to_wide(), Sep::Space)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), Error> {
        self.put_value(u64::from(value), Sep::Space)
    }

    /// Decimal text via `Display`, which never consults the host locale.
    pub fn write_f64(&mut self, value: f64) -> Result<(), Error> {
        self.emit(format!("{value} ").as_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), Error> {
        self.emit(format!("{value} ").as_bytes())
    }

    /// Write a string token. Empty strings become the `~` sentinel.
    ///
    /// Spaces, tildes and other token-breaking whitespace become `_`, and the
    /// reader turns every `_` back into a space, so literal underscores do not
    /// survive a round trip.
    pub fn write_str(&mut self, value: &str) -> Result<(), Error> {
        self.write_bytes(value.as_bytes())
    }

    /// Byte-level form of [`write_str`](Self::write_str); the bytes need not be UTF-8.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), Error> {
        if value.is_empty() {
            return self.write_absent();
        }
        let mut token = escape(value);
        token.push(b' ');
        self.emit(&token)
    }

    pub fn write_string(&mut self, value: Option<&str>) -> Result<(), Error> {
        match value {
            Some(value) => self.write_str(value),
            None => self.write_absent(),
        }
    }

    fn write_absent(&mut self) -> Result<(), Error> {
        self.emit(ABSENT_TOKEN)?;
        self.emit(b" ")
    }

    /// Write `(seconds within year, year)`, or `(0, 0)` when unset.
    pub fn write_time(&mut self, value: Option<RecordTime>) -> Result<(), Error> {
        let (seconds_in_year, year) = RecordTime::to_pair(value);
        self.write_int(seconds_in_year)?;
        self.write_int(year)
    }

    /// Run `write` only when the caller has a value for an optional field.
    pub fn write_if<T, F>(&mut self, value: Option<T>, write: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self, T) -> Result<(), Error>,
    {
        match value {
            Some(value) => write(self, value),
            None => Ok(()),
        }
    }

    /// Terminate the current line. Purely cosmetic for readers.
    pub fn end_record(&mut self) -> Result<(), Error> {
        self.emit(b"\n")
    }

    /// Flush and release the file. Safe to call more than once.
    pub fn close(&mut self) -> Result<(), Error> {
        let Some(sink) = self.sink.take() else {
            return Ok(());
        };
        sink.finish().map_err(|err| Error::io(Some(self.path.as_path()), err))?;
        debug!(path = %self.path.display(), "closed record stream");
        Ok(())
    }
}

impl Drop for RecordWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "implicit close failed");
        }
    }
}

fn escape(value: &[u8]) -> Vec<u8> {
    value
        .iter()
        .map(|&byte| match byte {
            b' ' | b'~' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c => b'_',
            other => other,
        })
        .collect()
}
