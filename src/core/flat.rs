//! Purpose: Line-oriented `key<delim> value` persistence, independent of the record formats.
//! Exports: `FlatReader`, `FlatWriter`, `FlatOptions`, `FlatRecord`.
//! Role: Small settings-style files; plain text only, never compressed.
//! Invariants: `#` starts a comment unless the preceding byte is a backslash.
//! Invariants: A backslash drops itself and the byte after it from key and value.
//! Invariants: The writer never escapes; callers own what they put on a line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_DELIMITER: u8 = b':';

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FlatOptions {
    pub delimiter: u8,
}

impl Default for FlatOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

impl FlatOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Result<Self, Error> {
        if matches!(delimiter, b'#' | b'\\' | b'\n' | b'\r') {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("{:?} cannot be used as a delimiter", delimiter as char)));
        }
        self.delimiter = delimiter;
        Ok(self)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FlatRecord {
    pub key: String,
    pub value: String,
}

/// Lengths written into the caller's buffers by [`FlatReader::read`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FlatLens {
    pub key: usize,
    pub value: usize,
}

pub struct FlatReader {
    path: Option<PathBuf>,
    input: Option<Box<dyn BufRead + Send>>,
    options: FlatOptions,
    line: Vec<u8>,
    line_no: u64,
}

impl FlatReader {
    pub fn open(path: impl AsRef<Path>, options: FlatOptions) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| Error::io(Some(path), err))?;
        let mut reader = Self::new(BufReader::new(file), options);
        reader.path = Some(path.to_path_buf());
        Ok(reader)
    }

    pub fn new<R: BufRead + Send + 'static>(input: R, options: FlatOptions) -> Self {
        Self {
            path: None,
            input: Some(Box::new(input)),
            options,
            line: Vec::new(),
            line_no: 0,
        }
    }

    pub fn close(&mut self) {
        self.input = None;
    }

    /// Line number of the most recently consumed line (1-based).
    pub fn line_no(&self) -> u64 {
        self.line_no
    }

    /// Fill `key` and `value` with the next record, truncating silently at
    /// each buffer's capacity.
    ///
    /// Returns `None` at end of stream or once the reader is closed.
    pub fn read(&mut self, key: &mut [u8], value: &mut [u8]) -> Result<Option<FlatLens>, Error> {
        let Some((k, v)) = self.next_fields()? else {
            return Ok(None);
        };
        let key_len = k.len().min(key.len());
        key[..key_len].copy_from_slice(&k[..key_len]);
        let value_len = v.len().min(value.len());
        value[..value_len].copy_from_slice(&v[..value_len]);
        Ok(Some(FlatLens {
            key: key_len,
            value: value_len,
        }))
    }

    pub fn next_record(&mut self) -> Result<Option<FlatRecord>, Error> {
        Ok(self.next_fields()?.map(|(key, value)| FlatRecord {
            key: key.to_str_lossy().into_owned(),
            value: value.to_str_lossy().into_owned(),
        }))
    }

    fn next_fields(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, Error> {
        loop {
            let Some(input) = self.input.as_mut() else {
                return Ok(None);
            };
            self.line.clear();
            let more = read_line(input.as_mut(), &mut self.line)
                .map_err(|err| Error::io(self.path.as_deref(), err))?;
            if !more {
                return Ok(None);
            }
            self.line_no += 1;
            if let Some(fields) = parse_line(&self.line, self.options.delimiter) {
                return Ok(Some(fields));
            }
            debug!(line = self.line_no, "skipped flat line without a record");
        }
    }
}

// Reads one line into `line`, excluding its terminator. `\n`, `\r\n` and a
// bare `\r` all end a line. Returns false at end of input.
fn read_line<R: BufRead + ?Sized>(input: &mut R, line: &mut Vec<u8>) -> io::Result<bool> {
    let mut seen = false;
    loop {
        let available = match input.fill_buf() {
            Ok(buf) => buf,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if available.is_empty() {
            return Ok(seen);
        }
        seen = true;
        match available.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(end) => {
                let terminator = available[end];
                line.extend_from_slice(&available[..end]);
                input.consume(end + 1);
                if terminator == b'\r' && input.fill_buf()?.first() == Some(&b'\n') {
                    input.consume(1);
                }
                return Ok(true);
            }
            None => {
                let n = available.len();
                line.extend_from_slice(available);
                input.consume(n);
            }
        }
    }
}

fn parse_line(line: &[u8], delimiter: u8) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut key = Vec::new();
    let mut value = Vec::new();
    let mut in_value = false;
    let mut bytes = line.iter().copied();
    while let Some(byte) = bytes.next() {
        match byte {
            b'\\' => {
                bytes.next();
            }
            b'#' | b'\n' | b'\r' => break,
            b if b == delimiter && !in_value => in_value = true,
            b if in_value => value.push(b),
            b => key.push(b),
        }
    }
    if !in_value {
        return None;
    }
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_vec(), value.trim().to_vec()))
}

pub struct FlatWriter {
    path: PathBuf,
    output: Option<BufWriter<File>>,
    options: FlatOptions,
}

impl FlatWriter {
    pub fn create(path: impl AsRef<Path>, options: FlatOptions) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|err| Error::io(Some(path.as_path()), err))?;
        Ok(Self {
            path,
            output: Some(BufWriter::new(file)),
            options,
        })
    }

    /// Emit `key<delim> value\n` exactly as given.
    pub fn write(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let output = self.output.as_mut().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("flat writer is closed")
                .with_path(&self.path)
        })?;
        let mut line = Vec::with_capacity(key.len() + value.len() + 3);
        line.extend_from_slice(key.as_bytes());
        line.push(self.options.delimiter);
        line.push(b' ');
        line.extend_from_slice(value.as_bytes());
        line.push(b'\n');
        output
            .write_all(&line)
            .map_err(|err| Error::io(Some(self.path.as_path()), err))
    }

    pub fn write_record(&mut self, record: &FlatRecord) -> Result<(), Error> {
        self.write(&record.key, &record.value)
    }

    pub fn close(&mut self) -> Result<(), Error> {
        let Some(mut output) = self.output.take() else {
            return Ok(());
        };
        output
            .flush()
            .map_err(|err| Error::io(Some(self.path.as_path()), err))
    }
}

impl Drop for FlatWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "implicit close failed");
        }
    }
}
