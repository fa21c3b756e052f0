// Token-oriented record reader with header negotiation and gzip-transparent input.
//
// Schema knowledge lives entirely in the caller: it issues typed reads in the
// order the producing version wrote them. The reader only enforces token shape.
// Reads past the end of the stream yield zero/absent values and set `is_eof`.
use std::collections::VecDeque;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, trace, warn};

use crate::core::alphabet::{Alphabet, Narrow};
use crate::core::error::{Error, ErrorKind};
use crate::core::format::{FileHeader, RecordFormat};
use crate::core::stamp::RecordTime;
use crate::core::stream::{self, Compression, Input};

/// Token denoting "no value" for strings.
pub const ABSENT_TOKEN: &[u8] = b"~";

pub struct RecordReader {
    path: Option<PathBuf>,
    input: Option<Input>,
    header: Option<FileHeader>,
    compression: Compression,
    lookahead: VecDeque<Vec<u8>>,
    eof: bool,
}

impl Default for RecordReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordReader {
    /// A closed reader; use [`RecordReader::open_with`] to attach a file.
    pub fn new() -> Self {
        Self {
            path: None,
            input: None,
            header: None,
            compression: Compression::None,
            lookahead: VecDeque::new(),
            eof: false,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut reader = Self::new();
        reader.open_with(path)?;
        Ok(reader)
    }

    /// Read a record stream from any byte source (gzip is still detected).
    pub fn from_reader<R: Read + Send + 'static>(source: R) -> Result<Self, Error> {
        let mut reader = Self::new();
        let (input, compression) = stream::sniff(source).map_err(|err| Error::io(None, err))?;
        reader.attach(None, input, compression)?;
        Ok(reader)
    }

    /// Close any open stream, then open `path` and negotiate its header.
    ///
    /// Returns the file's version. On failure the reader is left closed.
    pub fn open_with(&mut self, path: impl AsRef<Path>) -> Result<u32, Error> {
        self.close();
        self.path = None;
        let path = path.as_ref();
        let (input, compression) = stream::open_input(path)?;
        self.attach(Some(path.to_path_buf()), input, compression)
            .map_err(|err| match err.path() {
                Some(_) => err,
                None => err.with_path(path),
            })
    }

    fn attach(
        &mut self,
        path: Option<PathBuf>,
        input: Input,
        compression: Compression,
    ) -> Result<u32, Error> {
        self.close();
        self.path = path;
        self.input = Some(input);
        self.compression = compression;
        self.eof = false;

        match FileHeader::parse_tokens(|| self.pull_raw()) {
            Ok(header) => {
                debug!(
                    path = ?self.path,
                    format = ?header.format,
                    version = header.version,
                    compression = ?compression,
                    "opened record stream"
                );
                self.header = Some(header);
                Ok(header.version)
            }
            Err(err) => {
                self.close();
                Err(err)
            }
        }
    }

    pub fn close(&mut self) {
        if self.input.take().is_some() {
            debug!(path = ?self.path, "closed record stream");
        }
        self.header = None;
        self.lookahead.clear();
    }

    pub fn is_open(&self) -> bool {
        self.input.is_some()
    }

    pub fn header(&self) -> Option<FileHeader> {
        self.header
    }

    pub fn version(&self) -> u32 {
        self.header.map(|header| header.version).unwrap_or(0)
    }

    pub fn format(&self) -> Option<RecordFormat> {
        self.header.map(|header| header.format)
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True once any read has run past the end of the stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    fn alphabet(&self) -> Alphabet {
        self.format()
            .map(RecordFormat::alphabet)
            .unwrap_or(Alphabet::Current)
    }

    fn pull_raw(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let Some(input) = self.input.as_mut() else {
            return Ok(None);
        };
        let token = match read_token(input) {
            Ok(Scan::Token(token)) => Some(token),
            Ok(Scan::End) => None,
            Ok(Scan::Cut(partial)) => {
                warn!(path = ?self.path, "record stream cut short; treating as end of stream");
                // A cut decoder fails on every later fill.
                self.input = Some(Box::new(io::empty()));
                partial
            }
            Err(err) => return Err(Error::io(self.path.as_deref(), err)),
        };
        if let Some(token) = &token {
            trace!(token = %String::from_utf8_lossy(token), "pulled token");
        }
        Ok(token)
    }

    fn next_token(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if let Some(token) = self.lookahead.pop_front() {
            return Ok(Some(token));
        }
        let token = self.pull_raw()?;
        if token.is_none() && !self.eof {
            debug!(path = ?self.path, "record stream exhausted");
            self.eof = true;
        }
        Ok(token)
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        let alphabet = self.alphabet();
        Ok(self
            .next_token()?
            .map(|token| alphabet.decode(&token))
            .unwrap_or(0))
    }

    /// Read one integer token and narrow it to `T` without range checks.
    pub fn read_int<T: Narrow>(&mut self) -> Result<T, Error> {
        self.read_u64().map(T::from_wide)
    }

    pub fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u64()? != 0)
    }

    /// Read a decimal floating-point token.
    ///
    /// A malformed token is a `Format` error but the stream stays open and
    /// positioned after the bad token, so callers may keep reading.
    pub fn read_f64(&mut self) -> Result<f64, Error> {
        self.read_float()
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.read_float()
    }

    fn read_float<T: FromStr + Default>(&mut self) -> Result<T, Error> {
        let Some(token) = self.next_token()? else {
            return Ok(T::default());
        };
        parse_decimal(&token).ok_or_else(|| {
            warn!(
                path = ?self.path,
                token = %String::from_utf8_lossy(&token),
                "malformed floating-point token"
            );
            self.token_error(ErrorKind::Format, "malformed floating-point token", &token)
        })
    }

    fn token_error(&self, kind: ErrorKind, message: impl Into<String>, token: &[u8]) -> Error {
        let err = Error::new(kind).with_message(message).with_token(token);
        match &self.path {
            Some(path) => err.with_path(path),
            None => err,
        }
    }

    /// Read a string token as raw bytes; `None` for the `~` sentinel or end of stream.
    ///
    /// Bytes are returned exactly as stored apart from `_` becoming a space,
    /// so non-UTF-8 text from older files survives a load/save cycle through
    /// [`RecordWriter::write_bytes`](crate::core::writer::RecordWriter::write_bytes).
    pub fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let Some(mut token) = self.next_token()? else {
            return Ok(None);
        };
        if token == ABSENT_TOKEN {
            return Ok(None);
        }
        unescape(&mut token);
        Ok(Some(token))
    }

    /// [`read_bytes`](Self::read_bytes) decoded as UTF-8, replacing invalid sequences.
    pub fn read_string(&mut self) -> Result<Option<String>, Error> {
        Ok(self
            .read_bytes()?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Read a string token into a caller buffer and return its length.
    ///
    /// A token longer than `buf` is consumed and reported as a `Truncation`
    /// error; nothing is copied in that case.
    pub fn read_string_into(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        let Some(mut token) = self.next_token()? else {
            return Ok(None);
        };
        if token == ABSENT_TOKEN {
            return Ok(None);
        }
        if token.len() > buf.len() {
            let message = format!(
                "token of {} bytes exceeds buffer of {} bytes",
                token.len(),
                buf.len()
            );
            return Err(self.token_error(ErrorKind::Truncation, message, &token));
        }
        unescape(&mut token);
        buf[..token.len()].copy_from_slice(&token);
        Ok(Some(token.len()))
    }

    /// Read a (seconds within year, year) pair; `(0, 0)` reads as unset.
    pub fn read_time(&mut self) -> Result<Option<RecordTime>, Error> {
        let seconds_in_year = self.read_int::<u32>()?;
        let year = self.read_int::<i32>()?;
        Ok(RecordTime::from_pair(seconds_in_year, year))
    }

    /// Run `read` only when the caller's schema says the field is present.
    ///
    /// Consumes nothing when `present` is false. Getting the flag wrong
    /// desynchronizes every later read; the codec cannot detect that.
    pub fn read_if<T, F>(&mut self, present: bool, read: F) -> Result<Option<T>, Error>
    where
        F: FnOnce(&mut Self) -> Result<T, Error>,
    {
        if !present {
            return Ok(None);
        }
        read(self).map(Some)
    }

    /// Conditional string read; flattens "not present" and "absent" into `None`.
    pub fn read_string_if(&mut self, present: bool) -> Result<Option<String>, Error> {
        Ok(self.read_if(present, Self::read_string)?.flatten())
    }

    /// Up to `count` upcoming tokens, without consuming them.
    pub fn peek_tokens(&mut self, count: usize) -> Result<Vec<String>, Error> {
        while self.lookahead.len() < count {
            match self.pull_raw()? {
                Some(token) => self.lookahead.push_back(token),
                None => break,
            }
        }
        Ok(self
            .lookahead
            .iter()
            .take(count)
            .map(|token| String::from_utf8_lossy(token).into_owned())
            .collect())
    }

    /// Space-joined lookahead for diagnostics; also logged at debug level.
    pub fn show_tokens(&mut self, count: usize) -> Result<String, Error> {
        let shown = self.peek_tokens(count)?.join(" ");
        debug!(path = ?self.path, tokens = %shown, "upcoming tokens");
        Ok(shown)
    }
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

enum Scan {
    Token(Vec<u8>),
    End,
    /// The source stopped short (e.g. a truncated gzip member), with any
    /// partial token gathered before it did.
    Cut(Option<Vec<u8>>),
}

fn read_token<R: BufRead + ?Sized>(input: &mut R) -> io::Result<Scan> {
    let mut token = Vec::new();
    loop {
        let available = match input.fill_buf() {
            Ok(buf) => buf,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(Scan::Cut((!token.is_empty()).then_some(token)));
            }
            Err(err) => return Err(err),
        };
        if available.is_empty() {
            break;
        }
        let mut used = 0;
        let mut complete = false;
        for &byte in available {
            used += 1;
            if is_space(byte) {
                if !token.is_empty() {
                    complete = true;
                    break;
                }
            } else {
                token.push(byte);
            }
        }
        input.consume(used);
        if complete {
            break;
        }
    }
    if token.is_empty() {
        Ok(Scan::End)
    } else {
        Ok(Scan::Token(token))
    }
}

fn unescape(token: &mut [u8]) {
    for byte in token.iter_mut() {
        if *byte == b'_' {
            *byte = b' ';
        }
    }
}

fn parse_decimal<T: FromStr>(token: &[u8]) -> Option<T> {
    std::str::from_utf8(token).ok()?.parse::<T>().ok()
}
