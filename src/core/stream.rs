// Byte-stream plumbing: gzip sniffing on input, plain or gzip sinks on output.
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;

use crate::core::error::Error;

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

pub type Input = Box<dyn BufRead + Send>;

pub fn open_input(path: &Path) -> Result<(Input, Compression), Error> {
    let file = File::open(path).map_err(|err| Error::io(Some(path), err))?;
    sniff(file).map_err(|err| Error::io(Some(path), err))
}

/// Wrap `reader` so that gzip content is decompressed on the fly and anything
/// else passes through untouched.
pub fn sniff<R: Read + Send + 'static>(reader: R) -> io::Result<(Input, Compression)> {
    let mut buffered = BufReader::new(reader);
    let mut magic = [0u8; 2];
    let seen = peek_prefix(&mut buffered, &mut magic)?;
    if seen == GZIP_MAGIC.len() && magic == GZIP_MAGIC {
        let decoder = MultiGzDecoder::new(buffered);
        return Ok((Box::new(BufReader::new(decoder)), Compression::Gzip));
    }
    Ok((Box::new(buffered), Compression::None))
}

// Fills `out` from the reader's buffer without consuming anything. A short
// first fill on a pipe can leave fewer bytes than requested; that is treated
// as "not gzip".
fn peek_prefix<R: Read>(reader: &mut BufReader<R>, out: &mut [u8]) -> io::Result<usize> {
    let available = reader.fill_buf()?;
    let n = available.len().min(out.len());
    out[..n].copy_from_slice(&available[..n]);
    Ok(n)
}

pub enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    pub fn create(path: &Path, compression: Compression) -> Result<Self, Error> {
        let file = File::create(path).map_err(|err| Error::io(Some(path), err))?;
        let writer = BufWriter::new(file);
        Ok(match compression {
            Compression::None => Sink::Plain(writer),
            Compression::Gzip => {
                Sink::Gzip(GzEncoder::new(writer, flate2::Compression::default()))
            }
        })
    }

    pub fn compression(&self) -> Compression {
        match self {
            Sink::Plain(_) => Compression::None,
            Sink::Gzip(_) => Compression::Gzip,
        }
    }

    /// Flush everything to the OS, writing the gzip trailer if compressed.
    pub fn finish(self) -> io::Result<()> {
        let mut inner = match self {
            Sink::Plain(writer) => writer,
            Sink::Gzip(encoder) => encoder.finish()?,
        };
        inner.flush()
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(writer) => writer.write(buf),
            Sink::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(writer) => writer.flush(),
            Sink::Gzip(encoder) => encoder.flush(),
        }
    }
}
