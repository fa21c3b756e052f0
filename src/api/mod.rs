//! Purpose: Define the stable public Rust API boundary for recfile.
//! Exports: Record reader/writer, flat key-value codec, integer codec, and error types.
//! Role: Public, additive-only surface; callers should not reach into `core` paths.
//! Invariants: Re-exports only; no logic lives here.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::alphabet::{Alphabet, Narrow, Sep};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::flat::{FlatLens, FlatOptions, FlatReader, FlatRecord, FlatWriter};
pub use crate::core::format::{FileHeader, RecordFormat};
pub use crate::core::reader::RecordReader;
pub use crate::core::stamp::RecordTime;
pub use crate::core::stream::Compression;
pub use crate::core::writer::{RecordWriter, WriterOptions};
