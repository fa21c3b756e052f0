//! Purpose: Token record file codec library used by the `recfile` CLI and callers that persist state.
//! Exports: `api` (stable surface) and `core` (codec primitives, kept public for tests).
//! Role: Turns ordered typed read/write calls into byte-exact record files and back.
//! Invariants: Header format and version are fixed per open stream.
//! Invariants: Schema knowledge stays with callers; the codec only checks token shape.
pub mod api;
pub mod core;
