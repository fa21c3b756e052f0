// Core modules implementing the record codecs, stream plumbing, and error modeling.
pub mod alphabet;
pub mod error;
pub mod flat;
pub mod format;
pub mod reader;
pub mod stamp;
pub mod stream;
pub mod writer;
