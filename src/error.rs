//! Error types returned by the core API.
//!
//! Mirrors the four error kinds described in the design: argument errors,
//! lifecycle I/O errors, close-time I/O errors (reported, never fatal), and
//! logical misses (which are not errors at all — see `Table::get`).

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum PhmError {
    #[error("invalid arguments: table_size = {table_size}, max_assoc_bytes = {max_assoc_bytes}")]
    InvalidArguments {
        table_size: i64,
        max_assoc_bytes: i64,
    },

    #[error(
        "combined key size {key_size} and value size {value_size} greater than max assoc bytes {max_assoc_bytes}"
    )]
    KeyValueTooLarge {
        key_size: usize,
        value_size: usize,
        max_assoc_bytes: u32,
    },

    #[error("key size {key_size} greater than max assoc bytes {max_assoc_bytes}")]
    KeyTooLarge { key_size: usize, max_assoc_bytes: u32 },

    #[error("could not {op} table {path:?}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid table file {path:?}: bad magic")]
    BadMagic { path: PathBuf },

    #[error("table file {path:?} is too short: expected at least {expected} bytes, found {found}")]
    TooShort {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
}

pub type Result<T> = std::result::Result<T, PhmError>;
