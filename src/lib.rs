//! A persistent, memory-mapped, fixed-capacity hash-map cache.
//!
//! The entire cache — header, open-addressed index, and key/value payload
//! arena — lives in a single file mapped into the address space of the one
//! process that currently holds its advisory exclusive lock. See
//! [`Table`] for the core API: `create`/`open`/`put`/`get`/`iter`.
//!
//! This crate is not thread-safe within a process — callers must serialize
//! `put`, `get`, and iteration themselves — and makes no attempt at
//! multi-process concurrent access beyond serializing openers through the
//! file lock.

mod error;
mod iter;
mod layout;
mod probe;
mod region;
mod table;

pub use error::{PhmError, Result};
pub use iter::{Entry, Iter};
pub use table::{PutOutcome, Table};
