//! Table viewer: opens an existing table and prints its header followed by
//! every live entry. Mirrors the reference `table_viewer.c` — uses only
//! the public `persistent_hashmap` API.
use std::process::ExitCode;

use persistent_hashmap::{Entry, Table};

fn main() -> ExitCode {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "phm-view".to_string());
    let path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("Usage: {program} table_path");
            return ExitCode::FAILURE;
        }
    };

    let table = match Table::open(&path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "HEADER: table size = {}, max assoc bytes = {}, next free assoc = {}",
        table.table_size(),
        table.max_assoc_bytes(),
        table.next_free_assoc(),
    );

    for entry in table.iter() {
        print_entry(entry);
    }

    ExitCode::SUCCESS
}

fn print_entry(entry: Entry<'_>) {
    println!(
        "hash = {}, expiry = {}, assoc_offset = {}, key_size = {}, value_size = {}, key = {}, value = {}",
        entry.hash,
        entry.expiry,
        entry.assoc_offset,
        entry.key.len(),
        entry.value.len(),
        String::from_utf8_lossy(entry.key),
        String::from_utf8_lossy(entry.value),
    );
}
