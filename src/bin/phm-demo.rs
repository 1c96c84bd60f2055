//! Demo inserter: creates a table and performs a small scripted sequence
//! of inserts, then prints every entry. Mirrors the reference `main.c` —
//! uses only the public `persistent_hashmap` API.
use std::process::ExitCode;

use persistent_hashmap::Table;

fn main() -> ExitCode {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "phm-demo".to_string());
    let (path, table_size, max_assoc_bytes) = match (args.next(), args.next(), args.next()) {
        (Some(path), Some(table_size), Some(max_assoc_bytes)) => {
            let table_size: i64 = match table_size.parse() {
                Ok(v) => v,
                Err(_) => return usage(&program),
            };
            let max_assoc_bytes: i64 = match max_assoc_bytes.parse() {
                Ok(v) => v,
                Err(_) => return usage(&program),
            };
            (path, table_size, max_assoc_bytes)
        }
        _ => return usage(&program),
    };

    let mut table = match Table::create(&path, table_size, max_assoc_bytes) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let inserts: &[(u64, &str, &str, i64, i64)] = &[
        (5, "firstkey", "firstvalue", 9, 0),
        (5, "expiredkey", "expiredvalue", 2, 0),
        (5, "secondkey", "secondvalue", 9, 0),
        (5, "expiredkey2", "expiredvalue2", 3, 0),
        (5, "mykey2", "myvalue2", 2, 0),
        (5, "mykey2", "myvalue2redux", 4, 3),
    ];

    for (hash, key, value, expiry, now) in inserts {
        if let Err(e) = table.put(*hash, key.as_bytes(), value.as_bytes(), *expiry, *now) {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    }

    for entry in table.iter() {
        print_entry(entry);
    }

    ExitCode::SUCCESS
}

fn print_entry(entry: persistent_hashmap::Entry<'_>) {
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

fn usage(program: &str) -> ExitCode {
    eprintln!("Usage: {program} table_path table_size max_assoc_bytes");
    ExitCode::FAILURE
}
