#![deny(missing_docs)]
#![doc = "Canonical multi-indexed collation of run results: the concurrent table builder, snapshots and flat-file persistence."]

/// Concurrent, idempotent table builder.
pub mod builder;
/// Two-level header CSV persistence.
pub mod csv_io;
/// Canonical hashing helpers.
pub mod hash;
/// Canonical JSON serde helpers.
pub mod serde;
/// Table, row and column types.
pub mod table;

pub use builder::{AddOutcome, CollationBuilder, DecodedOutput, RunOutcome};
pub use csv_io::{load_csv, read_csv, save_csv, to_csv_bytes, write_csv};
pub use hash::{stable_hash_string, table_digest};
pub use table::{CollationTable, Column, ColumnKey, FailedRun, Partition, RunRow, META_COLUMNS};
