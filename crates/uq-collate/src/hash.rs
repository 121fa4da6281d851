use serde::Serialize;
use sha2::{Digest, Sha256};
use uq_core::UqError;

use crate::csv_io::to_csv_bytes;
use crate::serde::to_canonical_json_bytes;
use crate::table::CollationTable;

/// Computes a stable SHA256 hash for the provided serializable value.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, UqError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// Digest of the persisted CSV form of a table.
///
/// Two tables with the same digest reload to the same cells, so the manifest
/// uses it to detect a table edited behind the campaign's back.
pub fn table_digest(table: &CollationTable) -> Result<String, UqError> {
    let bytes = to_csv_bytes(table)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
