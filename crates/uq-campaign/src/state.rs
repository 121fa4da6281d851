//! On-disk campaign state: one CSV per app table plus a JSON manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uq_analysis::AnalysisResult;
use uq_collate::serde::{from_json_slice, to_canonical_json_bytes};
use uq_collate::{load_csv, save_csv, table_digest, CollationTable};
use uq_core::{serde_error, CampaignProvenance, ErrorInfo, RunStatus, SchemaVersion, UqError};

/// Manifest file name inside the campaign work directory.
pub const MANIFEST_FILE: &str = "campaign.json";

/// Schema written into new manifests.
pub const MANIFEST_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Top-level manifest describing persisted campaign state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignManifest {
    /// Schema of this manifest.
    pub schema: SchemaVersion,
    /// Who wrote the state and from which configuration.
    pub provenance: CampaignProvenance,
    /// Completed loop rounds.
    pub rounds: usize,
    /// App new samplers and analyses apply to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_app: Option<String>,
    /// Persisted tables by app name.
    pub apps: BTreeMap<String, AppManifest>,
}

/// Persisted table of one app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppManifest {
    /// Table file, relative to the work directory.
    pub table: String,
    /// Digest of the table contents.
    pub digest: String,
    /// Number of rows.
    pub rows: usize,
    /// Number of failed runs.
    pub failed: usize,
    /// Last analysis result file, relative to the work directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Provenance block for a manifest written now.
pub fn provenance(campaign: &str, config_hash: &str, seed: u64) -> CampaignProvenance {
    let mut tool_versions = BTreeMap::new();
    tool_versions.insert(
        "uq-campaign".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    CampaignProvenance {
        campaign: campaign.to_string(),
        config_hash: config_hash.to_string(),
        seed,
        created_at: Utc::now().to_rfc3339(),
        tool_versions,
    }
}

/// Path of an app's table file.
pub fn table_path(dir: &Path, app: &str) -> PathBuf {
    dir.join(format!("{app}.csv"))
}

/// Writes an app's table (and its last analysis result, if any).
pub fn save_app(
    dir: &Path,
    table: &CollationTable,
    result: Option<&AnalysisResult>,
) -> Result<AppManifest, UqError> {
    let app = table.app();
    save_csv(table, &table_path(dir, app))?;
    let result_file = match result {
        Some(result) => {
            let name = format!("{app}.result.json");
            write_json(&dir.join(&name), result)?;
            Some(name)
        }
        None => None,
    };
    Ok(AppManifest {
        table: format!("{app}.csv"),
        digest: table_digest(table)?,
        rows: table.len(),
        failed: table
            .rows()
            .filter(|row| row.status == RunStatus::Failed)
            .count(),
        result: result_file,
    })
}

/// Writes the manifest into `dir`.
pub fn write_manifest(dir: &Path, manifest: &CampaignManifest) -> Result<(), UqError> {
    write_json(&dir.join(MANIFEST_FILE), manifest)
}

/// Reads the manifest from `dir`.
pub fn read_manifest(dir: &Path) -> Result<CampaignManifest, UqError> {
    let path = dir.join(MANIFEST_FILE);
    let bytes = fs::read(&path).map_err(|err| {
        UqError::Serde(
            ErrorInfo::new("manifest-read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    let manifest: CampaignManifest = from_json_slice(&bytes)?;
    if !MANIFEST_SCHEMA.reads(&manifest.schema) {
        return Err(UqError::Serde(
            ErrorInfo::new("manifest-schema", "manifest written by an incompatible version")
                .with_context(
                    "schema",
                    format!(
                        "{}.{}.{}",
                        manifest.schema.major, manifest.schema.minor, manifest.schema.patch
                    ),
                ),
        ));
    }
    Ok(manifest)
}

/// Reloads one app's table from a campaign directory without re-running.
///
/// The table must match the digest the manifest recorded for it.
pub fn load_table(dir: &Path, app: &str) -> Result<CollationTable, UqError> {
    let manifest = read_manifest(dir)?;
    let entry = manifest.apps.get(app).ok_or_else(|| {
        UqError::Config(
            ErrorInfo::new("app-unknown", "campaign state has no table for this app")
                .with_context("app", app),
        )
    })?;
    let table = load_csv(&dir.join(&entry.table))?;
    if table.app() != app {
        return Err(UqError::Conflict(
            ErrorInfo::new("app-mismatch", "table file belongs to a different app")
                .with_context("expected", app)
                .with_context("found", table.app()),
        ));
    }
    let digest = table_digest(&table)?;
    if digest != entry.digest {
        return Err(UqError::Conflict(
            ErrorInfo::new("table-digest-mismatch", "table changed since the manifest was written")
                .with_context("app", app)
                .with_hint("re-run the campaign or restore the table file"),
        ));
    }
    Ok(table)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), UqError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| serde_error("state-dir", err))?;
    }
    let bytes = to_canonical_json_bytes(value)?;
    fs::write(path, bytes).map_err(|err| serde_error("state-write", err))
}
