//! Materials ledger (BOM) — what upstream facts went into a generated file.
//!
//! The ledger is persisted as the second line of every generated artifact:
//!
//! ```text
//! # Generated from https://example.com/repo/blob/master/app/Dockerfile.tera
//! # BOM: {"apk:musl":"1.2.4-r2","image:base":"0f3c..."}
//!
//! FROM ...
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MaterialsError;

/// Prefix of the header line holding the serialized ledger.
pub const BOM_PREFIX: &str = "# BOM: ";

/// Material identifier → version. Ordered so the serialized form is stable.
pub type Ledger = BTreeMap<String, String>;

/// A single material whose version differs between two ledgers.
///
/// `old` is empty when the material is new; `new` is never empty for changes
/// produced by [`diff`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub material: String,
    pub old: String,
    pub new: String,
}

/// Read the ledger embedded in an existing output file.
///
/// Never fails: a missing file, a missing or malformed header line, or invalid
/// JSON all produce an empty ledger and a warning.
pub fn read_previous(path: &Path) -> Ledger {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_header(&contents, path),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "unable to read existing file for BOM");
            Ledger::new()
        }
    }
}

fn parse_header(contents: &str, path: &Path) -> Ledger {
    let Some(line) = contents.splitn(3, '\n').nth(1) else {
        tracing::warn!(path = %path.display(), "existing file has no BOM line");
        return Ledger::new();
    };
    let Some(json) = line.strip_prefix(BOM_PREFIX) else {
        tracing::warn!(path = %path.display(), "existing file does not appear to have a BOM");
        return Ledger::new();
    };
    match serde_json::from_str::<Ledger>(json.trim_end_matches('\r')) {
        Ok(ledger) => ledger,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "existing file has invalid BOM");
            Ledger::new()
        }
    }
}

/// Changes between two ledgers, ordered by material identifier.
///
/// Only identifiers present in `new` are considered. A material that was
/// recorded previously but is no longer referenced is *not* reported; callers
/// rely on this to keep changelogs free of removal noise.
pub fn diff(old: &Ledger, new: &Ledger) -> Vec<Change> {
    new.iter()
        .filter(|(material, version)| old.get(*material) != Some(*version))
        .map(|(material, version)| Change {
            material: material.clone(),
            old: old.get(material).cloned().unwrap_or_default(),
            new: version.clone(),
        })
        .collect()
}

/// Render the two-line artifact header followed by a blank line.
pub fn header(
    source_link: &str,
    relative_path: &str,
    ledger: &Ledger,
) -> Result<String, MaterialsError> {
    let bom = serde_json::to_string(ledger)?;
    Ok(format!(
        "# Generated from {source_link}{relative_path}\n{BOM_PREFIX}{bom}\n\n"
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
