pub mod export;
pub mod inspect;
pub mod sync;

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::hierarchy::{ParsedBackup, parse_backup};

/// Reads and parses a backup file; the file name is kept for the export
/// index and artifact names.
pub fn load_backup(path: &Path) -> Result<ParsedBackup> {
    if !path.is_file() {
        bail!("backup file does not exist: {}", path.display());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read backup file: {}", path.display()))?;
    let file_name = path.file_name().and_then(|name| name.to_str());
    parse_backup(&raw, file_name)
        .with_context(|| format!("failed to parse backup file: {}", path.display()))
}
