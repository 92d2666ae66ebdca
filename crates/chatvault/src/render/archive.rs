use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::layout::MarkdownExport;

pub const DEFAULT_ARCHIVE_STEM: &str = "chat-export";
const ARCHIVE_SUFFIX: &str = "-markdown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Zip,
    Dir,
}

impl ExportFormat {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Dir => "dir",
        }
    }
}

/// Stem used to name export artifacts: an explicit name wins, then the
/// source file name without its extension, then `chat-export`.
#[must_use]
pub fn archive_stem(explicit_name: Option<&str>, source_file_name: Option<&str>) -> String {
    let from_source = source_file_name.and_then(|name| {
        Path::new(name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
    });
    let candidate = explicit_name
        .map(str::to_string)
        .or(from_source)
        .unwrap_or_default();
    super::layout::safe_filename(&candidate, DEFAULT_ARCHIVE_STEM)
}

#[must_use]
pub fn artifact_path(out_dir: &Path, stem: &str, format: ExportFormat) -> PathBuf {
    match format {
        ExportFormat::Zip => out_dir.join(format!("{stem}{ARCHIVE_SUFFIX}.zip")),
        ExportFormat::Dir => out_dir.join(format!("{stem}{ARCHIVE_SUFFIX}")),
    }
}

/// Writes every export entry into a deflated zip archive and returns the
/// number of entries written.
pub fn write_zip_archive(path: &Path, export: &MarkdownExport) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("failed to create archive directory {}", parent.display())
        })?;
    }

    let file = File::create(path)
        .with_context(|| format!("failed to create archive {}", path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in &export.files {
        zip.start_file(entry.path.as_str(), options)
            .with_context(|| format!("failed to start archive entry {}", entry.path))?;
        zip.write_all(entry.content.as_bytes())
            .with_context(|| format!("failed to write archive entry {}", entry.path))?;
    }
    zip.finish()
        .with_context(|| format!("failed to finalize archive {}", path.display()))?;

    Ok(export.files.len())
}

/// Writes the export tree under `root`, creating intermediate directories.
pub fn write_directory(root: &Path, export: &MarkdownExport) -> Result<usize> {
    for entry in &export.files {
        let relative = Path::new(&entry.path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, std::path::Component::ParentDir))
        {
            bail!("refusing to write export entry outside {}: {}", root.display(), entry.path);
        }

        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create export directory {}", parent.display())
            })?;
        }
        std::fs::write(&target, &entry.content)
            .with_context(|| format!("failed to write export file {}", target.display()))?;
    }

    Ok(export.files.len())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{ExportFormat, archive_stem, artifact_path};

    #[test]
    fn stem_prefers_explicit_name_then_source_file() {
        assert_eq!(archive_stem(Some("my export"), Some("lobe.json")), "my_export");
        assert_eq!(archive_stem(None, Some("lobe-backup.json")), "lobe-backup");
        assert_eq!(archive_stem(None, None), "chat-export");
        assert_eq!(archive_stem(Some("  "), None), "chat-export");
    }

    #[test]
    fn artifact_paths_follow_format() {
        let out = Path::new("/tmp/out");
        assert_eq!(
            artifact_path(out, "backup", ExportFormat::Zip),
            Path::new("/tmp/out/backup-markdown.zip")
        );
        assert_eq!(
            artifact_path(out, "backup", ExportFormat::Dir),
            Path::new("/tmp/out/backup-markdown")
        );
    }
}
