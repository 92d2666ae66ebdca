use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::RuntimePaths;
use crate::render::archive::{
    ExportFormat, archive_stem, artifact_path, write_directory, write_zip_archive,
};
use crate::render::render_tree;

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[arg(long, value_enum, default_value_t = ExportFormat::Zip)]
    pub format: ExportFormat,

    /// Artifact name stem; defaults to the input file name.
    #[arg(long)]
    pub name: Option<String>,
}

pub fn run(args: &ExportArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let input = runtime_paths.resolve(&args.input)?;
    println!(
        "export: start input={} format={} out_dir={}",
        input.display(),
        args.format.as_str(),
        runtime_paths.out_dir.display()
    );

    let parsed = super::load_backup(&input)?;
    println!(
        "export: parsed agents={} sessions={} topics={} messages={}",
        parsed.stats.agent_count,
        parsed.stats.session_count,
        parsed.stats.topic_count,
        parsed.stats.message_count
    );

    let export = render_tree(&parsed);
    let stem = archive_stem(args.name.as_deref(), parsed.source_file_name.as_deref());
    let target = artifact_path(&runtime_paths.out_dir, &stem, args.format);
    let entries = match args.format {
        ExportFormat::Zip => write_zip_archive(&target, &export)?,
        ExportFormat::Dir => write_directory(&target, &export)?,
    };

    println!(
        "export: complete documents={} entries={} path={}",
        export.document_count(),
        entries,
        target.display()
    );
    Ok(())
}
