use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::commands::{export::ExportArgs, inspect::InspectArgs, sync::SyncArgs};

#[derive(Debug, Parser)]
#[command(
    name = "chatvault",
    version,
    about = "Turn chat-assistant backups into Markdown archives or Notion pages"
)]
pub struct Cli {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    #[arg(long, global = true, value_name = "PATH")]
    pub home_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the reconstructed assistant / session / topic tree.
    Inspect(InspectArgs),
    /// Write the tree as Markdown documents (zip archive or directory).
    Export(ExportArgs),
    /// Push the tree into Notion as pages or linked database records.
    Sync(SyncArgs),
}
