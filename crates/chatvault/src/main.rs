#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use chatvault::cli::app::{Cli, Command, RuntimeArgs};
use chatvault::cli::commands;
use chatvault::config::{MissingTokenError, RuntimePaths};
use chatvault::models::BackupParseError;
use chatvault::notion::{SchemaResolutionError, SyncStopped};
use clap::Parser;
use clap::error::ErrorKind;

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_INPUT_FAILURE: i32 = 2;
const EXIT_STOPPED: i32 = 3;
const EXIT_USAGE_ERROR: i32 = 64;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return exit_code_for_parse_error(error),
    };
    let command_name = command_name(&cli.command);
    println!("chatvault: starting `{command_name}`");

    match execute(cli) {
        Ok(()) => {
            println!("chatvault: completed `{command_name}` (exit_code={EXIT_SUCCESS})");
            EXIT_SUCCESS
        }
        Err(error) if error.downcast_ref::<SyncStopped>().is_some() => {
            println!("chatvault: stopped `{command_name}` (exit_code={EXIT_STOPPED})");
            println!("{error}");
            EXIT_STOPPED
        }
        Err(error) => {
            let exit_code = classify_runtime_error(&error);
            eprintln!("chatvault: failed `{command_name}` (exit_code={exit_code})");
            eprintln!("{error:#}");
            exit_code
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    let runtime_paths = resolve_runtime_paths(&cli.runtime)?;
    match cli.command {
        Command::Inspect(args) => commands::inspect::run(&args, &runtime_paths),
        Command::Export(args) => commands::export::run(&args, &runtime_paths),
        Command::Sync(args) => {
            let stop = Arc::new(AtomicBool::new(false));
            let handler_flag = Arc::clone(&stop);
            ctrlc::set_handler(move || {
                handler_flag.store(true, Ordering::SeqCst);
            })
            .map_err(|error| anyhow!("failed to install Ctrl-C handler: {error}"))?;
            commands::sync::run(&args, &runtime_paths, &stop)
        }
    }
}

fn classify_runtime_error(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<BackupParseError>().is_some()
        || error.downcast_ref::<SchemaResolutionError>().is_some()
        || error.downcast_ref::<MissingTokenError>().is_some()
    {
        EXIT_INPUT_FAILURE
    } else {
        EXIT_RUNTIME_FAILURE
    }
}

fn exit_code_for_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            EXIT_SUCCESS
        }
        _ => {
            let _ = error.print();
            EXIT_USAGE_ERROR
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Inspect(_) => "inspect",
        Command::Export(_) => "export",
        Command::Sync(_) => "sync",
    }
}

fn resolve_runtime_paths(args: &RuntimeArgs) -> Result<RuntimePaths> {
    let home_dir = match &args.home_dir {
        Some(path) => path.clone(),
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("HOME is not set; pass --home-dir"))?,
    };

    let cwd = match &args.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    chatvault::config::resolve_runtime_paths(&home_dir, &cwd, args.out_dir.as_deref())
}
