#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod hierarchy;
pub mod models;
pub mod notion;
pub mod render;
pub mod utils;

pub use cli::app::{Cli, Command};
