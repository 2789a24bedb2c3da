//! CLI entry point for cbl.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Code-Based Linking CLI
#[derive(Parser, Debug)]
#[command(name = "cbl", version, about = "Link this device with Login with Amazon")]
pub struct Cli {
    /// Config file (defaults to ~/.cbl/config.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Link this device: show a code and wait for the user to confirm it
    Login,
    /// Show the device identity and whether a refresh token is stored
    Status,
    /// Forget the stored refresh token
    Logout,
    /// Keep the access token fresh until interrupted
    Run(RunArgs),
}

/// Arguments for `cbl run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Start a new login when no refresh token is stored
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub login: bool,
}
