use std::path::PathBuf;

use clap::Parser;

/// Crossbar LLM gateway
#[derive(Debug, Parser)]
#[command(name = "crossbar", about = "Model-agnostic LLM gateway with three-tier routing")]
pub struct Args {
    /// Override the listen port
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the registry database path
    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
