//! kindling CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use config::ClusterConfig;
pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// kindling - local kind clusters with a batteries-included add-on stack
#[derive(Parser, Debug)]
#[command(name = "kindling")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a cluster and install every add-on
    Create(commands::create::CreateArgs),
    /// Delete a cluster and its host DNS entry
    Delete(commands::delete::DeleteArgs),
    /// Print every generated document without running anything
    Render(commands::render::RenderArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Create(args) => commands::create::run(args).await,
            Commands::Delete(args) => commands::delete::run(args).await,
            Commands::Render(args) => commands::render::run(args),
        }
    }
}
