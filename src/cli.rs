use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;
use tracing::{error, info, warn};

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "bindsworth")]
#[command(about = "Boost.Python bindings from C++ declaration dumps")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default Bindsworth.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Generate the binding sources
    Generate {
        /// Declaration dump file or directory; repeatable, overrides the configuration
        #[arg(short, long)]
        dump: Vec<PathBuf>,

        /// Output directory for the generated sources
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// One source file per top-level class or enum
        #[arg(long)]
        split: bool,

        /// Fail on unresolved dependencies
        #[arg(long)]
        strict: bool,
    },

    /// Report unresolved dependencies and naming conflicts without writing
    Check {
        #[arg(short, long)]
        dump: Vec<PathBuf>,

        /// Fail on unresolved dependencies
        #[arg(long)]
        strict: bool,
    },

    /// Print the filtered declaration tree
    Print {
        #[arg(short, long)]
        dump: Vec<PathBuf>,

        /// Only declarations with this plain or qualified name
        #[arg(short, long)]
        name: Option<String>,
    },
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path } => {
                engine.init(path).await
            }
            Commands::Generate { dump, output, split, strict } => {
                let report = engine.generate(dump, output, split, strict).await?;
                for written in &report.written {
                    info!("Wrote {}", written.display());
                }
                Ok(())
            }
            Commands::Check { dump, strict } => {
                let diagnostics = engine.check(dump, strict).await?;
                for warning in &diagnostics.warnings {
                    warn!("{}", warning);
                }
                for err in &diagnostics.errors {
                    error!("{}", err);
                }
                if !diagnostics.errors.is_empty() {
                    anyhow::bail!("check failed with {} errors", diagnostics.errors.len());
                }
                Ok(())
            }
            Commands::Print { dump, name } => {
                println!("{}", engine.print(dump, name).await?);
                Ok(())
            }
        }
    }
}
