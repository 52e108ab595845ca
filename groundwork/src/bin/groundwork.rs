//! groundwork CLI.
//!
//! `provision` and `up` run at container start; `build` runs at image-build
//! time. All failures exit non-zero, so a failed provision leaves the
//! container unhealthy before the service ever binds its port.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use groundwork::build::ImageBuilder;
use groundwork::layout::FilesystemLayout;
use groundwork::options::{BootstrapOptions, BuildOptions};
use groundwork::provision::{self, SessionDefaults};
use groundwork::{Bootstrap, logging};

#[derive(Parser)]
#[command(
    name = "groundwork",
    version,
    about = "Deployment bootstrap: provision a database, build a staged image, launch the service"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ensure required database capabilities exist (idempotent).
    Provision {
        /// Path to the target database.
        #[arg(long)]
        db: PathBuf,
        /// Capability to ensure; repeatable. Defaults to the built-in set.
        #[arg(long = "capability")]
        capabilities: Vec<String>,
    },
    /// Build an image from a build manifest.
    Build {
        /// Build manifest (JSON).
        #[arg(long)]
        manifest: PathBuf,
        /// Build context directory.
        #[arg(long, default_value = ".")]
        context: PathBuf,
        /// Local package store directory.
        #[arg(long)]
        store: PathBuf,
        /// Output directory for the image and its manifest.
        #[arg(long, default_value = "dist")]
        output: PathBuf,
        /// Keep the per-build working tree for inspection.
        #[arg(long)]
        keep_work: bool,
    },
    /// Provision the database, then start the service and wait for readiness.
    Up {
        /// Bootstrap options file (JSON).
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let layout = FilesystemLayout::default_home()?;
    layout.prepare()?;
    logging::init_logging_for(&layout)?;

    match cli.command {
        Command::Provision { db, capabilities } => {
            let names = if capabilities.is_empty() {
                vec![
                    provision::UUID_GENERATION.to_string(),
                    provision::VECTOR_SIMILARITY.to_string(),
                ]
            } else {
                capabilities
            };

            let report = provision::provision_database(&db, &names, SessionDefaults::default())
                .context("provisioning failed")?;
            for (name, outcome) in &report.outcomes {
                println!("{}: {}", name, outcome);
            }
        }
        Command::Build {
            manifest,
            context,
            store,
            output,
            keep_work,
        } => {
            let options = BuildOptions {
                manifest_path: manifest,
                context_dir: context,
                package_store: store,
                output_dir: output,
                builds_dir: layout.builds_dir(),
                keep_work,
            };
            let output = ImageBuilder::new(options)?.build().await.context("build failed")?;
            println!("image: {}", output.image_path.display());
            println!("digest: sha256:{}", output.digest);
            println!("size: {} bytes", output.size_bytes);
        }
        Command::Up { config } => {
            let options = BootstrapOptions::load(&config)?;
            let handle = Bootstrap::new(options)?.run().await.context("bootstrap failed")?;
            println!("service ready (pid {})", handle.pid());
        }
    }

    Ok(())
}
