use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to a yaml config file. Environment variables override it.
    #[clap(short, long, global = true, env = "SAGA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the http server (default)
    Serve {
        /// Listen address, e.g. 127.0.0.1:8000. Overrides HOST and PORT.
        #[clap(short, long)]
        listen: Option<String>,
    },

    /// Print the supported embedding models as json
    Models,

    /// Encode image files with the configured model and print the
    /// embeddings as json
    EncodeImages {
        #[clap(required = true)]
        files: Vec<PathBuf>,

        /// Images encoded per group
        #[clap(short, long)]
        batch_size: Option<usize>,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Serve { listen: None }
    }
}
