use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start glance as a service.
    Daemon {},

    /// Reconcile a folder's metadata and vector index against its files.
    Scan {
        /// Folder to scan
        folder: String,
    },

    /// Annotate one image with the vision model and store the result.
    Annotate {
        /// Folder the image lives in
        folder: String,

        /// Image path relative to the folder
        path: String,
    },

    /// Search a folder by meaning or keyword.
    Search {
        /// Folder to search
        folder: String,

        /// Query text; omit to list every image
        query: Option<String>,

        /// Print the count
        #[clap(short = 'c', long, default_value = "false")]
        count: bool,
    },
}
