//! blockheap CLI
//!
//! Inspect and maintain the table files of a data directory.

use std::process::ExitCode;

use blockheap::{Config, HeapError, TableStore};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// blockheap CLI
#[derive(Parser, Debug)]
#[command(name = "blockheap-cli")]
#[command(about = "Inspect blockheap table files")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./blockheap_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the tables in the data directory
    List,

    /// Show a table's trailer and block lists
    Info {
        /// The table to inspect
        table: String,
    },

    /// Walk a table's block lists and check their links
    Verify {
        /// The table to verify
        table: String,
    },

    /// Delete a table file
    Drop {
        /// The table to delete
        table: String,
    },
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blockheap=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    tracing::debug!("blockheap CLI v{}", blockheap::VERSION);

    let config = Config::builder().data_dir(&args.data_dir).build();
    let store = match TableStore::new(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open data directory {}: {}", args.data_dir, e);
            return ExitCode::FAILURE;
        }
    };

    match run(&store, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_corruption() {
                tracing::error!("Table is corrupt: {}", e);
            } else {
                tracing::error!("{}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(store: &TableStore, command: Commands) -> Result<(), HeapError> {
    match command {
        Commands::List => {
            for name in store.list_tables()? {
                println!("{}", name);
            }
        }
        Commands::Info { table } => {
            let info = store.open(&table)?;
            println!("table:            {}", info.name);
            println!("file length:      {} bytes", info.file_len);
            println!("schema blob:      {} bytes", info.schema.len());
            println!("row record size:  {} bytes", info.row_record_size());
            println!("block size:       {} bytes", info.block_size());
            println!("rows per block:   {}", info.rows_per_block());
            println!("data list head:   {}", describe(info.trailer.data_list_head));
            println!("free list head:   {}", describe(info.trailer.free_list_head));
        }
        Commands::Verify { table } => {
            let report = store.verify(&table)?;
            println!("{}", report);
            println!("ok");
        }
        Commands::Drop { table } => {
            store.remove(&table)?;
            tracing::info!("Dropped table {}", table);
        }
    }
    Ok(())
}

fn describe(link: Option<blockheap::storage::BlockOffset>) -> String {
    link.map_or_else(|| "none".to_string(), |offset| offset.to_string())
}
