//! The `blinkdb` binary: open the engine, bind the listener, serve.

use anyhow::Result;
use clap::Parser;
use engine::{Config, Engine};
use server::Server;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(
    name = "blinkdb",
    version,
    about = "LSM key-value store speaking the Redis line protocol"
)]
struct Args {
    /// TCP port to listen on
    #[arg(long, default_value_t = 9001)]
    port: u16,

    /// Memtable size in megabytes before a flush is forced
    #[arg(long, default_value_t = 4)]
    memory: usize,

    /// Database directory
    #[arg(long, default_value = "blinkdb_data")]
    data_dir: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("startup failed: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::new(&args.data_dir)
        .with_memtable_max_bytes(args.memory * 1024 * 1024);

    info!(dir = %args.data_dir.display(), memory_mb = args.memory, "opening engine");
    let engine = Arc::new(Engine::open(config)?);

    let server = Server::bind(("0.0.0.0", args.port), engine)?;
    info!(port = args.port, "blinkdb listening");
    server.run()
}
