use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "backup-octopus")]
#[command(about = "Back up device configurations to local files", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides BACKUP_OCTOPUS_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover handlers and run one backup sweep
    Run,
    /// List the handlers discovery would register
    Discover,
    /// Run the HTTP server
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}
