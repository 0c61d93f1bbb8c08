use clap::Parser;

/// Travel Time Monitor CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "travel-time-monitor",
    version,
    about = "Periodic travel time monitoring with change notifications"
)]
pub struct Cli {
    /// SQLite database URL
    #[arg(long)]
    pub database_url: Option<String>,

    /// Address the HTTP API listens on
    #[arg(long)]
    pub bind_addr: Option<String>,

    /// Distance Matrix API base URL
    #[arg(long)]
    pub distance_matrix_url: Option<String>,
}
