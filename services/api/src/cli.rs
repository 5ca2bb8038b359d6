use crate::demo::{run_demo, run_due, DemoArgs, DueArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use fleet_compliance::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Fleet Compliance Engine",
    about = "Track vehicle compliance obligations, raise renewal alerts, and run the scan service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the scan scheduler and operational HTTP endpoints (default command)
    Serve(ServeArgs),
    /// Compute the next due date for one obligation from its rule inputs
    Due(DueArgs),
    /// Run an in-memory walkthrough: register, scan, renew, rescan
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Due(args) => run_due(args),
        Command::Demo(args) => run_demo(args),
    }
}
