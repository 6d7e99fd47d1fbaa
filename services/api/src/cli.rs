use crate::demo::{run_demo, run_tier_resolve, DemoArgs, TierResolveArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use retenza::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Retenza",
    about = "Run and explore the Retenza multi-tenant loyalty service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect tier ladders without a running service
    Tiers {
        #[command(subcommand)]
        command: TiersCommand,
    },
    /// Walk one business and its customers through the loyalty workflow
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum TiersCommand {
    /// Resolve which tier a points balance earns
    Resolve(TierResolveArgs),
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
        Command::Tiers {
            command: TiersCommand::Resolve(args),
        } => run_tier_resolve(args),
        Command::Demo(args) => run_demo(args),
    }
}
