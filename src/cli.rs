use crate::error::AppError;
use crate::server;
use crate::walkthrough::{run_walkthrough_demo, WalkthroughArgs};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Civic Intake",
    about = "Run the conversational complaint-intake service and form walkthroughs from the command line",
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
    /// Inspect and drive dynamic complaint forms
    Form {
        #[command(subcommand)]
        command: FormCommand,
    },
}

#[derive(Subcommand, Debug)]
enum FormCommand {
    /// Replay a scripted conversation over the sample complaint form
    Walkthrough(WalkthroughArgs),
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
        Command::Form {
            command: FormCommand::Walkthrough(args),
        } => run_walkthrough_demo(args).await,
    }
}
