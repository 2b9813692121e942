pub mod auth;
pub mod backfill;
pub mod chats;
pub mod clear;
pub mod completions;
pub mod listen;
pub mod messages;
pub mod serve;
pub mod version;

use crate::Cli;
use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Store the VK access token
    Auth(auth::AuthArgs),
    /// Run the event-feed logger (archives new messages as they arrive)
    Listen,
    /// Import full conversation histories
    Backfill(backfill::BackfillArgs),
    /// Serve the web viewer over the archive
    Serve(serve::ServeArgs),
    /// List archived chats
    Chats {
        #[command(subcommand)]
        cmd: chats::ChatsCommand,
    },
    /// List and search archived messages
    Messages {
        #[command(subcommand)]
        cmd: messages::MessagesCommand,
    },
    /// Clear the local archive (keeps the token)
    Clear(clear::ClearArgs),
    /// Show version info
    Version,
    /// Generate shell completions
    Completions {
        /// Shell type to generate completions for
        #[arg(value_enum)]
        shell: completions::ShellType,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Auth(args) => auth::run(&cli, args).await,
        Command::Listen => listen::run(&cli).await,
        Command::Backfill(args) => backfill::run(&cli, args).await,
        Command::Serve(args) => serve::run(&cli, args).await,
        Command::Chats { cmd } => chats::run(&cli, cmd).await,
        Command::Messages { cmd } => messages::run(&cli, cmd).await,
        Command::Clear(args) => clear::run(&cli, args).await,
        Command::Version => {
            version::run(&cli);
            Ok(())
        }
        Command::Completions { shell } => completions::run(shell),
    }
}
