use crate::out;
use crate::store::Store;
use crate::Cli;
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum MessagesCommand {
    /// List messages in a chat, newest first
    List {
        /// Chat (peer) ID
        #[arg(long)]
        chat: i64,
        /// Limit results
        #[arg(long, default_value = "50")]
        limit: i64,
        /// Page number (pages of `limit`)
        #[arg(long, default_value = "1")]
        page: i64,
    },
    /// Search messages by text or author title substring
    Search {
        /// Search phrase
        query: String,
        /// Chat (peer) ID
        #[arg(long)]
        chat: i64,
        /// Limit results
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

pub async fn run(cli: &Cli, cmd: &MessagesCommand) -> Result<()> {
    let store = Store::open(&cli.store_dir()).await?;

    match cmd {
        MessagesCommand::List { chat, limit, page } => {
            let page = (*page).max(1);
            let msgs = store
                .list_message_views(*chat, None, *limit, (page - 1) * limit)
                .await?;
            print_views(cli, &msgs)?;
        }
        MessagesCommand::Search { query, chat, limit } => {
            let msgs = store
                .list_message_views(*chat, Some(query), *limit, 0)
                .await?;
            print_views(cli, &msgs)?;
        }
    }
    Ok(())
}

fn print_views(cli: &Cli, msgs: &[crate::store::MessageView]) -> Result<()> {
    if cli.output.is_json() {
        out::write_json(&serde_json::json!({
            "messages": msgs,
        }))?;
    } else if !cli.output.is_none() {
        println!(
            "{:<20} {:<12} {:<22} {}",
            "TIME", "ID", "FROM", "TEXT"
        );
        for m in msgs {
            let ts = m.date.format("%Y-%m-%d %H:%M:%S").to_string();
            println!(
                "{:<20} {:<12} {:<22} {}",
                ts,
                m.remote_id,
                out::truncate(&m.author_title, 20),
                out::truncate(&m.text, 80),
            );
        }
    }
    Ok(())
}
