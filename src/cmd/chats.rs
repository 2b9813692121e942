use crate::out;
use crate::store::Store;
use crate::Cli;
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum ChatsCommand {
    /// List archived chats
    List {
        /// Title substring filter
        #[arg(long)]
        query: Option<String>,
    },
    /// Show a single chat
    Show {
        /// Peer ID
        id: i64,
    },
}

pub async fn run(cli: &Cli, cmd: &ChatsCommand) -> Result<()> {
    let store = Store::open(&cli.store_dir()).await?;

    match cmd {
        ChatsCommand::List { query } => {
            let chats = store.list_chats(query.as_deref()).await?;

            if cli.output.is_json() {
                out::write_json(&serde_json::json!({
                    "chats": chats,
                }))?;
            } else if !cli.output.is_none() {
                println!("{:<14} {:<40} {:<10} {}", "ID", "TITLE", "MESSAGES", "LAST");
                for c in &chats {
                    let last = c
                        .last_message_ts
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!(
                        "{:<14} {:<40} {:<10} {}",
                        c.id,
                        out::truncate(&c.title, 38),
                        c.message_count,
                        last,
                    );
                }
            }
        }
        ChatsCommand::Show { id } => {
            let chat = store.get_chat(*id).await?;
            match chat {
                Some(c) => {
                    let count = store.count_messages(c.id, None).await?;
                    if cli.output.is_json() {
                        out::write_json(&serde_json::json!({
                            "chat": c,
                            "message_count": count,
                        }))?;
                    } else if !cli.output.is_none() {
                        println!("ID: {}", c.id);
                        println!("Title: {}", c.title);
                        println!("Photo: {}", c.photo);
                        println!("Messages: {}", count);
                    }
                }
                None => {
                    anyhow::bail!("Chat {} not found", id);
                }
            }
        }
    }
    Ok(())
}
