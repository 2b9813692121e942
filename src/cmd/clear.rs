use crate::out;
use crate::store::Store;
use crate::Cli;
use anyhow::Result;
use clap::Args;
use std::io::{self, Write};

#[derive(Args, Debug, Clone)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub confirm: bool,
}

pub async fn run(cli: &Cli, args: &ClearArgs) -> Result<()> {
    let store = Store::open(&cli.store_dir()).await?;

    if !cli.output.is_json() && !args.confirm {
        print!("This deletes every archived message, chat and author. Are you sure? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input != "y" && input != "yes" {
            println!("Aborted.");
            return Ok(());
        }
    }

    // Messages first so the FK references are gone before their targets.
    let messages = store.clear_messages().await?;
    let chats = store.clear_chats().await?;
    let authors = store.clear_authors().await?;

    if cli.output.is_json() {
        out::write_json(&serde_json::json!({
            "cleared": true,
            "deleted": {
                "messages": messages,
                "chats": chats,
                "authors": authors,
            }
        }))?;
    } else if !cli.output.is_none() {
        println!("Cleared:");
        println!("  - {} messages", messages);
        println!("  - {} chats", chats);
        println!("  - {} authors", authors);
    }

    Ok(())
}
