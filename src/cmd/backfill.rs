use crate::app::backfill::{self, BackfillOptions};
use crate::app::walk::{Pacing, PeerFilter};
use crate::app::App;
use crate::out;
use crate::Cli;
use anyhow::{Context, Result};
use clap::Args;
use std::io::{self, Write};

#[derive(Args, Debug, Clone)]
pub struct BackfillArgs {
    /// Conversation filter: all, kind names (user,chat,group,email),
    /// or a comma-separated list of peer ids. Prompted when omitted.
    #[arg(long)]
    pub filter: Option<String>,

    /// Suppress per-conversation progress output
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

pub async fn run(cli: &Cli, args: &BackfillArgs) -> Result<()> {
    let app = App::new(cli).await?;

    let spec = match &args.filter {
        Some(spec) => spec.clone(),
        None => prompt_filter()?,
    };
    let filter = PeerFilter::parse(&spec)?;

    let opts = BackfillOptions {
        filter,
        pacing: Pacing::default(),
        show_progress: !args.quiet && !cli.output.is_json(),
    };

    let report = backfill::run(&app.vk, &app.store, &opts).await?;

    if cli.output.is_json() {
        out::write_json(&report)?;
    } else if !cli.output.is_none() {
        eprintln!(
            "Backfill complete. Conversations: {}, imported: {}, already present: {}, failed: {}",
            report.conversations, report.imported, report.already_present, report.failed
        );
    }
    Ok(())
}

fn prompt_filter() -> Result<String> {
    print!("Filter by [user, chat, group, email, all, or peer ids]: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read filter")?;
    Ok(input.trim().to_string())
}
