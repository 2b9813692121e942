use crate::shutdown;
use crate::web;
use crate::Cli;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind the viewer on
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: String,
}

pub async fn run(cli: &Cli, args: &ServeArgs) -> Result<()> {
    // TraceLayer speaks tracing, not log; give it a subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    web::serve(cli.store_dir(), &args.bind, shutdown::global()).await
}
