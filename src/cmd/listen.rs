use crate::app::{listen, App};
use crate::shutdown;
use crate::Cli;
use anyhow::Result;

pub async fn run(cli: &Cli) -> Result<()> {
    let app = App::new(cli).await?;
    listen::run(&app, &shutdown::global()).await
}
