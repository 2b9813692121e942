//! Event-feed loop: long-poll events into the importer.

use anyhow::Result;
use std::time::Duration;

use crate::app::import::{ImportSource, Importer, MessageKind};
use crate::app::App;
use crate::shutdown::ShutdownController;
use crate::vk::longpoll::{Event, LongPoller};

/// Pause after a failed poll before reconnecting.
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

pub async fn run(app: &App, shutdown: &ShutdownController) -> Result<()> {
    let importer = Importer::new(&app.vk, &app.store);
    let mut poller = LongPoller::connect(&app.vk).await?;
    eprintln!("Listening for new messages (Ctrl+C to stop)…");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("Listener stopping");
                return Ok(());
            }
            events = poller.next_events() => {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        log::error!("Long poll error: {:#}", e);
                        tokio::time::sleep(POLL_ERROR_DELAY).await;
                        poller = LongPoller::connect(&app.vk).await?;
                        continue;
                    }
                };
                for event in events {
                    let (message_id, kind) = match event {
                        Event::NewMessage { message_id } => (message_id, MessageKind::New),
                        Event::EditedMessage { message_id } => (message_id, MessageKind::Edited),
                    };
                    // One bad message must not stop the feed.
                    if let Err(e) = importer
                        .import(ImportSource::Id(message_id), kind, None, None)
                        .await
                    {
                        log::error!("Failed to import message {}: {:#}", message_id, e);
                    }
                }
            }
        }
    }
}
