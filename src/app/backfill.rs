//! One-shot historical import across (filtered) conversations.

use anyhow::Result;
use serde::Serialize;

use crate::app::import::{ImportSource, Importer, MessageKind};
use crate::app::resolve::Resolver;
use crate::app::walk::{ConversationWalker, HistoryWalker, Pacing, PeerFilter};
use crate::store::Store;
use crate::vk::VkApi;

pub struct BackfillOptions {
    pub filter: PeerFilter,
    pub pacing: Pacing,
    pub show_progress: bool,
}

/// What a backfill run did, so operators see failures as more than a
/// log line.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BackfillReport {
    pub conversations: u64,
    pub imported: u64,
    pub already_present: u64,
    pub failed: u64,
}

/// Walk every matching conversation and import its full history,
/// oldest fetch batch first. One message failing to import is logged
/// and counted; the walk continues.
pub async fn run<A: VkApi>(api: &A, store: &Store, opts: &BackfillOptions) -> Result<BackfillReport> {
    let mut report = BackfillReport::default();
    let resolver = Resolver::new(api, store);
    let importer = Importer::new(api, store);

    let mut conversations = ConversationWalker::new(api, opts.filter.clone(), opts.pacing.clone());
    while let Some(peer_id) = conversations.next().await? {
        let chat = resolver.resolve_chat(peer_id).await?;
        report.conversations += 1;
        if opts.show_progress {
            eprintln!("Backfilling {} ({})…", chat.title, chat.id);
        }

        let mut history = HistoryWalker::new(api, chat.id, &chat.title, opts.pacing.clone());
        while let Some(raw) = history.next().await? {
            match importer
                .import(
                    ImportSource::Payload(raw),
                    MessageKind::New,
                    Some(chat.clone()),
                    None,
                )
                .await
            {
                Ok(outcome) if outcome.created => report.imported += 1,
                Ok(_) => report.already_present += 1,
                Err(e) => {
                    log::error!("Failed to import a message in {}: {:#}", chat.title, e);
                    report.failed += 1;
                }
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{raw_message, temp_store, FakeApi};
    use crate::vk::types::PeerType;

    fn options(filter: PeerFilter) -> BackfillOptions {
        BackfillOptions {
            filter,
            pacing: Pacing::none(),
            show_progress: false,
        }
    }

    #[tokio::test]
    async fn test_backfill_continues_past_failed_import() {
        let (_dir, store) = temp_store().await;
        let mut api = FakeApi {
            conversations: vec![(PeerType::User, 1)],
            history: (1..=10).map(|i| raw_message(i, 10, 1, "m")).collect(),
            ..Default::default()
        };
        // Message #7 comes from an author whose profile fetch fails.
        api.history[6].from_id = 666;
        api.fail_profiles.insert(666);

        let report = run(&api, &store, &options(PeerFilter::all())).await.unwrap();

        assert_eq!(report.conversations, 1);
        assert_eq!(report.imported, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(store.count_messages(1, None).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_backfill_rerun_is_idempotent() {
        let (_dir, store) = temp_store().await;
        let api = FakeApi {
            conversations: vec![(PeerType::User, 1)],
            history: (1..=5).map(|i| raw_message(i, 10, 1, "m")).collect(),
            ..Default::default()
        };

        let first = run(&api, &store, &options(PeerFilter::all())).await.unwrap();
        assert_eq!(first.imported, 5);
        assert_eq!(first.already_present, 0);

        let second = run(&api, &store, &options(PeerFilter::all())).await.unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.already_present, 5);
        assert_eq!(store.count_messages(1, None).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_backfill_respects_filter() {
        let (_dir, store) = temp_store().await;
        let api = FakeApi {
            conversations: vec![(PeerType::Group, -5), (PeerType::User, 1)],
            history: (1..=3).map(|i| raw_message(i, 10, 1, "m")).collect(),
            ..Default::default()
        };

        let filter = PeerFilter::Kinds([PeerType::User].into_iter().collect());
        let report = run(&api, &store, &options(filter)).await.unwrap();

        assert_eq!(report.conversations, 1);
        // Only the user conversation's chat row was created.
        assert!(store.get_chat(1).await.unwrap().is_some());
        assert!(store.get_chat(-5).await.unwrap().is_none());
    }
}
