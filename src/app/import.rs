//! Idempotent message importer.
//!
//! A stored message is keyed by (remote id, kind); importing a pair the
//! store already holds returns the existing row with no side effects,
//! which makes overlapping backfill ranges and event replays safe.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::app::resolve::Resolver;
use crate::store::{Author, Chat, NewMessageParams, Store, StoredMessage};
use crate::vk::types::RawMessage;
use crate::vk::VkApi;

/// Reply chains come from remote input; bound the recursion.
const MAX_REPLY_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    New,
    Edited,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::New => "n",
            MessageKind::Edited => "e",
        }
    }
}

/// Importer input: a full payload, or a bare remote id to fetch first.
#[derive(Debug, Clone)]
pub enum ImportSource {
    Id(i64),
    Payload(RawMessage),
}

impl ImportSource {
    fn remote_id(&self) -> i64 {
        match self {
            ImportSource::Id(id) => *id,
            ImportSource::Payload(m) => m.id,
        }
    }
}

pub struct ImportOutcome {
    pub message: StoredMessage,
    /// False when the idempotency probe found an existing row.
    pub created: bool,
}

pub struct Importer<'a, A: VkApi> {
    api: &'a A,
    store: &'a Store,
}

impl<'a, A: VkApi> Importer<'a, A> {
    pub fn new(api: &'a A, store: &'a Store) -> Self {
        Importer { api, store }
    }

    /// Import one message. `chat`/`author` rows may be supplied by callers
    /// that already resolved them (the backfill loop); otherwise they are
    /// resolved here, created on first sight.
    pub async fn import(
        &self,
        source: ImportSource,
        kind: MessageKind,
        chat: Option<Chat>,
        author: Option<Author>,
    ) -> Result<ImportOutcome> {
        self.import_at_depth(source, kind, chat, author, 0).await
    }

    fn import_at_depth(
        &self,
        source: ImportSource,
        kind: MessageKind,
        chat: Option<Chat>,
        author: Option<Author>,
        depth: usize,
    ) -> BoxFuture<'_, Result<ImportOutcome>> {
        Box::pin(async move {
            if depth > MAX_REPLY_DEPTH {
                anyhow::bail!(
                    "Reply chain for message {} exceeds depth {}",
                    source.remote_id(),
                    MAX_REPLY_DEPTH
                );
            }

            let remote_id = source.remote_id();

            // Idempotency probe. New-message rows are the primary key space;
            // an edit of an already-archived message is also a no-op.
            if let Some(existing) = self
                .store
                .get_message_by_remote(remote_id, MessageKind::New.as_str())
                .await?
            {
                log::debug!("Message {} already archived as #{}", remote_id, existing.id);
                return Ok(ImportOutcome {
                    message: existing,
                    created: false,
                });
            }
            if kind != MessageKind::New {
                if let Some(existing) = self
                    .store
                    .get_message_by_remote(remote_id, kind.as_str())
                    .await?
                {
                    return Ok(ImportOutcome {
                        message: existing,
                        created: false,
                    });
                }
            }

            let raw = match source {
                ImportSource::Payload(m) => m,
                ImportSource::Id(id) => self.api.message_by_id(id).await?,
            };

            let resolver = Resolver::new(self.api, self.store);
            let chat = match chat {
                Some(c) => c,
                None => resolver.resolve_chat(raw.peer_id).await?,
            };
            let author = match author {
                Some(a) => a,
                None => resolver.resolve_author(raw.from_id).await?,
            };

            // Best-effort: a missing reply/forward author must not sink
            // the import itself.
            if let Some(reply) = &raw.reply_message {
                if let Err(e) = resolver.resolve_author(reply.from_id).await {
                    log::warn!("Failed to resolve reply author {}: {:#}", reply.from_id, e);
                }
            }
            for fwd in &raw.fwd_messages {
                if let Err(e) = resolver.resolve_author(fwd.from_id).await {
                    log::warn!("Failed to resolve forward author {}: {:#}", fwd.from_id, e);
                }
            }

            // The reply is archived before its parent, so the reference
            // always points at an existing row and chains stay acyclic.
            let reply_to_id = match &raw.reply_message {
                Some(reply) => {
                    let outcome = self
                        .import_at_depth(
                            ImportSource::Payload((**reply).clone()),
                            MessageKind::New,
                            None,
                            None,
                            depth + 1,
                        )
                        .await?;
                    Some(outcome.message.id)
                }
                None => None,
            };

            let stored = self
                .store
                .insert_message(NewMessageParams {
                    remote_id: raw.id,
                    kind: kind.as_str().to_string(),
                    chat_id: chat.id,
                    author_id: author.id,
                    attachments: serde_json::to_string(&raw.attachments)?,
                    forwards: serde_json::to_string(&raw.fwd_messages)?,
                    date: DateTime::from_timestamp(raw.date, 0).unwrap_or_else(Utc::now),
                    reply_to_id,
                    text: raw.text,
                })
                .await?;

            log::info!(
                "Archived message {} by {} in {}",
                stored.remote_id,
                author.title,
                chat.title
            );
            Ok(ImportOutcome {
                message: stored,
                created: true,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{raw_message, temp_store, FakeApi};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_import_is_idempotent() {
        let (_dir, store) = temp_store().await;
        let api = FakeApi::default();
        let importer = Importer::new(&api, &store);
        let payload = raw_message(100, 10, 1, "hello");

        let first = importer
            .import(ImportSource::Payload(payload.clone()), MessageKind::New, None, None)
            .await
            .unwrap();
        assert!(first.created);

        let fetches_after_first = api.profile_fetches.load(Ordering::SeqCst);

        let second = importer
            .import(ImportSource::Payload(payload), MessageKind::New, None, None)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.message.id, first.message.id);

        // No extra external calls, no extra rows.
        assert_eq!(api.profile_fetches.load(Ordering::SeqCst), fetches_after_first);
        assert_eq!(store.count_messages(1, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_import_by_bare_id_fetches_payload() {
        let (_dir, store) = temp_store().await;
        let mut api = FakeApi::default();
        api.messages_by_id.insert(300, raw_message(300, 10, 1, "fetched"));
        let importer = Importer::new(&api, &store);

        let outcome = importer
            .import(ImportSource::Id(300), MessageKind::New, None, None)
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.message.text, "fetched");
        assert_eq!(api.message_fetches.load(Ordering::SeqCst), 1);

        // A second import by id short-circuits before any fetch.
        let again = importer
            .import(ImportSource::Id(300), MessageKind::New, None, None)
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(api.message_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reply_imported_before_parent() {
        let (_dir, store) = temp_store().await;
        let api = FakeApi::default();
        let importer = Importer::new(&api, &store);

        let mut parent = raw_message(200, 10, 1, "parent");
        parent.reply_message = Some(Box::new(raw_message(150, 20, 1, "the reply")));

        let outcome = importer
            .import(ImportSource::Payload(parent), MessageKind::New, None, None)
            .await
            .unwrap();

        assert_eq!(store.count_messages(1, None).await.unwrap(), 2);
        let reply = store.get_message_by_remote(150, "n").await.unwrap().unwrap();
        assert_eq!(outcome.message.reply_to_id, Some(reply.id));
        // Both authors were resolved.
        assert!(store.get_author(10).await.unwrap().is_some());
        assert!(store.get_author(20).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_forward_authors_resolved_and_snapshot_stored() {
        let (_dir, store) = temp_store().await;
        let api = FakeApi::default();
        let importer = Importer::new(&api, &store);

        let mut msg = raw_message(400, 10, 1, "fwd carrier");
        msg.fwd_messages = vec![raw_message(0, 30, 0, "forwarded")];

        let outcome = importer
            .import(ImportSource::Payload(msg), MessageKind::New, None, None)
            .await
            .unwrap();

        assert!(store.get_author(30).await.unwrap().is_some());
        assert!(outcome.message.forwards.contains("forwarded"));
        // Forwards are snapshots, not rows of their own.
        assert_eq!(store.count_messages(1, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_forward_author_does_not_abort() {
        let (_dir, store) = temp_store().await;
        let mut api = FakeApi::default();
        api.fail_profiles.insert(666);
        let importer = Importer::new(&api, &store);

        let mut msg = raw_message(500, 10, 1, "still archived");
        msg.fwd_messages = vec![raw_message(0, 666, 0, "from a ghost")];

        let outcome = importer
            .import(ImportSource::Payload(msg), MessageKind::New, None, None)
            .await
            .unwrap();
        assert!(outcome.created);
        assert!(store.get_author(666).await.unwrap().is_none());
    }
}
