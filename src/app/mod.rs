pub mod backfill;
pub mod import;
pub mod listen;
pub mod resolve;
pub mod walk;

use crate::store::Store;
use crate::vk::VkClient;
use crate::Cli;
use anyhow::{Context, Result};

pub const TOKEN_ENV: &str = "VK_ACCESS_TOKEN";
pub const TOKEN_FILE: &str = "token";

pub struct App {
    pub vk: VkClient,
    pub store: Store,
    #[allow(dead_code)]
    pub store_dir: String,
}

impl App {
    pub async fn new(cli: &Cli) -> Result<Self> {
        let store_dir = cli.store_dir();
        std::fs::create_dir_all(&store_dir)?;

        let token = load_token(&store_dir)?;
        let vk = VkClient::new(token)?;
        let store = Store::open(&store_dir).await?;

        Ok(App {
            vk,
            store,
            store_dir,
        })
    }
}

/// Access token resolution: environment first, then the file written by
/// `vklog auth`.
pub fn load_token(store_dir: &str) -> Result<String> {
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        let token = token.trim().to_string();
        if !token.is_empty() {
            return Ok(token);
        }
    }
    let path = format!("{}/{}", store_dir, TOKEN_FILE);
    let token = std::fs::read_to_string(&path)
        .with_context(|| format!("No access token. Set {} or run `vklog auth`.", TOKEN_ENV))?;
    let token = token.trim().to_string();
    if token.is_empty() {
        anyhow::bail!("Token file {} is empty. Run `vklog auth` again.", path);
    }
    Ok(token)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory API fake shared by the app-layer tests.

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::Store;
    use crate::vk::types::{
        Conversation, ConversationItem, ConversationsPage, HistoryPage, Peer, PeerType, Profile,
        RawMessage,
    };
    use crate::vk::VkApi;

    #[derive(Default)]
    pub struct FakeApi {
        /// One conversation's history, platform order (newest first).
        pub history: Vec<RawMessage>,
        /// The conversation list as (peer kind, peer id) pairs.
        pub conversations: Vec<(PeerType, i64)>,
        /// Payloads served by `message_by_id`.
        pub messages_by_id: HashMap<i64, RawMessage>,
        /// Entity ids whose profile fetch fails.
        pub fail_profiles: HashSet<i64>,
        /// Countdown of history data-page fetches that fail before
        /// succeeding (the zero-count probe is never failed).
        pub fail_history_pages: AtomicUsize,
        pub fail_conversation_pages: AtomicUsize,

        pub profile_fetches: AtomicUsize,
        pub history_fetches: AtomicUsize,
        pub conversation_fetches: AtomicUsize,
        pub message_fetches: AtomicUsize,
    }

    impl FakeApi {
        fn profile(&self, id: i64) -> Result<Profile> {
            self.profile_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_profiles.contains(&id) {
                return Err(anyhow!("profile fetch failed for {}", id));
            }
            Ok(Profile {
                title: format!("Entity {}", id),
                photo: None,
            })
        }

        fn take_failure(counter: &AtomicUsize) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl VkApi for FakeApi {
        async fn conversations_page(&self, offset: u64, count: u64) -> Result<ConversationsPage> {
            self.conversation_fetches.fetch_add(1, Ordering::SeqCst);
            if count > 0 && Self::take_failure(&self.fail_conversation_pages) {
                return Err(anyhow!("conversations page failed"));
            }
            let total = self.conversations.len() as u64;
            let start = offset.min(total) as usize;
            let end = (offset + count).min(total) as usize;
            let items = self.conversations[start..end]
                .iter()
                .map(|&(kind, id)| ConversationItem {
                    conversation: Conversation {
                        peer: Peer { kind, id },
                    },
                })
                .collect();
            Ok(ConversationsPage {
                count: total,
                items,
            })
        }

        async fn history_page(&self, _peer_id: i64, offset: u64, count: u64) -> Result<HistoryPage> {
            self.history_fetches.fetch_add(1, Ordering::SeqCst);
            if count > 0 && Self::take_failure(&self.fail_history_pages) {
                return Err(anyhow!("history page failed"));
            }
            let total = self.history.len() as u64;
            let start = offset.min(total) as usize;
            let end = (offset + count).min(total) as usize;
            Ok(HistoryPage {
                count: total,
                items: self.history[start..end].to_vec(),
            })
        }

        async fn message_by_id(&self, message_id: i64) -> Result<RawMessage> {
            self.message_fetches.fetch_add(1, Ordering::SeqCst);
            self.messages_by_id
                .get(&message_id)
                .cloned()
                .ok_or_else(|| anyhow!("message {} not found", message_id))
        }

        async fn user_profile(&self, user_id: i64) -> Result<Profile> {
            self.profile(user_id)
        }

        async fn group_profile(&self, group_id: i64) -> Result<Profile> {
            self.profile(group_id)
        }

        async fn chat_profile(&self, peer_id: i64) -> Result<Profile> {
            self.profile(peer_id)
        }
    }

    pub fn raw_message(id: i64, from_id: i64, peer_id: i64, text: &str) -> RawMessage {
        RawMessage {
            id,
            from_id,
            peer_id,
            text: text.to_string(),
            date: 1_600_000_000 + id,
            attachments: Vec::new(),
            reply_message: None,
            fwd_messages: Vec::new(),
        }
    }

    pub async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().to_str().unwrap()).await.unwrap();
        (dir, store)
    }
}
