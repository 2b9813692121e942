//! Paged walkers over remote history and the conversation list.
//!
//! Both follow the same protocol: a zero-count probe to learn the total,
//! then pages of [`PAGE_SIZE`] by increasing offset until the total is
//! reached. A failed page fetch is retried at the same offset after a
//! short delay, up to a cap, after which the error surfaces.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use anyhow::Result;
use rand::Rng;

use crate::vk::types::{HistoryPage, PeerType, RawMessage};
use crate::vk::VkApi;

/// Batch size for both walkers.
pub const PAGE_SIZE: u64 = 200;

/// Throttle and retry knobs. Defaults stay under the platform's rate
/// limits; tests run with [`Pacing::none`].
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Base delay before each page fetch.
    pub page_delay: Duration,
    /// Random extra delay added on top of `page_delay`.
    pub jitter: Duration,
    /// Delay before retrying a failed history page.
    pub history_retry: Duration,
    /// Delay before retrying a failed conversations page.
    pub conversation_retry: Duration,
    /// Attempts per page before the error surfaces.
    pub max_attempts: u32,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            page_delay: Duration::from_secs(2),
            jitter: Duration::from_millis(500),
            history_retry: Duration::from_millis(500),
            conversation_retry: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

impl Pacing {
    /// Zero delays, two attempts per page. For tests.
    pub fn none() -> Self {
        Pacing {
            page_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            history_retry: Duration::ZERO,
            conversation_retry: Duration::ZERO,
            max_attempts: 2,
        }
    }

    async fn throttle(&self) {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            rand::rng().random_range(0..=jitter_ms)
        } else {
            0
        };
        let delay = self.page_delay + Duration::from_millis(extra);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Which conversations the backfill touches: a set of peer kinds, or an
/// explicit allow-list of peer ids.
#[derive(Debug, Clone)]
pub enum PeerFilter {
    Kinds(HashSet<PeerType>),
    Peers(Vec<i64>),
}

impl PeerFilter {
    pub fn all() -> Self {
        PeerFilter::Kinds(
            [
                PeerType::User,
                PeerType::Chat,
                PeerType::Group,
                PeerType::Email,
            ]
            .into_iter()
            .collect(),
        )
    }

    /// Parse a filter spec: `all`, a comma list of kind names
    /// (user/chat/group/email), or a comma list of numeric peer ids.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() || spec.eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let tokens: Vec<&str> = spec
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return Ok(Self::all());
        }
        if tokens.iter().all(|t| t.parse::<i64>().is_ok()) {
            let peers = tokens.iter().filter_map(|t| t.parse().ok()).collect();
            return Ok(PeerFilter::Peers(peers));
        }
        let mut kinds = HashSet::new();
        for token in &tokens {
            let kind = match token.to_ascii_lowercase().as_str() {
                "user" => PeerType::User,
                "chat" => PeerType::Chat,
                "group" => PeerType::Group,
                "email" => PeerType::Email,
                other => anyhow::bail!(
                    "Unknown peer filter {:?} (expected all, user, chat, group, email, or peer ids)",
                    other
                ),
            };
            kinds.insert(kind);
        }
        Ok(PeerFilter::Kinds(kinds))
    }

    pub fn matches(&self, kind: PeerType, id: i64) -> bool {
        match self {
            PeerFilter::Kinds(kinds) => kinds.contains(&kind),
            PeerFilter::Peers(ids) => ids.contains(&id),
        }
    }
}

/// Walks one conversation's message history, yielding raw payloads in
/// the order the platform returns them (newest first within each batch).
pub struct HistoryWalker<'a, A: VkApi> {
    api: &'a A,
    peer_id: i64,
    /// Conversation name, for progress reporting only.
    name: String,
    pacing: Pacing,
    offset: u64,
    total: Option<u64>,
    buf: VecDeque<RawMessage>,
}

impl<'a, A: VkApi> HistoryWalker<'a, A> {
    pub fn new(api: &'a A, peer_id: i64, name: &str, pacing: Pacing) -> Self {
        HistoryWalker {
            api,
            peer_id,
            name: name.to_string(),
            pacing,
            offset: 0,
            total: None,
            buf: VecDeque::new(),
        }
    }

    /// Next raw message, or None once the conversation is exhausted.
    pub async fn next(&mut self) -> Result<Option<RawMessage>> {
        loop {
            if let Some(msg) = self.buf.pop_front() {
                return Ok(Some(msg));
            }

            let total = match self.total {
                Some(t) => t,
                None => {
                    self.pacing.throttle().await;
                    let probe = self.fetch_page(0, 0).await?;
                    self.total = Some(probe.count);
                    probe.count
                }
            };
            if self.offset >= total {
                return Ok(None);
            }

            log::info!(
                "Loading messages for {}: {}/{}",
                self.name,
                self.offset,
                total
            );
            self.pacing.throttle().await;
            let page = self.fetch_page(self.offset, PAGE_SIZE).await?;
            if page.items.is_empty() {
                // The platform reported more than it returns; stop rather than spin.
                return Ok(None);
            }
            self.offset += page.items.len() as u64;
            self.buf.extend(page.items);
        }
    }

    async fn fetch_page(&self, offset: u64, count: u64) -> Result<HistoryPage> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.api.history_page(self.peer_id, offset, count).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < self.pacing.max_attempts => {
                    log::error!(
                        "History page at offset {} for {} failed (attempt {}): {:#}",
                        offset,
                        self.name,
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.pacing.history_retry).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Walks the conversation list, yielding peer ids that pass the filter,
/// in list order.
pub struct ConversationWalker<'a, A: VkApi> {
    api: &'a A,
    filter: PeerFilter,
    pacing: Pacing,
    offset: u64,
    total: Option<u64>,
    buf: VecDeque<i64>,
}

impl<'a, A: VkApi> ConversationWalker<'a, A> {
    pub fn new(api: &'a A, filter: PeerFilter, pacing: Pacing) -> Self {
        ConversationWalker {
            api,
            filter,
            pacing,
            offset: 0,
            total: None,
            buf: VecDeque::new(),
        }
    }

    pub async fn next(&mut self) -> Result<Option<i64>> {
        loop {
            if let Some(id) = self.buf.pop_front() {
                return Ok(Some(id));
            }

            let total = match self.total {
                Some(t) => t,
                None => {
                    let probe = self.fetch_page(0, 0).await?;
                    self.total = Some(probe.count);
                    probe.count
                }
            };
            if self.offset >= total {
                return Ok(None);
            }

            self.pacing.throttle().await;
            let page = self.fetch_page(self.offset, PAGE_SIZE).await?;
            if page.items.is_empty() {
                return Ok(None);
            }
            // The offset advances over every listed conversation, matched
            // or not; only matches are yielded.
            self.offset += page.items.len() as u64;
            for item in page.items {
                let peer = item.conversation.peer;
                if self.filter.matches(peer.kind, peer.id) {
                    self.buf.push_back(peer.id);
                }
            }
        }
    }

    async fn fetch_page(&self, offset: u64, count: u64) -> Result<crate::vk::types::ConversationsPage> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.api.conversations_page(offset, count).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt < self.pacing.max_attempts => {
                    log::error!(
                        "Conversations page at offset {} failed (attempt {}): {:#}",
                        offset,
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.pacing.conversation_retry).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{raw_message, FakeApi};
    use std::sync::atomic::Ordering;

    fn history_of(n: i64) -> Vec<RawMessage> {
        (0..n).map(|i| raw_message(n - i, 10, 1, "m")).collect()
    }

    #[tokio::test]
    async fn test_history_walker_exhausts_all_pages() {
        let api = FakeApi {
            history: history_of(450),
            ..Default::default()
        };
        let mut walker = HistoryWalker::new(&api, 1, "test", Pacing::none());

        let mut seen = Vec::new();
        while let Some(msg) = walker.next().await.unwrap() {
            seen.push(msg.id);
        }

        assert_eq!(seen.len(), 450);
        // Source order preserved: ids run 450 down to 1.
        let expected: Vec<i64> = (1..=450).rev().collect();
        assert_eq!(seen, expected);
        // Probe plus pages of 200/200/50.
        assert_eq!(api.history_fetches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_history_walker_retries_same_offset() {
        let api = FakeApi {
            history: history_of(250),
            ..Default::default()
        };
        api.fail_history_pages.store(1, Ordering::SeqCst);
        let mut walker = HistoryWalker::new(&api, 1, "flaky", Pacing::none());

        let mut seen = Vec::new();
        while let Some(msg) = walker.next().await.unwrap() {
            seen.push(msg.id);
        }

        // Full set, no duplication or omission, despite the first-page failure.
        let expected: Vec<i64> = (1..=250).rev().collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_history_walker_surfaces_error_after_cap() {
        let api = FakeApi {
            history: history_of(10),
            ..Default::default()
        };
        api.fail_history_pages.store(usize::MAX, Ordering::SeqCst);
        let mut walker = HistoryWalker::new(&api, 1, "down", Pacing::none());

        assert!(walker.next().await.is_err());
    }

    #[tokio::test]
    async fn test_conversation_walker_filters_by_kind() {
        let api = FakeApi {
            conversations: vec![
                (PeerType::User, 1),
                (PeerType::Chat, 2_000_000_001),
                (PeerType::Group, -5),
                (PeerType::User, 7),
                (PeerType::Email, 99),
            ],
            ..Default::default()
        };
        let filter = PeerFilter::Kinds([PeerType::User].into_iter().collect());
        let mut walker = ConversationWalker::new(&api, filter, Pacing::none());

        let mut seen = Vec::new();
        while let Some(id) = walker.next().await.unwrap() {
            seen.push(id);
        }
        assert_eq!(seen, vec![1, 7]);
    }

    #[tokio::test]
    async fn test_conversation_walker_peer_allow_list() {
        let api = FakeApi {
            conversations: vec![
                (PeerType::User, 1),
                (PeerType::Group, -5),
                (PeerType::User, 7),
            ],
            ..Default::default()
        };
        let mut walker =
            ConversationWalker::new(&api, PeerFilter::Peers(vec![-5, 7]), Pacing::none());

        let mut seen = Vec::new();
        while let Some(id) = walker.next().await.unwrap() {
            seen.push(id);
        }
        assert_eq!(seen, vec![-5, 7]);
    }

    #[test]
    fn test_peer_filter_parse() {
        assert!(matches!(PeerFilter::parse("all").unwrap(), PeerFilter::Kinds(k) if k.len() == 4));
        assert!(
            matches!(PeerFilter::parse("user,group").unwrap(), PeerFilter::Kinds(k) if k.len() == 2)
        );
        assert!(
            matches!(PeerFilter::parse("123, -456").unwrap(), PeerFilter::Peers(p) if p == vec![123, -456])
        );
        assert!(PeerFilter::parse("bogus").is_err());
    }
}
