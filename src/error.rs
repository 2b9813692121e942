//! Error handling with context wrappers for VK API failures.
//!
//! This module provides helpful error context for VK API operations.

use anyhow::{Context, Result};

/// Extension trait to add VK-specific context to errors.
pub trait VkErrorContext<T> {
    /// Add context for a generic API method invocation.
    fn context_method(self, method: &str) -> Result<T>;

    /// Add context for paging the conversation list.
    fn context_conversations(self, offset: u64) -> Result<T>;

    /// Add context for fetching a conversation history page.
    fn context_history(self, peer_id: i64, offset: u64) -> Result<T>;

    /// Add context for fetching a single message by id.
    fn context_message(self, message_id: i64) -> Result<T>;

    /// Add context for fetching a user profile.
    fn context_user(self, user_id: i64) -> Result<T>;

    /// Add context for fetching a group profile.
    fn context_group(self, group_id: i64) -> Result<T>;

    /// Add context for fetching chat metadata.
    fn context_chat(self, peer_id: i64) -> Result<T>;

    /// Add context for long-poll server acquisition and polling.
    fn context_longpoll(self) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> VkErrorContext<T>
    for std::result::Result<T, E>
{
    fn context_method(self, method: &str) -> Result<T> {
        self.with_context(|| format!("VK API call failed: {}", method))
    }

    fn context_conversations(self, offset: u64) -> Result<T> {
        self.with_context(|| format!("Failed to fetch conversations page at offset {}", offset))
    }

    fn context_history(self, peer_id: i64, offset: u64) -> Result<T> {
        self.with_context(|| {
            format!(
                "Failed to fetch history page for peer {} at offset {}",
                peer_id, offset
            )
        })
    }

    fn context_message(self, message_id: i64) -> Result<T> {
        self.with_context(|| format!("Failed to fetch message {}", message_id))
    }

    fn context_user(self, user_id: i64) -> Result<T> {
        self.with_context(|| format!("Failed to fetch user profile {}", user_id))
    }

    fn context_group(self, group_id: i64) -> Result<T> {
        self.with_context(|| format!("Failed to fetch group profile {}", group_id))
    }

    fn context_chat(self, peer_id: i64) -> Result<T> {
        self.with_context(|| format!("Failed to fetch chat metadata for peer {}", peer_id))
    }

    fn context_longpoll(self) -> Result<T> {
        self.context("Long-poll request failed")
    }
}
