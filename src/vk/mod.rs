//! Thin VK API client: a generic `method` call plus the typed operations
//! the importer and walkers need, behind the [`VkApi`] trait so tests can
//! substitute an in-memory source.

pub mod longpoll;
pub mod types;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::error::VkErrorContext;
use crate::vk::types::{
    ConversationsById, ConversationsPage, GroupRecord, HistoryPage, Profile, RawMessage,
    UserRecord,
};

pub const API_BASE: &str = "https://api.vk.com/method";
pub const API_VERSION: &str = "5.131";

/// The remote operations the core requires. Implemented by [`VkClient`]
/// and by in-memory fakes in tests.
#[async_trait]
pub trait VkApi: Send + Sync {
    /// One page of the conversation list.
    async fn conversations_page(&self, offset: u64, count: u64) -> Result<ConversationsPage>;

    /// One page of a conversation's message history.
    async fn history_page(&self, peer_id: i64, offset: u64, count: u64) -> Result<HistoryPage>;

    /// Fetch a full message payload by remote id.
    async fn message_by_id(&self, message_id: i64) -> Result<RawMessage>;

    /// Fetch a user profile (title + photo).
    async fn user_profile(&self, user_id: i64) -> Result<Profile>;

    /// Fetch a group profile. Callers pass the signed peer id; the
    /// platform wants the bare group id.
    async fn group_profile(&self, group_id: i64) -> Result<Profile>;

    /// Fetch multi-party chat metadata by peer id.
    async fn chat_profile(&self, peer_id: i64) -> Result<Profile>;
}

pub struct VkClient {
    http: reqwest::Client,
    token: String,
}

impl VkClient {
    pub fn new(token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("vklog/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(VkClient { http, token })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Invoke an arbitrary API method. Injects the access token and API
    /// version, unwraps the platform's `{response}` / `{error}` envelope.
    pub async fn method(&self, name: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{}", API_BASE, name);
        let mut form: Vec<(&str, String)> = params.to_vec();
        form.push(("access_token", self.token.clone()));
        form.push(("v", API_VERSION.to_string()));

        let resp = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .context_method(name)?;
        let body: Value = resp
            .error_for_status()
            .context_method(name)?
            .json()
            .await
            .context_method(name)?;

        if let Some(err) = body.get("error") {
            let code = err.get("error_code").and_then(Value::as_i64).unwrap_or(0);
            let msg = err
                .get("error_msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("VK API error {} on {}: {}", code, name, msg);
        }
        match body.get("response") {
            Some(r) => Ok(r.clone()),
            None => anyhow::bail!("VK API response for {} has no payload", name),
        }
    }
}

#[async_trait]
impl VkApi for VkClient {
    async fn conversations_page(&self, offset: u64, count: u64) -> Result<ConversationsPage> {
        let resp = self
            .method(
                "messages.getConversations",
                &[
                    ("offset", offset.to_string()),
                    ("count", count.to_string()),
                ],
            )
            .await?;
        serde_json::from_value(resp).context_conversations(offset)
    }

    async fn history_page(&self, peer_id: i64, offset: u64, count: u64) -> Result<HistoryPage> {
        let resp = self
            .method(
                "messages.getHistory",
                &[
                    ("peer_id", peer_id.to_string()),
                    ("offset", offset.to_string()),
                    ("count", count.to_string()),
                ],
            )
            .await?;
        serde_json::from_value(resp).context_history(peer_id, offset)
    }

    async fn message_by_id(&self, message_id: i64) -> Result<RawMessage> {
        let resp = self
            .method(
                "messages.getById",
                &[("message_ids", message_id.to_string())],
            )
            .await?;
        let page: HistoryPage = serde_json::from_value(resp).context_message(message_id)?;
        page.items
            .into_iter()
            .next()
            .with_context(|| format!("Message {} not found", message_id))
    }

    async fn user_profile(&self, user_id: i64) -> Result<Profile> {
        let resp = self
            .method(
                "users.get",
                &[
                    ("user_ids", user_id.to_string()),
                    ("fields", "photo_200".to_string()),
                ],
            )
            .await?;
        let users: Vec<UserRecord> = serde_json::from_value(resp).context_user(user_id)?;
        let user = users
            .into_iter()
            .next()
            .with_context(|| format!("User {} not found", user_id))?;
        Ok(Profile {
            title: format!("{} {}", user.first_name, user.last_name),
            photo: user.photo_200,
        })
    }

    async fn group_profile(&self, group_id: i64) -> Result<Profile> {
        let resp = self
            .method(
                "groups.getById",
                &[("group_id", group_id.abs().to_string())],
            )
            .await?;
        let groups: Vec<GroupRecord> = serde_json::from_value(resp).context_group(group_id)?;
        let group = groups
            .into_iter()
            .next()
            .with_context(|| format!("Group {} not found", group_id))?;
        Ok(Profile {
            title: group.name,
            photo: group.photo_200,
        })
    }

    async fn chat_profile(&self, peer_id: i64) -> Result<Profile> {
        let resp = self
            .method(
                "messages.getConversationsById",
                &[("peer_ids", peer_id.to_string())],
            )
            .await?;
        let by_id: ConversationsById = serde_json::from_value(resp).context_chat(peer_id)?;
        let meta = by_id
            .items
            .into_iter()
            .next()
            .with_context(|| format!("Conversation {} not found", peer_id))?;
        let settings = meta
            .chat_settings
            .with_context(|| format!("Peer {} has no chat settings", peer_id))?;
        Ok(Profile {
            title: settings.title,
            photo: settings.photo.and_then(|p| p.photo_200),
        })
    }
}
