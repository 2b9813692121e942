//! Wire types for the VK API payloads this crate consumes.
//!
//! Only the fields the importer and walkers actually read are modeled;
//! everything else rides along inside the raw attachment/forward JSON.

use serde::{Deserialize, Serialize};

/// A raw message payload as returned by `messages.getHistory`,
/// `messages.getById` and inside `reply_message` / `fwd_messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: i64,
    pub from_id: i64,
    #[serde(default)]
    pub peer_id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_message: Option<Box<RawMessage>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fwd_messages: Vec<RawMessage>,
}

/// One page of `messages.getHistory`. `count` is the conversation total,
/// not the page length; items arrive newest-first.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage {
    pub count: u64,
    #[serde(default)]
    pub items: Vec<RawMessage>,
}

/// Peer kind as reported in `conversation.peer.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerType {
    User,
    Chat,
    Group,
    Email,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Peer {
    #[serde(rename = "type")]
    pub kind: PeerType,
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    pub peer: Peer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationItem {
    pub conversation: Conversation,
}

/// One page of `messages.getConversations`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationsPage {
    pub count: u64,
    #[serde(default)]
    pub items: Vec<ConversationItem>,
}

/// Display info for an author or chat, normalized across the three
/// profile-shaped endpoints.
#[derive(Debug, Clone)]
pub struct Profile {
    pub title: String,
    pub photo: Option<String>,
}

// --- Endpoint-specific records, mapped into Profile by the client ---

#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub photo_200: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub photo_200: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatPhoto {
    #[serde(default)]
    pub photo_200: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    pub title: String,
    #[serde(default)]
    pub photo: Option<ChatPhoto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationMeta {
    #[serde(default)]
    pub chat_settings: Option<ChatSettings>,
}

/// Response of `messages.getConversationsById`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationsById {
    #[serde(default)]
    pub items: Vec<ConversationMeta>,
}
