//! Peer classification and the fetch-or-create resolver for authors
//! and chats.
//!
//! A peer id's sign and magnitude encode its kind: negative ids are
//! groups, ids above the synthetic chat base are multi-party chats,
//! everything else is a user. The resolver caches every entity it sees
//! as a persisted row; an id is fetched from the platform at most once
//! and an existing row is never overwritten.

use anyhow::Result;

use crate::store::{Author, Chat, Store};
use crate::vk::types::Profile;
use crate::vk::VkApi;

/// Multi-party chat peer ids live above this offset in a synthetic id space.
pub const CHAT_PEER_BASE: i64 = 2_000_000_000;

/// Placeholder used when the platform returns no photo for an entity.
pub const DEFAULT_PHOTO: &str = "https://sun1-87.userapi.com/s/v1/if1/wOKwTPQQd3aCLZwg6kqbmPLTe_SIV8R2CjmjikmcByHjTsVo0XjvCO1LWsI5_TaZAfPLZwNl.jpg?size=200x200&quality=96&crop=0,0,400,400&ava=1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    User,
    Group,
    Chat,
}

/// Classify a signed peer identifier by its sign and magnitude.
pub fn peer_kind(id: i64) -> PeerKind {
    if id < 0 {
        PeerKind::Group
    } else if id > CHAT_PEER_BASE {
        PeerKind::Chat
    } else {
        PeerKind::User
    }
}

pub struct Resolver<'a, A: VkApi> {
    api: &'a A,
    store: &'a Store,
}

impl<'a, A: VkApi> Resolver<'a, A> {
    pub fn new(api: &'a A, store: &'a Store) -> Self {
        Resolver { api, store }
    }

    /// Fetch-or-create the author row for a peer id. At most one external
    /// call and one insert per unseen id; fetch failures propagate.
    pub async fn resolve_author(&self, id: i64) -> Result<Author> {
        if let Some(existing) = self.store.get_author(id).await? {
            return Ok(existing);
        }
        let profile = self.fetch_profile(id).await?;
        let photo = profile.photo.as_deref().unwrap_or(DEFAULT_PHOTO);
        let author = self.store.insert_author(id, &profile.title, photo).await?;
        log::debug!("Resolved author {} ({})", author.title, author.id);
        Ok(author)
    }

    /// Fetch-or-create the chat row for a peer id.
    pub async fn resolve_chat(&self, id: i64) -> Result<Chat> {
        if let Some(existing) = self.store.get_chat(id).await? {
            return Ok(existing);
        }
        let profile = self.fetch_profile(id).await?;
        let photo = profile.photo.as_deref().unwrap_or(DEFAULT_PHOTO);
        let chat = self.store.insert_chat(id, &profile.title, photo).await?;
        log::debug!("Resolved chat {} ({})", chat.title, chat.id);
        Ok(chat)
    }

    async fn fetch_profile(&self, id: i64) -> Result<Profile> {
        match peer_kind(id) {
            PeerKind::User => self.api.user_profile(id).await,
            PeerKind::Group => self.api.group_profile(id).await,
            PeerKind::Chat => self.api.chat_profile(id).await,
        }
    }
}
