//! User long-poll event feed: the inbound "new message" subscription.
//!
//! Protocol: `messages.getLongPollServer` hands out {server, key, ts};
//! the poller then GETs `https://{server}?act=a_check&...` in a loop.
//! A `failed` field in the body signals a stale ts (1) or stale
//! credentials (2, 3), both recoverable in place.

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::error::VkErrorContext;
use crate::vk::VkClient;

const LONGPOLL_WAIT_SECS: u64 = 25;

// Update codes, per the long-poll event table.
const EVENT_NEW_MESSAGE: i64 = 4;
const EVENT_EDIT_MESSAGE: i64 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct LongPollServer {
    pub key: String,
    pub server: String,
    pub ts: i64,
}

/// A message event delivered by the feed. Only the remote message id is
/// carried; the importer re-fetches the full payload by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    NewMessage { message_id: i64 },
    EditedMessage { message_id: i64 },
}

pub struct LongPoller<'a> {
    client: &'a VkClient,
    server: LongPollServer,
}

impl<'a> LongPoller<'a> {
    pub async fn connect(client: &'a VkClient) -> Result<Self> {
        let server = Self::acquire(client).await?;
        log::info!("Long poll connected to {}", server.server);
        Ok(LongPoller { client, server })
    }

    async fn acquire(client: &VkClient) -> Result<LongPollServer> {
        let resp = client
            .method(
                "messages.getLongPollServer",
                &[("lp_version", "3".to_string())],
            )
            .await?;
        serde_json::from_value(resp).context_longpoll()
    }

    /// Wait for the next non-empty batch of message events.
    pub async fn next_events(&mut self) -> Result<Vec<Event>> {
        loop {
            let url = format!(
                "https://{}?act=a_check&key={}&ts={}&wait={}&mode=2&version=3",
                self.server.server, self.server.key, self.server.ts, LONGPOLL_WAIT_SECS
            );
            let resp = self.client.http().get(&url).send().await.context_longpoll()?;
            let body: Value = resp
                .error_for_status()
                .context_longpoll()?
                .json()
                .await
                .context_longpoll()?;

            if let Some(failed) = body.get("failed").and_then(Value::as_i64) {
                match failed {
                    1 => {
                        if let Some(ts) = body.get("ts").and_then(Value::as_i64) {
                            self.server.ts = ts;
                        }
                    }
                    2 | 3 => {
                        log::info!("Long poll credentials expired, reconnecting");
                        self.server = Self::acquire(self.client).await?;
                    }
                    other => anyhow::bail!("Long poll failed with code {}", other),
                }
                continue;
            }

            if let Some(ts) = body.get("ts").and_then(Value::as_i64) {
                self.server.ts = ts;
            }

            let events = match body.get("updates").and_then(Value::as_array) {
                Some(updates) => parse_events(updates),
                None => Vec::new(),
            };
            if !events.is_empty() {
                return Ok(events);
            }
            // Empty batch means the wait timed out; poll again.
        }
    }
}

fn parse_events(updates: &[Value]) -> Vec<Event> {
    let mut events = Vec::new();
    for u in updates {
        let code = u.get(0).and_then(Value::as_i64);
        let id = u.get(1).and_then(Value::as_i64);
        match (code, id) {
            (Some(EVENT_NEW_MESSAGE), Some(message_id)) => {
                events.push(Event::NewMessage { message_id })
            }
            (Some(EVENT_EDIT_MESSAGE), Some(message_id)) => {
                events.push(Event::EditedMessage { message_id })
            }
            _ => {}
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_events() {
        let updates = vec![
            json!([4, 101, 1, 2000000001, 0, "hi"]),
            json!([80, 3]),
            json!([5, 102, 1, 55]),
            json!(["garbage"]),
        ];
        let events = parse_events(&updates);
        assert_eq!(
            events,
            vec![
                Event::NewMessage { message_id: 101 },
                Event::EditedMessage { message_id: 102 },
            ]
        );
    }
}
