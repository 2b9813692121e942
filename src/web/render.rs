//! Server-side HTML for the archive viewer.
//!
//! Message text is escaped first, then platform mention markup
//! (`[id…|name]`, `[club…|name]`) is turned into profile links, so the
//! mention regexes run over already-safe text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::app::resolve::{peer_kind, PeerKind, CHAT_PEER_BASE};
use crate::store::{Chat, ChatSummary, MessageView};
use crate::web::pagination::Paginator;

static USER_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[id(\d+)\|([^\]\n]+)\]").unwrap());
static GROUP_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[club(\d+)\|([^\]\n]+)\]").unwrap());

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape, linkify mentions, and turn newlines into breaks.
pub fn prepare_text(text: &str) -> String {
    let escaped = escape(text);
    let users = USER_MENTION.replace_all(
        &escaped,
        r#"<a href="https://vk.com/id$1" target="_blank">$2</a>"#,
    );
    let groups = GROUP_MENTION.replace_all(
        &users,
        r#"<a href="https://vk.com/club$1" target="_blank">$2</a>"#,
    );
    groups.replace('\n', "<br>")
}

/// Profile link for an author id.
pub fn author_link(id: i64) -> String {
    match peer_kind(id) {
        PeerKind::User => format!("https://vk.com/id{}", id),
        _ => format!("https://vk.com/club{}", id.abs()),
    }
}

/// Platform permalink for an archived message. Chat-space peer ids are
/// written in their `c{n}` form.
pub fn message_permalink(remote_id: i64, chat_id: i64) -> String {
    let sel = if peer_kind(chat_id) == PeerKind::Chat {
        format!("c{}", chat_id - CHAT_PEER_BASE)
    } else {
        chat_id.to_string()
    };
    format!("https://vk.com/im?msgid={}&sel={}", remote_id, sel)
}

fn attachment_labels(attachments_json: &str) -> Vec<String> {
    let parsed: Vec<serde_json::Value> =
        serde_json::from_str(attachments_json).unwrap_or_default();
    parsed
        .iter()
        .filter_map(|a| a.get("type").and_then(|t| t.as_str()))
        .map(str::to_string)
        .collect()
}

fn forward_count(forwards_json: &str) -> usize {
    serde_json::from_str::<Vec<serde_json::Value>>(forwards_json)
        .map(|v| v.len())
        .unwrap_or(0)
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; max-width: 56rem; margin: 0 auto; padding: 1rem; }}
.entry {{ display: flex; gap: .75rem; padding: .5rem 0; border-bottom: 1px solid #eee; }}
.entry img {{ width: 48px; height: 48px; border-radius: 50%; }}
.meta {{ color: #777; font-size: .85rem; }}
.pager a, .pager span {{ margin-right: .5rem; }}
.pager .current {{ font-weight: bold; }}
form.search {{ margin: 1rem 0; }}
</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape(title),
        body = body
    )
}

fn search_form(action: &str, q: &str) -> String {
    format!(
        r#"<form class="search" method="get" action="{action}">
<input type="text" name="q" value="{q}" placeholder="Search…">
<button type="submit">Search</button>
</form>"#,
        action = action,
        q = escape(q)
    )
}

pub fn chat_list_page(q: &str, chats: &[ChatSummary]) -> String {
    let mut body = String::from("<h1>Archived chats</h1>");
    body.push_str(&search_form("/", q));
    for chat in chats {
        body.push_str(&format!(
            r#"<div class="entry">
<img src="{photo}" alt="">
<div>
<a href="/chat/{id}">{title}</a>
<div class="meta">{count} message(s)</div>
</div>
</div>
"#,
            photo = escape(&chat.photo),
            id = chat.id,
            title = escape(&chat.title),
            count = chat.message_count,
        ));
    }
    if chats.is_empty() {
        body.push_str("<p>No chats found.</p>");
    }
    layout("Archived chats", &body)
}

fn pager_nav(chat_id: i64, pager: &Paginator, q: &str) -> String {
    let href = |page: u64| {
        if q.is_empty() {
            format!("/chat/{}?page={}", chat_id, page)
        } else {
            format!(
                "/chat/{}?page={}&q={}",
                chat_id,
                page,
                urlencoding::encode(q)
            )
        }
    };

    let mut nav = String::from(r#"<div class="pager">"#);
    if pager.has_prev {
        nav.push_str(&format!(r#"<a href="{}">&larr; prev</a>"#, href(pager.prev_page())));
    }
    for page in pager.window() {
        if page == pager.page {
            nav.push_str(&format!(r#"<span class="current">{}</span>"#, page));
        } else {
            nav.push_str(&format!(r#"<a href="{}">{}</a>"#, href(page), page));
        }
    }
    if pager.has_next {
        nav.push_str(&format!(r#"<a href="{}">next &rarr;</a>"#, href(pager.next_page())));
    }
    nav.push_str("</div>");
    nav
}

pub fn chat_page(chat: &Chat, messages: &[MessageView], pager: &Paginator, q: &str) -> String {
    let mut body = format!(
        r#"<p><a href="/">&larr; all chats</a></p>
<div class="entry"><img src="{photo}" alt=""><h1>{title}</h1></div>
"#,
        photo = escape(&chat.photo),
        title = escape(&chat.title),
    );
    body.push_str(&search_form(&format!("/chat/{}", chat.id), q));
    body.push_str(&format!(
        r#"<p class="meta">{} message(s)</p>"#,
        pager.total
    ));
    body.push_str(&pager_nav(chat.id, pager, q));

    for m in messages {
        let mut extras = String::new();
        let labels = attachment_labels(&m.attachments);
        if !labels.is_empty() {
            extras.push_str(&format!(
                r#"<div class="meta">📎 {}</div>"#,
                escape(&labels.join(", "))
            ));
        }
        let fwd = forward_count(&m.forwards);
        if fwd > 0 {
            extras.push_str(&format!(
                r#"<div class="meta">↪ {} forwarded message(s)</div>"#,
                fwd
            ));
        }
        if let Some(reply_id) = m.reply_to_id {
            extras.push_str(&format!(
                r##"<div class="meta">reply to <a href="#m{id}">#{id}</a></div>"##,
                id = reply_id
            ));
        }

        body.push_str(&format!(
            r#"<div class="entry" id="m{local_id}">
<img src="{photo}" alt="">
<div>
<a href="{author_url}" target="_blank">{author}</a>
<span class="meta">{date} · <a href="{permalink}" target="_blank">#{remote_id}</a></span>
<div>{text}</div>
{extras}
</div>
</div>
"#,
            local_id = m.id,
            photo = escape(&m.author_photo),
            author_url = author_link(m.author_id),
            author = escape(&m.author_title),
            date = m.date.format("%Y-%m-%d %H:%M:%S"),
            permalink = message_permalink(m.remote_id, m.chat_id),
            remote_id = m.remote_id,
            text = prepare_text(&m.text),
            extras = extras,
        ));
    }
    if messages.is_empty() {
        body.push_str("<p>No messages on this page.</p>");
    }

    body.push_str(&pager_nav(chat.id, pager, q));
    layout(&chat.title, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn test_prepare_text_linkifies_mentions() {
        let html = prepare_text("hi [id123|Alice]\nbye [club77|Team]");
        assert!(html.contains(r#"<a href="https://vk.com/id123" target="_blank">Alice</a>"#));
        assert!(html.contains(r#"<a href="https://vk.com/club77" target="_blank">Team</a>"#));
        assert!(html.contains("<br>"));
    }

    #[test]
    fn test_prepare_text_escapes_markup() {
        let html = prepare_text("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_permalink_uses_chat_space_form() {
        assert_eq!(
            message_permalink(42, 2_000_000_005),
            "https://vk.com/im?msgid=42&sel=c5"
        );
        assert_eq!(
            message_permalink(42, 12345),
            "https://vk.com/im?msgid=42&sel=12345"
        );
    }

    #[test]
    fn test_author_link_by_kind() {
        assert_eq!(author_link(123), "https://vk.com/id123");
        assert_eq!(author_link(-45), "https://vk.com/club45");
    }
}
