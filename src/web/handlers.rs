//! HTTP handlers for the archive viewer and its JSON API.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;

use crate::store::Store;
use crate::web::pagination::Paginator;
use crate::web::{render, WebState};

pub const MESSAGES_PER_PAGE: u64 = 200;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub q: Option<String>,
    pub page: Option<u64>,
}

fn search_term(q: &Option<String>) -> Option<&str> {
    q.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn html_error(status: StatusCode, msg: &str) -> Response {
    (status, Html(format!("<h1>{}</h1>", render::escape(msg)))).into_response()
}

fn api_error(status: StatusCode, msg: impl ToString) -> Response {
    (
        status,
        axum::Json(serde_json::json!({ "error": msg.to_string() })),
    )
        .into_response()
}

// Each request gets its own store handle for queries.
async fn open_store(state: &WebState) -> Result<Store, Response> {
    Store::open(&state.store_dir).await.map_err(|e| {
        log::error!("Failed to open store: {:#}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable")
    })
}

pub async fn list_chats(
    State(state): State<Arc<WebState>>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let store = match open_store(&state).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let q = search_term(&params.q);
    match store.list_chats(q).await {
        Ok(chats) => Html(render::chat_list_page(q.unwrap_or(""), &chats)).into_response(),
        Err(e) => {
            log::error!("Failed to list chats: {:#}", e);
            html_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to list chats")
        }
    }
}

pub async fn show_chat(
    State(state): State<Arc<WebState>>,
    Path(peer_id): Path<i64>,
    Query(params): Query<PageQuery>,
) -> Response {
    let store = match open_store(&state).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let chat = match store.get_chat(peer_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return html_error(StatusCode::NOT_FOUND, "chat not found"),
        Err(e) => {
            log::error!("Failed to load chat {}: {:#}", peer_id, e);
            return html_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to load chat");
        }
    };

    let q = search_term(&params.q);
    let page = match chat_messages_page(&store, peer_id, q, params.page.unwrap_or(1)).await {
        Ok(p) => p,
        Err(e) => {
            log::error!("Failed to load messages for {}: {:#}", peer_id, e);
            return html_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to load messages");
        }
    };

    Html(render::chat_page(
        &chat,
        &page.messages,
        &page.pager,
        q.unwrap_or(""),
    ))
    .into_response()
}

pub async fn api_chats(
    State(state): State<Arc<WebState>>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let store = match open_store(&state).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.list_chats(search_term(&params.q)).await {
        Ok(chats) => (StatusCode::OK, axum::Json(chats)).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn api_chat_messages(
    State(state): State<Arc<WebState>>,
    Path(peer_id): Path<i64>,
    Query(params): Query<PageQuery>,
) -> Response {
    let store = match open_store(&state).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let chat = match store.get_chat(peer_id).await {
        Ok(Some(c)) => c,
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "chat not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let q = search_term(&params.q);
    match chat_messages_page(&store, peer_id, q, params.page.unwrap_or(1)).await {
        Ok(page) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "chat": chat,
                "page": page.pager.page,
                "page_count": page.pager.page_count,
                "total": page.pager.total,
                "messages": page.messages,
            })),
        )
            .into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

struct MessagesPage {
    pager: Paginator,
    messages: Vec<crate::store::MessageView>,
}

async fn chat_messages_page(
    store: &Store,
    peer_id: i64,
    q: Option<&str>,
    requested_page: u64,
) -> anyhow::Result<MessagesPage> {
    let total = store.count_messages(peer_id, q).await?;
    let pager = Paginator::new(total.max(0) as u64, MESSAGES_PER_PAGE, requested_page);
    let messages = store
        .list_message_views(peer_id, q, pager.per_page as i64, pager.offset() as i64)
        .await?;
    Ok(MessagesPage { pager, messages })
}
