//! # Remote Catalog Client
//!
//! Reads and writes the account's favorites and watchlist on the remote
//! catalog (TMDB v3 account endpoints).
//!
//! ## Overview
//!
//! [`RemoteLibrary`] is the seam the reconciliation engine and the push
//! operation talk to. [`TmdbRemoteLibrary`] implements it over the host
//! [`HttpClient`], taking the account and session id from the
//! [`SessionManager`] on every call.
//!
//! ## Endpoints
//!
//! - `GET  {base}/account/{account_id}/{favorite|watchlist}/{movies|tv}?session_id=&page=`
//! - `POST {base}/account/{account_id}/{favorite|watchlist}?session_id=`

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use core_auth::{Session, SessionManager};
use core_library::{LibraryItem, LibraryList, MediaType};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Upper bound on pages fetched per category.
pub const MAX_PAGES: u32 = 500;

/// Account lists on the remote catalog.
#[async_trait]
pub trait RemoteLibrary: Send + Sync {
    /// Every item of `list`, across all pages and both media types.
    async fn fetch_list(&self, list: LibraryList) -> Result<Vec<LibraryItem>>;

    /// Add the item to the remote list.
    async fn add_item(&self, list: LibraryList, media_id: i64, media_type: MediaType) -> Result<()>;

    /// Remove the item from the remote list. Removing an absent item succeeds.
    async fn remove_item(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct PagedResponse {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    results: Vec<RemoteMedia>,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct RemoteMedia {
    id: i64,
    title: Option<String>,
    name: Option<String>,
    poster_path: Option<String>,
}

impl RemoteMedia {
    fn into_item(self, media_type: MediaType) -> LibraryItem {
        let name = self.title.or(self.name).unwrap_or_default();
        LibraryItem::new(self.id, media_type, name, self.poster_path.unwrap_or_default())
    }
}

fn list_segment(list: LibraryList) -> &'static str {
    match list {
        LibraryList::Favorites => "favorite",
        LibraryList::Watchlist => "watchlist",
    }
}

fn media_segment(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movies",
        MediaType::Tv => "tv",
    }
}

/// [`RemoteLibrary`] over the TMDB v3 HTTP API.
pub struct TmdbRemoteLibrary {
    http_client: Arc<dyn HttpClient>,
    session: Arc<SessionManager>,
    base_url: String,
    access_token: Option<String>,
    request_timeout: Duration,
}

impl TmdbRemoteLibrary {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        session: Arc<SessionManager>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            session,
            base_url: base_url.into(),
            access_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn session(&self) -> Result<Session> {
        self.session
            .require_session()
            .await
            .map_err(|_| SyncError::NotAuthenticated)
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        let request = request
            .header("Accept", "application/json")
            .timeout(self.request_timeout);
        match &self.access_token {
            Some(token) => request.bearer_token(token.as_str()),
            None => request,
        }
    }

    async fn fetch_page(
        &self,
        session: &Session,
        list: LibraryList,
        media_type: MediaType,
        page: u32,
    ) -> Result<PagedResponse> {
        let url = format!(
            "{}/account/{}/{}/{}",
            self.base_url,
            session.account_id,
            list_segment(list),
            media_segment(media_type)
        );
        let request = self.authorize(
            HttpRequest::get(url)
                .query("session_id", &session.session_id)
                .query("page", page),
        );

        let response = self
            .http_client
            .execute(request)
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| SyncError::Remote(format!("fetching {} page {}: {}", list, page, e)))?;

        response
            .json::<PagedResponse>()
            .map_err(|e| SyncError::Remote(format!("decoding {} page {}: {}", list, page, e)))
    }

    async fn fetch_category(
        &self,
        session: &Session,
        list: LibraryList,
        media_type: MediaType,
    ) -> Result<Vec<LibraryItem>> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let response = self.fetch_page(session, list, media_type, page).await?;
            debug!(
                list = %list,
                media_type = %media_type,
                page = response.page,
                total_pages = response.total_pages,
                results = response.results.len(),
                "Fetched remote page"
            );

            items.extend(
                response
                    .results
                    .into_iter()
                    .map(|media| media.into_item(media_type)),
            );

            if page >= response.total_pages || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        Ok(items)
    }

    async fn set_membership(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
        member: bool,
    ) -> Result<()> {
        let session = self.session().await?;
        let url = format!(
            "{}/account/{}/{}",
            self.base_url,
            session.account_id,
            list_segment(list)
        );
        let mut body = serde_json::json!({
            "media_type": media_type.as_str(),
            "media_id": media_id,
        });
        body[list_segment(list)] = serde_json::Value::Bool(member);

        let request = HttpRequest::post(url)
            .query("session_id", &session.session_id)
            .json(&body)
            .map_err(SyncError::Bridge)?;

        // Retries belong to the background scheduler.
        self.http_client
            .execute_with_retry(self.authorize(request), RetryPolicy::no_retry())
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                warn!(list = %list, media_id, media_type = %media_type, member, error = %e, "Remote list update failed");
                SyncError::Remote(e.to_string())
            })?;

        Ok(())
    }
}

#[async_trait]
impl RemoteLibrary for TmdbRemoteLibrary {
    #[instrument(skip(self), fields(list = %list))]
    async fn fetch_list(&self, list: LibraryList) -> Result<Vec<LibraryItem>> {
        let session = self.session().await?;

        let mut items = Vec::new();
        for media_type in MediaType::ALL {
            items.extend(self.fetch_category(&session, list, media_type).await?);
        }

        debug!(items = items.len(), "Remote list fetched");
        Ok(items)
    }

    #[instrument(skip(self), fields(list = %list))]
    async fn add_item(&self, list: LibraryList, media_id: i64, media_type: MediaType) -> Result<()> {
        self.set_membership(list, media_id, media_type, true).await
    }

    #[instrument(skip(self), fields(list = %list))]
    async fn remove_item(
        &self,
        list: LibraryList,
        media_id: i64,
        media_type: MediaType,
    ) -> Result<()> {
        self.set_membership(list, media_id, media_type, false).await
    }
}
