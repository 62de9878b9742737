//! Post store backed by a JSON REST API (`/posts` resource).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::application::store::{PostStore, StoreError};
use crate::config::ApiSettings;
use crate::domain::posts::{Post, PostDraft, PostId};

const POSTS_PATH: &str = "posts";
const METRIC_STORE_REQUEST_MS: &str = "blogdeck_store_request_ms";

#[derive(Clone, Debug)]
pub struct HttpPostStore {
    client: Client,
    base: Url,
}

impl HttpPostStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, base })
    }

    pub fn from_settings(settings: &ApiSettings) -> Result<Self, StoreError> {
        Self::new(settings.base_url.as_str(), settings.timeout)
    }

    pub fn user_agent() -> &'static str {
        concat!("blogdeck/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        self.base.join(path).map_err(StoreError::Url)
    }

    fn post_path(id: PostId) -> String {
        format!("{POSTS_PATH}/{id}")
    }

    async fn send(
        &self,
        op: &'static str,
        method: Method,
        path: &str,
        body: Option<&PostDraft>,
    ) -> Result<Response, StoreError> {
        let url = self.url(path)?;
        debug!(op, %method, %url, "Post store request");

        let mut req = self.client.request(method, url);
        if let Some(b) = body {
            req = req.json(b);
        }

        let started = Instant::now();
        let resp = req.send().await;
        histogram!(METRIC_STORE_REQUEST_MS, "op" => op)
            .record(started.elapsed().as_secs_f64() * 1000.0);
        Ok(resp?)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        op: &'static str,
        method: Method,
        path: &str,
        body: Option<&PostDraft>,
    ) -> Result<T, StoreError> {
        let resp = self.send(op, method, path, body).await?;
        Self::handle(resp).await
    }

    async fn request_unit(
        &self,
        op: &'static str,
        method: Method,
        path: &str,
    ) -> Result<(), StoreError> {
        let resp = self.send(op, method, path, None).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::status_error(status, text));
        }
        Ok(())
    }

    async fn handle<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Err(Self::status_error(status, text));
        }
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn status_error(status: StatusCode, body: String) -> StoreError {
        if status == StatusCode::NOT_FOUND {
            return StoreError::NotFound;
        }
        StoreError::Status {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl PostStore for HttpPostStore {
    async fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        self.request("list", Method::GET, POSTS_PATH, None).await
    }

    async fn get_post(&self, id: PostId) -> Result<Post, StoreError> {
        self.request("get", Method::GET, &Self::post_path(id), None)
            .await
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, StoreError> {
        self.request("create", Method::POST, POSTS_PATH, Some(draft))
            .await
    }

    async fn update_post(&self, id: PostId, fields: &PostDraft) -> Result<Post, StoreError> {
        self.request("update", Method::PUT, &Self::post_path(id), Some(fields))
            .await
    }

    async fn delete_post(&self, id: PostId) -> Result<(), StoreError> {
        self.request_unit("delete", Method::DELETE, &Self::post_path(id))
            .await
    }
}
