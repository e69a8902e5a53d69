use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::SyncConfig;
use crate::error::FavoritesError;

/// Server side of the favorites list.
#[async_trait]
pub trait FavoritesApi: Send + Sync {
    async fn list(&self) -> Result<Vec<String>, FavoritesError>;
    async fn add(&self, id: &str) -> Result<(), FavoritesError>;
    async fn remove(&self, id: &str) -> Result<(), FavoritesError>;

    /// Changes the identity later calls run as. APIs without credentials
    /// ignore it.
    fn set_token(&self, _token: Option<String>) {}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FavoriteEntry {
    Id(String),
    Record {
        #[serde(rename = "productId", alias = "product_id")]
        product_id: String,
    },
}

impl FavoriteEntry {
    fn into_id(self) -> String {
        match self {
            FavoriteEntry::Id(id) => id,
            FavoriteEntry::Record { product_id } => product_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody {
    Bare(Vec<FavoriteEntry>),
    Wrapped { favorites: Vec<FavoriteEntry> },
}

#[derive(Debug, Serialize)]
struct AddBody<'a> {
    #[serde(rename = "productId")]
    product_id: &'a str,
}

/// `reqwest` client for `{base}/favorites`.
#[derive(Debug)]
pub struct HttpFavoritesApi {
    client: Client,
    base: Url,
    token: RwLock<Option<String>>,
}

impl HttpFavoritesApi {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Result<Self, FavoritesError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(FavoritesError::Config(format!("'{base_url}' cannot be used as an API base")));
        }
        Ok(Self {
            client,
            base,
            token: RwLock::new(token),
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, FavoritesError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("favsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::new(client, &config.api_base_url, config.auth_token.clone())
    }

    /// Swaps the bearer token, e.g. after login or logout. Callers should
    /// reinitialize the manager afterwards since favorites are per identity.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn endpoint(&self, id: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("favorites");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.token.read().unwrap_or_else(PoisonError::into_inner).clone();
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, FavoritesError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FavoritesError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FavoritesError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl FavoritesApi for HttpFavoritesApi {
    async fn list(&self) -> Result<Vec<String>, FavoritesError> {
        let url = self.endpoint(None);
        let response = self.authorize(self.client.get(url.clone())).send().await?;
        let response = Self::check(response).await?;
        let bytes = response.bytes().await?;
        let entries = match serde_json::from_slice::<ListBody>(&bytes)? {
            ListBody::Bare(entries) | ListBody::Wrapped { favorites: entries } => entries,
        };
        let ids: Vec<String> = entries.into_iter().map(FavoriteEntry::into_id).collect();
        debug!(url = %url, count = ids.len(), "fetched favorites");
        Ok(ids)
    }

    async fn add(&self, id: &str) -> Result<(), FavoritesError> {
        let request = self
            .client
            .post(self.endpoint(None))
            .json(&AddBody { product_id: id });
        let response = self.authorize(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), FavoritesError> {
        let request = self.client.delete(self.endpoint(Some(id)));
        let response = self.authorize(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    fn set_token(&self, token: Option<String>) {
        HttpFavoritesApi::set_token(self, token);
    }
}
