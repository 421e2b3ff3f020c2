//! Collaborators the controllers talk to: the remote item collection and the
//! backing-store reseed operation, plus their HTTP implementations.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use shared::{
    domain::ItemId,
    error::{ApiError, ApiException},
    protocol::{Item, NewItem},
};
use tracing::debug;
use url::Url;

#[async_trait]
pub trait ItemResource: Send + Sync {
    async fn list(&self) -> Result<Vec<Item>>;
    async fn create(&self, item: NewItem) -> Result<Item>;
    async fn update(&self, item: Item) -> Result<Item>;
    async fn delete(&self, id: &ItemId) -> Result<()>;
}

/// Reseeds the store behind an [`ItemResource`]. Handed to the list
/// controller only when the reset action should be offered.
#[async_trait]
pub trait StoreReseeder: Send + Sync {
    async fn reset(&self) -> Result<()>;
}

#[derive(Clone)]
struct HttpEndpoint {
    http: Client,
    base_url: Url,
}

impl HttpEndpoint {
    fn new(http: Client, server_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(server_url).with_context(|| format!("invalid server url: {server_url}"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("server url cannot be used as a base: {server_url}"));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("server url cannot be used as a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url) -> Result<Response> {
        let request = self.http.request(method.clone(), url.clone());
        dispatch(request, method, url).await
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<Response> {
        let request = self.http.request(method.clone(), url.clone()).json(body);
        dispatch(request, method, url).await
    }
}

async fn dispatch(request: RequestBuilder, method: Method, url: Url) -> Result<Response> {
    debug!(%method, %url, "http: sending request");
    let response = request
        .send()
        .await
        .with_context(|| format!("{method} {url} failed"))?;
    check_status(method, url, response).await
}

async fn check_status(method: Method, url: Url, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(error) => {
            debug!(%method, %url, %error, "http: failed to read error body");
            String::new()
        }
    };
    match serde_json::from_str::<ApiError>(&body) {
        Ok(error) => Err(anyhow::Error::new(ApiException::from(error))
            .context(format!("{method} {url} returned {status}"))),
        Err(_) => Err(anyhow!("{method} {url} returned {status}")),
    }
}

/// `ItemResource` over `GET/POST /items` and `PATCH/DELETE /items/{id}`.
#[derive(Clone)]
pub struct HttpItemResource {
    endpoint: HttpEndpoint,
}

impl HttpItemResource {
    pub fn new(server_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self> {
        Ok(Self {
            endpoint: HttpEndpoint::new(http, server_url)?,
        })
    }
}

#[async_trait]
impl ItemResource for HttpItemResource {
    async fn list(&self) -> Result<Vec<Item>> {
        let url = self.endpoint.url(&["items"])?;
        let response = self.endpoint.send(Method::GET, url).await?;
        response.json().await.context("malformed item list")
    }

    async fn create(&self, item: NewItem) -> Result<Item> {
        let url = self.endpoint.url(&["items"])?;
        let response = self.endpoint.send_json(Method::POST, url, &item).await?;
        response.json().await.context("malformed created item")
    }

    async fn update(&self, item: Item) -> Result<Item> {
        let url = self.endpoint.url(&["items", item.id.as_str()])?;
        let response = self.endpoint.send_json(Method::PATCH, url, &item).await?;
        response.json().await.context("malformed updated item")
    }

    async fn delete(&self, id: &ItemId) -> Result<()> {
        let url = self.endpoint.url(&["items", id.as_str()])?;
        self.endpoint.send(Method::DELETE, url).await?;
        Ok(())
    }
}

/// `StoreReseeder` over `POST /reset`.
#[derive(Clone)]
pub struct HttpStoreReseeder {
    endpoint: HttpEndpoint,
}

impl HttpStoreReseeder {
    pub fn new(server_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), server_url)
    }

    pub fn with_client(http: Client, server_url: &str) -> Result<Self> {
        Ok(Self {
            endpoint: HttpEndpoint::new(http, server_url)?,
        })
    }
}

#[async_trait]
impl StoreReseeder for HttpStoreReseeder {
    async fn reset(&self) -> Result<()> {
        let url = self.endpoint.url(&["reset"])?;
        self.endpoint.send(Method::POST, url).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/resource_tests.rs"]
mod tests;
