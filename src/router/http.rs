// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request/response types and the network seam.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of every synthetic offline response.
pub const OFFLINE_STATUS: u16 = 503;

const OFFLINE_HTML: &str = "<!DOCTYPE html>\
<html lang=\"en\"><head><meta charset=\"utf-8\"><title>Offline</title></head>\
<body><h1>You are offline</h1>\
<p>This page is not available without a connection. Pending changes are saved and will sync when the connection returns.</p>\
</body></html>";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

/// An outgoing read.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// Full-page navigation (as opposed to a subresource or API call)
    pub navigate: bool,
    pub headers: BTreeMap<String, String>,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self, FetchError> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self {
            method,
            url,
            navigate: false,
            headers: BTreeMap::new(),
        })
    }

    pub fn get(url: &str) -> Result<Self, FetchError> {
        Self::new(Method::GET, url)
    }

    pub fn navigation(url: &str) -> Result<Self, FetchError> {
        let mut req = Self::get(url)?;
        req.navigate = true;
        Ok(req)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn cache_key(&self) -> String {
        cache_key_for(&self.url)
    }
}

/// Cache identity of a GET: method plus URL without its fragment.
#[must_use]
pub fn cache_key_for(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    format!("GET {url}")
}

/// Status, headers and body of a response, detached from any connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
}

impl ResponseSnapshot {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn offline_text() -> Self {
        Self::new(OFFLINE_STATUS, "Offline").with_header("content-type", "text/plain; charset=utf-8")
    }

    pub fn offline_html() -> Self {
        Self::new(OFFLINE_STATUS, OFFLINE_HTML).with_header("content-type", "text/html; charset=utf-8")
    }

    pub fn offline_json() -> Self {
        let body = serde_json::json!({
            "error": "offline",
            "message": "No connection and no cached data for this request",
        });
        Self::new(OFFLINE_STATUS, body.to_string()).with_header("content-type", "application/json")
    }
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Network access for the router. `Err` means the request never produced a
/// response; any status code, including 5xx, is an `Ok`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, FetchError>;
}

pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await?.to_vec();
        Ok(ResponseSnapshot {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_drops_fragment() {
        let a = Request::get("https://ward.example.org/app.js#v=2").unwrap();
        let b = Request::get("https://ward.example.org/app.js").unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(b.cache_key(), "GET https://ward.example.org/app.js");
    }

    #[test]
    fn test_query_is_part_of_identity() {
        let a = Request::get("https://db.example.org/rest/v1/vitals?ward=A").unwrap();
        let b = Request::get("https://db.example.org/rest/v1/vitals?ward=B").unwrap();
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(Request::get("::nope"), Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn test_body_survives_serialization_byte_for_byte() {
        let resp = ResponseSnapshot::new(200, vec![0u8, 159, 255, 10]).with_header("etag", "x");
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v["body"].is_string());
        let back: ResponseSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(back, resp);
    }

    #[test]
    fn test_synthetic_responses_are_not_success() {
        for resp in [
            ResponseSnapshot::offline_text(),
            ResponseSnapshot::offline_html(),
            ResponseSnapshot::offline_json(),
        ] {
            assert_eq!(resp.status, OFFLINE_STATUS);
            assert!(!resp.is_success());
        }
        assert!(ResponseSnapshot::offline_html().text().contains("offline"));
    }
}
