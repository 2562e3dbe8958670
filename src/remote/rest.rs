// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use tracing::debug;

use super::{RemoteError, RemoteWriter};

const REST_PATH: &str = "rest/v1/";

/// [`RemoteWriter`] for a PostgREST-style table API (`/rest/v1/<table>`).
pub struct RestRemote {
    http: Client,
    base: Url,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

impl RestRemote {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| RemoteError::InvalidRequest(format!("base url: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base,
            api_key: api_key.into(),
            access_token: RwLock::new(None),
        })
    }

    /// Bearer token for the signed-in user. Falls back to the API key when unset.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    pub fn table_url(&self, table: &str) -> Result<Url, RemoteError> {
        if table.is_empty() || table.contains(['/', '?', '#']) {
            return Err(RemoteError::InvalidRequest(format!("table name '{table}'")));
        }
        self.base
            .join(REST_PATH)
            .and_then(|rest| rest.join(table))
            .map_err(|e| RemoteError::InvalidRequest(e.to_string()))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.api_key.clone());
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, table: &str, op: &'static str, builder: RequestBuilder) -> Result<(), RemoteError> {
        let resp = self.authorized(builder).send().await?;
        let status = resp.status();
        if status.is_success() {
            debug!(table, op, status = status.as_u16(), "Remote write applied");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Render a key value for an `eq.` filter. Strings go in bare.
pub(crate) fn eq_filter(value: &Value) -> String {
    match value {
        Value::String(s) => format!("eq.{s}"),
        other => format!("eq.{other}"),
    }
}

#[async_trait]
impl RemoteWriter for RestRemote {
    async fn insert(&self, table: &str, payload: &Value) -> Result<(), RemoteError> {
        let url = self.table_url(table)?;
        let req = self
            .http
            .post(url)
            .header("Prefer", "return=minimal")
            .json(payload);
        self.send(table, "insert", req).await
    }

    async fn update(
        &self,
        table: &str,
        key_field: &str,
        key_value: &Value,
        payload: &Value,
    ) -> Result<(), RemoteError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair(key_field, &eq_filter(key_value));
        let req = self
            .http
            .patch(url)
            .header("Prefer", "return=minimal")
            .json(payload);
        self.send(table, "update", req).await
    }

    async fn upsert(&self, table: &str, payload: &Value) -> Result<(), RemoteError> {
        let url = self.table_url(table)?;
        let req = self
            .http
            .post(url)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(payload);
        self.send(table, "upsert", req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote(base: &str) -> RestRemote {
        RestRemote::new(base, "anon-key", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_table_url_joins_rest_path() {
        let r = remote("https://abc.supabase.co");
        assert_eq!(
            r.table_url("vitals").unwrap().as_str(),
            "https://abc.supabase.co/rest/v1/vitals"
        );

        let nested = remote("https://gateway.example.org/db");
        assert_eq!(
            nested.table_url("triage").unwrap().as_str(),
            "https://gateway.example.org/db/rest/v1/triage"
        );
    }

    #[test]
    fn test_table_url_rejects_path_tricks() {
        let r = remote("https://abc.supabase.co");
        assert!(r.table_url("").is_err());
        assert!(r.table_url("../auth/v1/user").is_err());
        assert!(r.table_url("vitals?select=*").is_err());
    }

    #[test]
    fn test_eq_filter_rendering() {
        assert_eq!(eq_filter(&json!("p-17")), "eq.p-17");
        assert_eq!(eq_filter(&json!(42)), "eq.42");
        assert_eq!(eq_filter(&json!(true)), "eq.true");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            RestRemote::new("not a url", "k", Duration::from_secs(1)),
            Err(RemoteError::InvalidRequest(_))
        ));
    }
}
