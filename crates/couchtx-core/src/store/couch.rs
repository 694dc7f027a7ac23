//! CouchDB HTTP store over libcurl.
//!
//! Each request runs a blocking curl `Easy` transfer on tokio's blocking pool.
//! Documents are addressed as `{base}/{database}/{id}`; writes are `PUT` with
//! the document JSON (carrying `_rev` for updates).

use std::str;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use super::classify::{classify_status, status_error, StatusClass};
use super::{DocumentStore, StoreError};
use crate::config::CouchConfig;
use crate::document::{Document, WriteResult};

/// Connection options for a CouchDB database.
#[derive(Debug, Clone)]
pub struct CouchOptions {
    /// Server base URL, e.g. `http://127.0.0.1:5984/`.
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl Default for CouchOptions {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5984/".to_string(),
            database: "couchtx".to_string(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for one CouchDB database.
#[derive(Debug, Clone)]
pub struct CouchStore {
    database_url: Url,
    options: CouchOptions,
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Put,
}

impl CouchStore {
    pub fn new(options: CouchOptions) -> Result<Self> {
        let mut database_url = Url::parse(&options.url)
            .with_context(|| format!("invalid CouchDB url {:?}", options.url))?;
        if options.database.is_empty() {
            anyhow::bail!("CouchDB database name must not be empty");
        }
        database_url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("CouchDB url {:?} cannot be a base", options.url))?
            .pop_if_empty()
            .push(&options.database);
        Ok(Self {
            database_url,
            options,
        })
    }

    pub fn from_config(cfg: &CouchConfig) -> Result<Self> {
        Self::new(cfg.to_options())
    }

    pub fn database_url(&self) -> &Url {
        &self.database_url
    }

    /// URL of a single document; the id is encoded as one path segment.
    pub fn document_url(&self, id: &str) -> Url {
        let mut url = self.database_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
        }
        url
    }

    async fn request(
        &self,
        method: Method,
        id: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(u32, Vec<u8>), StoreError> {
        let url = self.document_url(id);
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || perform(method, url.as_str(), body, &options))
            .await
            .map_err(|e| StoreError::Unavailable(format!("request task failed: {}", e)))?
    }
}

/// Runs one blocking HTTP exchange and returns (status, response body).
fn perform(
    method: Method,
    url: &str,
    body: Option<Vec<u8>>,
    options: &CouchOptions,
) -> Result<(u32, Vec<u8>), StoreError> {
    let mut response = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.connect_timeout(options.connect_timeout)?;
    easy.timeout(options.timeout)?;
    if let Some(user) = &options.username {
        easy.username(user)?;
        easy.password(options.password.as_deref().unwrap_or(""))?;
    }

    let mut list = curl::easy::List::new();
    list.append("Accept: application/json")?;
    match method {
        Method::Get => easy.get(true)?,
        Method::Put => {
            easy.custom_request("PUT")?;
            list.append("Content-Type: application/json")?;
            easy.post_fields_copy(body.as_deref().unwrap_or(b"{}"))?;
        }
    }
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            response.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    tracing::trace!(
        method = ?method,
        url,
        status = code,
        body = str::from_utf8(&response).unwrap_or("<binary>"),
        "couch request"
    );
    Ok((code, response))
}

#[async_trait]
impl DocumentStore for CouchStore {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        let (code, body) = self.request(Method::Get, id, None).await?;
        match classify_status(code) {
            StatusClass::Success => Ok(serde_json::from_slice(&body)?),
            _ => Err(status_error(code, id, &body)),
        }
    }

    async fn insert(&self, doc: &Document) -> Result<WriteResult, StoreError> {
        let payload = serde_json::to_vec(doc)?;
        let (code, body) = self.request(Method::Put, &doc.id, Some(payload)).await?;
        match classify_status(code) {
            StatusClass::Success => Ok(serde_json::from_slice(&body)?),
            _ => Err(status_error(code, &doc.id, &body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_and_document_urls() {
        let store = CouchStore::new(CouchOptions {
            url: "http://127.0.0.1:5984".to_string(),
            database: "orders".to_string(),
            ..CouchOptions::default()
        })
        .unwrap();
        assert_eq!(store.database_url().as_str(), "http://127.0.0.1:5984/orders");
        assert_eq!(
            store.document_url("a/b c").as_str(),
            "http://127.0.0.1:5984/orders/a%2Fb%20c"
        );
    }

    #[test]
    fn base_url_with_trailing_slash() {
        let store = CouchStore::new(CouchOptions {
            url: "http://couch.local:5984/".to_string(),
            database: "db".to_string(),
            ..CouchOptions::default()
        })
        .unwrap();
        assert_eq!(store.document_url("1").as_str(), "http://couch.local:5984/db/1");
    }

    #[test]
    fn rejects_bad_url_and_empty_database() {
        assert!(CouchStore::new(CouchOptions {
            url: "not a url".to_string(),
            ..CouchOptions::default()
        })
        .is_err());
        assert!(CouchStore::new(CouchOptions {
            database: String::new(),
            ..CouchOptions::default()
        })
        .is_err());
    }
}
