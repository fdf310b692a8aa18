//! Ready-made fetch sources
//!
//! This module provides fetch functions for the two places MES screen data
//! usually comes from: a REST endpoint returning JSON, or a JSON file (mock
//! data exported from the backend).

use std::path::PathBuf;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use crate::service::Fetcher;

/// Errors that can occur when reading from a source
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Failed to read a file
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Client fetching JSON from a REST endpoint
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    url: String,
}

impl HttpSource {
    /// Create a new HttpSource with a default client
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    /// Create a new HttpSource with a custom HTTP client
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the endpoint and parse the body as JSON
    ///
    /// Non-2xx answers carrying a JSON body are returned as-is so that failure
    /// envelopes reach the data service; other non-2xx answers are errors.
    pub async fn fetch(&self) -> Result<Value, SourceError> {
        tracing::debug!("HTTP fetch: url={}", self.url);

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(_) if !status.is_success() => Err(SourceError::Status {
                status: status.as_u16(),
                body: text,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// JSON file read on every fetch
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn fetch(&self) -> Result<Value, SourceError> {
        tracing::debug!("file fetch: path={}", self.path.display());

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Where a fetcher reads its data from
#[derive(Debug, Clone)]
pub enum Source {
    Http(HttpSource),
    File(FileSource),
}

impl Source {
    /// Picks HTTP for `http://`/`https://` locations and a file path otherwise
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Source::Http(HttpSource::new(location))
        } else {
            Source::File(FileSource::new(location))
        }
    }

    pub async fn fetch(&self) -> Result<Value, SourceError> {
        match self {
            Source::Http(source) => source.fetch().await,
            Source::File(source) => source.fetch().await,
        }
    }

    /// Adapts the source into a data service fetch function
    pub fn into_fetcher(self) -> Fetcher {
        Fetcher::new(move || {
            let source = self.clone();
            async move { source.fetch().await }
        })
    }
}
