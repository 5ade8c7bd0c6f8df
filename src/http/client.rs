//! HTTP client wrapper with typed error classification.
//!
//! Transport failures, unexpected statuses, and body-decode failures are
//! distinct cases so callers can map them onto the resolution error
//! taxonomy (a 404 from a repository means "not found", a connect failure
//! means "unreachable"). This layer never retries; retry policy belongs to
//! callers above this subsystem.

use log::debug;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::io::Write;

/// Classified failure from a single HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: StatusCode },

    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl HttpError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HttpError::Status {
                status: StatusCode::NOT_FOUND,
                ..
            }
        )
    }
}

/// Thin wrapper over a shared reqwest [`Client`].
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Performs a GET request and deserializes the JSON response.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        debug!("GET JSON from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HttpError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status,
            });
        }

        response.json::<T>().await.map_err(|e| HttpError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Performs a GET request and returns the body as text.
    #[tracing::instrument(skip(self))]
    pub async fn get_text(&self, url: &str) -> Result<String, HttpError> {
        debug!("GET text from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HttpError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status,
            });
        }

        response.text().await.map_err(|e| HttpError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Downloads a URL into the writer produced by `create_writer`.
    /// Returns the number of bytes written.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64, HttpError>
    where
        W: Write,
        F: FnOnce() -> anyhow::Result<W>,
    {
        debug!("Downloading file from {}...", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HttpError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status,
            });
        }

        let mut writer = create_writer().map_err(|e| HttpError::Transport {
            url: url.to_string(),
            reason: format!("could not open download target: {e}"),
        })?;

        let mut total: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })? {
            writer.write_all(&chunk).map_err(|e| HttpError::Transport {
                url: url.to_string(),
                reason: format!("write failed: {e}"),
            })?;
            total += chunk.len() as u64;
        }

        writer.flush().map_err(|e| HttpError::Transport {
            url: url.to_string(),
            reason: format!("flush failed: {e}"),
        })?;

        debug!("Downloaded {} bytes from {}", total, url);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        value: String,
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/data.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"value": "hello"}"#)
            .create_async()
            .await;

        let client = HttpClient::default();
        let payload: Payload = client
            .get_json(&format!("{}/data.json", server.url()))
            .await
            .unwrap();

        assert_eq!(payload.value, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_json_not_found_is_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.json")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpClient::default();
        let err = client
            .get_json::<Payload>(&format!("{}/missing.json", server.url()))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_json_bad_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bad.json")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = HttpClient::default();
        let err = client
            .get_json::<Payload>(&format!("{}/bad.json", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_download_file_writes_all_bytes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/artifact.bin")
            .with_status(200)
            .with_body("artifact-bytes")
            .create_async()
            .await;

        let client = HttpClient::default();
        let mut buffer = Vec::new();
        let written = client
            .download_file(&format!("{}/artifact.bin", server.url()), || {
                Ok(&mut buffer)
            })
            .await
            .unwrap();

        assert_eq!(written, "artifact-bytes".len() as u64);
        assert_eq!(buffer, b"artifact-bytes");
    }

    #[tokio::test]
    async fn test_download_file_surfaces_status_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone.bin")
            .with_status(500)
            .create_async()
            .await;

        let client = HttpClient::default();
        let mut buffer = Vec::new();
        let err = client
            .download_file(&format!("{}/gone.bin", server.url()), || Ok(&mut buffer))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::Status { .. }));
        assert!(buffer.is_empty());
    }
}
