//! HTTP binding of the [`Source`] contract.
//!
//! Works against any static file host or object storage bucket that serves
//! `Last-Modified` headers: the image lives at the configured URL and its
//! detached signature at the same URL with `.ed25519` appended. Publication
//! of the pair is assumed atomic on the operator's side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header;
use tracing::debug;

use crate::error::UpdateError;
use crate::source::{Source, UpdateStream};
use crate::version::Version;

/// Update source fetching images over HTTP.
///
/// The URL may carry `{{.OS}}`, `{{.Arch}}` and `{{.Ext}}` tokens, which are
/// substituted at construction from the build-time platform identifiers so a
/// single configuration string serves every platform:
///
/// ```
/// use upkeep::HttpSource;
///
/// let source = HttpSource::new(None, "https://dl.example.com/app-{{.OS}}-{{.Arch}}{{.Ext}}");
/// ```
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    /// Create a source for `base_url`, substituting platform tokens. Pass a
    /// client to control timeouts, proxies or TLS; `None` uses a default
    /// client.
    pub fn new(client: Option<reqwest::Client>, base_url: impl Into<String>) -> Self {
        Self {
            client: client.unwrap_or_default(),
            base_url: replace_url_template(&base_url.into()),
        }
    }

    /// The effective URL after token substitution.
    pub fn url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn latest_version(&self) -> Result<Version, UpdateError> {
        let response = self.client.head(&self.base_url).send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::Source(anyhow::anyhow!(
                "HEAD {} returned {}",
                self.base_url,
                response.status()
            )));
        }

        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .ok_or_else(|| UpdateError::Source(anyhow::anyhow!("no Last-Modified served")))?
            .to_str()
            .map_err(|err| UpdateError::Source(anyhow::anyhow!("bad Last-Modified header: {err}")))?
            .to_owned();

        let date = DateTime::parse_from_rfc2822(&last_modified)
            .map_err(|err| {
                UpdateError::Source(anyhow::anyhow!(
                    "cannot parse Last-Modified {last_modified:?}: {err}"
                ))
            })?
            .with_timezone(&Utc);

        debug!("latest published build is from {last_modified}");
        Ok(Version::from_date(date))
    }

    async fn get(
        &self,
        current: Option<&Version>,
    ) -> Result<(UpdateStream, Option<u64>), UpdateError> {
        let mut request = self.client.get(&self.base_url);
        if let Some(date) = current.and_then(|v| v.date) {
            request = request.header(header::IF_MODIFIED_SINCE, http_date(date));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::Source(anyhow::anyhow!(
                "GET {} returned {}",
                self.base_url,
                response.status()
            )));
        }

        let content_length = response.content_length();
        let stream = response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other));
        Ok((Box::pin(stream), content_length))
    }

    async fn get_signature(&self) -> Result<[u8; 64], UpdateError> {
        let url = format!("{}.ed25519", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::Source(anyhow::anyhow!(
                "GET {url} returned {}",
                response.status()
            )));
        }

        if let Some(length) = response.content_length()
            && length != 64
        {
            return Err(UpdateError::SignatureShape { length });
        }

        let body = response.bytes().await?;
        if body.len() != 64 {
            return Err(UpdateError::SignatureShape { length: body.len() as u64 });
        }

        let mut signature = [0u8; 64];
        signature.copy_from_slice(&body);
        Ok(signature)
    }
}

/// Substitute `{{.OS}}`, `{{.Arch}}` and `{{.Ext}}` with the identifiers of
/// the platform this binary was built for.
fn replace_url_template(url: &str) -> String {
    let ext = if cfg!(windows) { ".exe" } else { "" };
    url.replace("{{.OS}}", std::env::consts::OS)
        .replace("{{.Arch}}", std::env::consts::ARCH)
        .replace("{{.Ext}}", ext)
}

/// RFC 1123 / HTTP-date rendering, always in GMT.
fn http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
