/*============================================================
  Synavera Project: Repogen
  Module: repogen::fetch
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    HTTP access for manifest documents, artifact size probes
    and artifact downloads, behind a small trait so resolution
    logic can run against an in-memory double.

  Security / Safety Notes:
    Performs read-only GET/HEAD requests. No credentials are
    transmitted.

  Dependencies:
    reqwest for HTTP, chrono for Last-Modified parsing,
    urlencoding for URL fix-ups.

  Operational Scope:
    Used by the manifest resolver and the API renderer when
    re-hosting artifacts.

  Revision History:
    2025-03-02 COD  Replaced RPC client with manifest fetcher.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Configurable timeouts; an unresponsive host cannot hang
      the run
    - Transport and status failures reported distinctly from
      payload failures
============================================================*/

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_LENGTH, LAST_MODIFIED};
use reqwest::Url;
use urlencoding::encode;

use crate::config::HttpConfig;
use crate::error::{RepogenError, Result};

/// Response to a GET, reduced to what manifest resolution needs.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub status: u16,
    pub body: Vec<u8>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Network operations the generator depends on.
///
/// Implementations report connection problems as
/// [`RepogenError::Transport`]; HTTP statuses are returned as-is.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn get(&self, url: &Url) -> Result<FetchedDocument>;

    /// Size of the resource in bytes, or `None` if it cannot be determined.
    async fn content_length(&self, url: &Url) -> Option<u64>;

    /// Download a resource, treating any non-success status as a failure.
    async fn download(&self, url: &Url) -> Result<Vec<u8>> {
        let document = self.get(url).await?;
        if !(200..300).contains(&document.status) {
            return Err(RepogenError::transport(
                url.as_str(),
                format!("HTTP {}", document.status),
            ));
        }
        Ok(document.body)
    }
}

/// Production fetcher backed by `reqwest`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout.max(1)))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| RepogenError::Config(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn get(&self, url: &Url) -> Result<FetchedDocument> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| RepogenError::transport(url.as_str(), err))?;
        let status = response.status().as_u16();
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_http_date);
        let body = response
            .bytes()
            .await
            .map_err(|err| RepogenError::transport(url.as_str(), err))?;
        Ok(FetchedDocument {
            status,
            body: body.to_vec(),
            last_modified,
        })
    }

    async fn content_length(&self, url: &Url) -> Option<u64> {
        let response = self.client.head(url.clone()).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
    }
}

/// Normalise a URL taken from a descriptor or manifest.
///
/// Surrounding whitespace is dropped and interior whitespace is
/// percent-encoded; everything else is left for the URL parser.
pub fn url_fixup(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut fixed = String::with_capacity(trimmed.len());
    let mut buf = [0u8; 4];
    for ch in trimmed.chars() {
        if ch.is_whitespace() {
            fixed.push_str(&encode(ch.encode_utf8(&mut buf)));
        } else {
            fixed.push(ch);
        }
    }
    fixed
}

/// Parse an HTTP-date (`Wed, 21 Oct 2015 07:28:00 GMT`).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}


#[cfg(test)]
mod tests {
    use super::testing::FakeFetcher;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixup_trims_and_encodes_whitespace() {
        assert_eq!(
            url_fixup("  https://example.org/my app/manifest.json \n"),
            "https://example.org/my%20app/manifest.json"
        );
        assert_eq!(url_fixup("https://example.org/a"), "https://example.org/a");
    }

    #[test]
    fn parses_http_dates() {
        assert_eq!(
            parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap())
        );
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[tokio::test]
    async fn download_rejects_error_statuses() {
        let fetcher = FakeFetcher::new()
            .bytes("https://example.org/ok.ipk", b"payload")
            .status("https://example.org/gone.ipk", 404);
        let ok = Url::parse("https://example.org/ok.ipk").unwrap();
        let gone = Url::parse("https://example.org/gone.ipk").unwrap();
        assert_eq!(fetcher.download(&ok).await.unwrap(), b"payload");
        assert!(fetcher.download(&gone).await.unwrap_err().is_transport());
    }
}
