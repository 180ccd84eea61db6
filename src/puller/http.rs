use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};

use crate::app::{EstuaryError, Result};
use crate::normalizer::Normalizer;
use crate::puller::{CacheValidator, PullOutcome, Puller};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpPuller {
    client: Client,
    normalizer: Normalizer,
}

impl HttpPuller {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(concat!("estuary/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EstuaryError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            normalizer: Normalizer::new(),
        })
    }

    fn conditional_headers(validator: &CacheValidator) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(etag) = validator.etag.as_deref().filter(|v| !v.is_empty()) {
            if let Ok(value) = HeaderValue::from_str(etag) {
                headers.insert(IF_NONE_MATCH, value);
            }
        }

        if let Some(last_modified) = validator.last_modified.as_deref().filter(|v| !v.is_empty()) {
            if let Ok(value) = HeaderValue::from_str(last_modified) {
                headers.insert(IF_MODIFIED_SINCE, value);
            }
        }

        headers
    }
}

#[async_trait]
impl Puller for HttpPuller {
    async fn pull(&self, url: &str, validator: &CacheValidator) -> Result<PullOutcome> {
        let response = self
            .client
            .get(url)
            .headers(Self::conditional_headers(validator))
            .send()
            .await
            .map_err(|e| EstuaryError::Unreachable(format!("{}: {}", url, e)))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(PullOutcome::NotModified);
        }

        if !response.status().is_success() {
            return Err(EstuaryError::Unreachable(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let fresh = CacheValidator {
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
        };

        let body = response
            .bytes()
            .await
            .map_err(|e| EstuaryError::Unreachable(format!("{}: {}", url, e)))?;

        let (feed, entries) = self.normalizer.normalize(&body, Utc::now())?;

        Ok(PullOutcome::Pulled {
            feed,
            entries,
            validator: fresh,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditional_headers() {
        let validator = CacheValidator {
            etag: Some("\"abc\"".into()),
            last_modified: Some("Mon, 01 Jan 2024 00:00:00 GMT".into()),
        };
        let headers = HttpPuller::conditional_headers(&validator);
        assert_eq!(headers.get(IF_NONE_MATCH).unwrap(), "\"abc\"");
        assert_eq!(
            headers.get(IF_MODIFIED_SINCE).unwrap(),
            "Mon, 01 Jan 2024 00:00:00 GMT"
        );
    }

    #[test]
    fn test_no_validators_no_headers() {
        let headers = HttpPuller::conditional_headers(&CacheValidator::default());
        assert!(headers.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let puller = HttpPuller::new(Duration::from_secs(2)).unwrap();
        let result = puller
            .pull("http://127.0.0.1:9/feed.xml", &CacheValidator::default())
            .await;
        assert!(matches!(result, Err(EstuaryError::Unreachable(_))));
    }
}
