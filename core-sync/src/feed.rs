//! # Feed Client
//!
//! Fetches the raw film locations feed through the host [`HttpClient`].
//!
//! The feed is a JSON object whose `data` member is an array of positional
//! rows. This module only checks that shape; decoding the rows is the
//! reconciler's job. One request per call, no retries.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::http::{HttpClient, HttpRequest};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::decoder::RawRow;
use crate::error::FetchError;

const ACCESS_TYPE_PARAM: &str = "accessType";
const ACCESS_TYPE_DOWNLOAD: &str = "DOWNLOAD";

pub struct FeedClient {
    http_client: Arc<dyn HttpClient>,
    url: Url,
    timeout: Option<Duration>,
}

impl FeedClient {
    /// Build a client for `feed_url`, adding `accessType=DOWNLOAD`
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if `feed_url` does not parse.
    pub fn new(http_client: Arc<dyn HttpClient>, feed_url: &str) -> Result<Self, FetchError> {
        let mut url = Url::parse(feed_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{feed_url}: {e}")))?;
        url.query_pairs_mut()
            .append_pair(ACCESS_TYPE_PARAM, ACCESS_TYPE_DOWNLOAD);

        Ok(Self {
            http_client,
            url,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// URL actually requested
    pub fn request_url(&self) -> &Url {
        &self.url
    }

    /// Fetch the feed and return its rows, undecoded
    ///
    /// # Errors
    ///
    /// - [`FetchError::Transport`] when the request does not complete
    /// - [`FetchError::Status`] for a non-2xx response
    /// - [`FetchError::Json`] or [`FetchError::InvalidPayload`] for a body
    ///   that is not the expected shape
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch(&self) -> Result<Vec<RawRow>, FetchError> {
        let mut request =
            HttpRequest::get(self.url.as_str()).header("Accept", "application/json");
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            warn!(status = response.status, "Feed request rejected");
            return Err(FetchError::Status {
                status: response.status,
            });
        }

        let rows = parse_payload(&response.body)?;
        debug!(rows = rows.len(), bytes = response.body.len(), "Feed fetched");
        Ok(rows)
    }
}

/// Pull the row array out of a feed body
///
/// # Errors
///
/// Returns [`FetchError::Json`] for invalid JSON and
/// [`FetchError::InvalidPayload`] when the top level is not an object, `data`
/// is missing or not an array, or a row is not an array.
pub fn parse_payload(body: &[u8]) -> Result<Vec<RawRow>, FetchError> {
    let value: Value = serde_json::from_slice(body)?;

    let Value::Object(mut object) = value else {
        return Err(FetchError::InvalidPayload(
            "top level is not an object".to_string(),
        ));
    };

    let data = object
        .remove("data")
        .ok_or_else(|| FetchError::InvalidPayload("missing 'data'".to_string()))?;

    let Value::Array(rows) = data else {
        return Err(FetchError::InvalidPayload(
            "'data' is not an array".to_string(),
        ));
    };

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            Value::Array(row) => Ok(row),
            _ => Err(FetchError::InvalidPayload(format!(
                "row {index} is not an array"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result};
    use bridge_traits::http::HttpResponse;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    const FEED: &str = "https://data.sfgov.org/api/views/yitu-d5am/rows.json";

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body),
        }
    }

    fn client(mock: MockHttpClient) -> FeedClient {
        FeedClient::new(Arc::new(mock), FEED).unwrap()
    }

    #[test]
    fn test_request_url_carries_download_param() {
        let feed = client(MockHttpClient::new());
        assert_eq!(
            feed.request_url().as_str(),
            "https://data.sfgov.org/api/views/yitu-d5am/rows.json?accessType=DOWNLOAD"
        );
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            FeedClient::new(Arc::new(MockHttpClient::new()), "not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_returns_rows() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|request| {
                request.url.ends_with("rows.json?accessType=DOWNLOAD")
                    && request.headers.get("Accept").map(String::as_str)
                        == Some("application/json")
            })
            .times(1)
            .returning(|_| Ok(response(200, r#"{"meta":{},"data":[[1,"a"],[2,"b"]]}"#)));

        let rows = client(mock).fetch().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], "b");
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .returning(|_| Ok(response(503, "unavailable")));

        let err = client(mock).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn test_transport_error() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .returning(|_| Err(BridgeError::OperationFailed("connection reset".to_string())));

        let err = client(mock).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_forwarded() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|request| request.timeout == Some(Duration::from_secs(5)))
            .returning(|_| Ok(response(200, r#"{"data":[]}"#)));

        let rows = client(mock)
            .with_timeout(Duration::from_secs(5))
            .fetch()
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_payload_shapes() {
        assert!(matches!(parse_payload(b"{"), Err(FetchError::Json(_))));
        assert!(matches!(
            parse_payload(b"[[1]]"),
            Err(FetchError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_payload(br#"{"meta":{}}"#),
            Err(FetchError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_payload(br#"{"data":{}}"#),
            Err(FetchError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_payload(br#"{"data":[[1],"row"]}"#),
            Err(FetchError::InvalidPayload(msg)) if msg.contains("row 1")
        ));
    }

    #[test]
    fn test_parse_payload_keeps_rows_untouched() {
        let rows = parse_payload(br#"{"data":[[1,null,"x",2.5]]}"#).unwrap();
        assert_eq!(rows, vec![vec![
            Value::from(1),
            Value::Null,
            Value::from("x"),
            Value::from(2.5)
        ]]);
    }
}
