//! HTTP range source.
//!
//! Async client using `reqwest`; each window is one `GET` with a `Range`
//! header, and the object size comes from a `HEAD` request.

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, RANGE};
use tracing::debug;

use crate::plan::ByteRange;
use crate::source::{ByteStream, FetchError, RangeSource, SourceFuture};

/// Serves byte windows of a single URL.
pub struct HttpRangeSource {
    http: reqwest::Client,
    url: String,
}

impl HttpRangeSource {
    /// Creates a source with a default client.
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_client(http, url))
    }

    /// Creates a source sharing an existing client (and its connection pool).
    pub fn with_client(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RangeSource for HttpRangeSource {
    fn fetch(&self, range: Option<ByteRange>) -> SourceFuture<'_, Result<ByteStream, FetchError>> {
        Box::pin(async move {
            let mut req = self.http.get(&self.url);
            if let Some(r) = range {
                req = req.header(RANGE, r.header_value());
            }

            let resp = req.send().await?;
            check_status(range, resp.status(), header_length(resp.headers()))?;

            let stream = resp
                .bytes_stream()
                .map(|chunk| chunk.map_err(FetchError::from))
                .boxed();
            Ok(stream)
        })
    }

    fn probe_size(&self) -> SourceFuture<'_, Result<Option<u64>, FetchError>> {
        Box::pin(async move {
            let resp = self.http.head(&self.url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    range: "HEAD".into(),
                });
            }
            let size = header_length(resp.headers());
            debug!(url = %self.url, ?size, "probed object size");
            Ok(size)
        })
    }
}

/// Reads `Content-Length` straight from the headers.
///
/// `Response::content_length` reports the body size hint, which is zero for
/// `HEAD` responses.
fn header_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Accepts `206` for ranged requests, and `200` only when the server ignored
/// the `Range` header but the window happens to be the whole object.
fn check_status(
    range: Option<ByteRange>,
    status: StatusCode,
    content_length: Option<u64>,
) -> Result<(), FetchError> {
    match range {
        None if status.is_success() => Ok(()),
        Some(_) if status == StatusCode::PARTIAL_CONTENT => Ok(()),
        Some(r) if status == StatusCode::OK && r.start == 0 && content_length == Some(r.len()) => {
            Ok(())
        }
        _ => Err(FetchError::Status {
            status: status.as_u16(),
            range: range.map_or_else(|| "whole object".into(), |r| r.header_value()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn window(start: u64, end: u64) -> Option<ByteRange> {
        Some(ByteRange {
            index: 0,
            start,
            end,
        })
    }

    #[test]
    fn partial_content_accepted_for_ranges() {
        assert!(check_status(window(100, 199), StatusCode::PARTIAL_CONTENT, Some(100)).is_ok());
    }

    #[test]
    fn full_body_accepted_only_for_whole_object_window() {
        assert!(check_status(window(0, 99), StatusCode::OK, Some(100)).is_ok());
        // Server ignored Range on a middle window: would corrupt the artifact.
        let err = check_status(window(100, 199), StatusCode::OK, Some(1000)).unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 200, .. }));
        // First window, but the body is the whole (larger) object.
        assert!(check_status(window(0, 99), StatusCode::OK, Some(1000)).is_err());
    }

    #[test]
    fn whole_object_fetch_accepts_any_success() {
        assert!(check_status(None, StatusCode::OK, None).is_ok());
    }

    #[test]
    fn error_statuses_rejected() {
        let err = check_status(window(0, 9), StatusCode::NOT_FOUND, None).unwrap_err();
        match err {
            FetchError::Status { status, range } => {
                assert_eq!(status, 404);
                assert_eq!(range, "bytes=0-9");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(check_status(None, StatusCode::BAD_GATEWAY, None).is_err());
    }

    #[test]
    fn content_length_parsed_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(header_length(&headers), None);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("25000000"));
        assert_eq!(header_length(&headers), Some(25_000_000));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("bogus"));
        assert_eq!(header_length(&headers), None);
    }

    #[test]
    fn source_keeps_url() {
        let src = HttpRangeSource::with_client(reqwest::Client::new(), "https://example.com/f");
        assert_eq!(src.url(), "https://example.com/f");
    }
}
