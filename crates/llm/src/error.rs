//! Mapping HTTP outcomes to [`LlmError`].

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use thoughts::LlmError;

/// Maps a non-success status. 429 becomes [`LlmError::RateLimited`] carrying
/// the `Retry-After` delay when the server sent one in seconds.
pub(crate) fn map_http_status(status: StatusCode, headers: &HeaderMap, body: &str) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimited {
            retry_after: retry_after(headers),
        };
    }
    LlmError::Api {
        status: status.as_u16(),
        body: body.to_string(),
    }
}

/// Maps a transport failure; `timeout` is what the request was given.
pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout: Option<Duration>) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(timeout.unwrap_or_default())
    } else if err.is_decode() {
        LlmError::InvalidResponse(err.to_string())
    } else {
        LlmError::Transport(err.to_string())
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn status_429_with_delay_maps_to_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let err = map_http_status(StatusCode::TOO_MANY_REQUESTS, &headers, "slow down");
        assert_eq!(
            err,
            LlmError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[test]
    fn unparsable_retry_after_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        let err = map_http_status(StatusCode::TOO_MANY_REQUESTS, &headers, "");
        assert_eq!(err, LlmError::RateLimited { retry_after: None });
    }

    #[test]
    fn other_statuses_map_to_api_with_body() {
        let err = map_http_status(StatusCode::NOT_FOUND, &HeaderMap::new(), "model 'x' not found");
        assert_eq!(
            err,
            LlmError::Api {
                status: 404,
                body: "model 'x' not found".into()
            }
        );
    }
}
