use anyhow::{Context, Result};
use std::time::Duration;
use thiserror::Error;

use crate::key_pool::KeyPoolError;

/// Failures raised by the upstream HTTP clients themselves (as opposed to transport errors).
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{api} rate limited (HTTP 429)")]
    RateLimited { api: &'static str },
    #[error("{api} returned HTTP {status}: {body}")]
    HttpStatus {
        api: &'static str,
        status: u16,
        body: String,
    },
    #[error("{api} error: {message}")]
    Api { api: &'static str, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Timeout,
    Connect,
    RateLimited,
    HttpStatus,
    Upstream,
    Decode,
    Config,
    Other,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::RateLimited => "rate_limited",
            Self::HttpStatus => "http_status",
            Self::Upstream => "upstream",
            Self::Decode => "decode",
            Self::Config => "config",
            Self::Other => "other",
        }
    }

    /// Configuration problems never clear up by retrying.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config)
    }
}

/// Label for the `kind` dimension of `profiler_upstream_errors_total`.
pub fn classify_anyhow_api_error(err: &anyhow::Error) -> ApiErrorKind {
    for cause in err.chain() {
        if cause.downcast_ref::<KeyPoolError>().is_some() {
            return ApiErrorKind::Config;
        }
        if let Some(e) = cause.downcast_ref::<UpstreamError>() {
            return match e {
                UpstreamError::RateLimited { .. } => ApiErrorKind::RateLimited,
                UpstreamError::HttpStatus { .. } => ApiErrorKind::HttpStatus,
                UpstreamError::Api { .. } => ApiErrorKind::Upstream,
            };
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if e.is_timeout() {
                return ApiErrorKind::Timeout;
            }
            if e.is_connect() {
                return ApiErrorKind::Connect;
            }
            if e.is_decode() {
                return ApiErrorKind::Decode;
            }
            if e.is_status() {
                return ApiErrorKind::HttpStatus;
            }
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return ApiErrorKind::Decode;
        }
    }
    ApiErrorKind::Other
}

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("wallet-persona/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

/// Map a non-success response into an [`UpstreamError`]; pass successes through.
pub async fn check_status(api: &'static str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 429 {
        return Err(UpstreamError::RateLimited { api }.into());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(UpstreamError::HttpStatus {
        api,
        status: status.as_u16(),
        body,
    }
    .into())
}

/// Accept either a JSON string or number (providers disagree on numeric encodings).
pub fn de_opt_string_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumber;

    impl<'de> de::Visitor<'de> for StringOrNumber {
        type Value = Option<String>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a string, number or null")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2: serde::Deserializer<'de>>(
            self,
            d: D2,
        ) -> Result<Self::Value, D2::Error> {
            d.deserialize_any(self)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "de_opt_string_any", default)]
        v: Option<String>,
    }

    #[test]
    fn test_string_or_number_fields() {
        let a: Probe = serde_json::from_str(r#"{"v":"12"}"#).unwrap();
        let b: Probe = serde_json::from_str(r#"{"v":12}"#).unwrap();
        let c: Probe = serde_json::from_str(r#"{"v":null}"#).unwrap();
        let d: Probe = serde_json::from_str(r"{}").unwrap();
        assert_eq!(a.v.as_deref(), Some("12"));
        assert_eq!(b.v.as_deref(), Some("12"));
        assert!(c.v.is_none());
        assert!(d.v.is_none());
    }

    #[test]
    fn test_classify_walks_the_context_chain() {
        let err = anyhow::Error::from(KeyPoolError::NoKeys("alchemy")).context("fetch nfts");
        assert_eq!(classify_anyhow_api_error(&err), ApiErrorKind::Config);
        assert!(!classify_anyhow_api_error(&err).is_retryable());

        let err = anyhow::Error::from(UpstreamError::RateLimited { api: "etherscan" });
        assert_eq!(classify_anyhow_api_error(&err), ApiErrorKind::RateLimited);

        let err = anyhow::Error::from(UpstreamError::Api {
            api: "etherscan",
            message: "Invalid API Key".into(),
        });
        assert_eq!(classify_anyhow_api_error(&err).as_str(), "upstream");

        let err = anyhow::anyhow!("something odd");
        assert_eq!(classify_anyhow_api_error(&err), ApiErrorKind::Other);
        assert!(classify_anyhow_api_error(&err).is_retryable());
    }
}
