use thiserror::Error;

/// API code returned when the request was blocked by risk control.
pub const CODE_REQUEST_BLOCKED: i64 = -412;
/// API code returned when the client is rate limited.
pub const CODE_RATE_LIMITED: i64 = -509;

/// Errors from a single Bilibili API call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { status: u16, endpoint: String },

    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("API error {code} from {endpoint}: {message}")]
    Api {
        code: i64,
        message: String,
        endpoint: String,
    },

    #[error("Unexpected response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl ApiError {
    /// Whether the call may succeed if repeated after a pause.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { .. } => true,
            Self::Api { code, .. } => matches!(*code, CODE_REQUEST_BLOCKED | CODE_RATE_LIMITED),
            Self::Decode { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> ApiError {
        ApiError::HttpStatus {
            status,
            endpoint: "/x/web-interface/view".into(),
        }
    }

    fn api(code: i64) -> ApiError {
        ApiError::Api {
            code,
            message: "msg".into(),
            endpoint: "/x/web-interface/view".into(),
        }
    }

    #[test]
    fn test_http_429_and_5xx_retryable() {
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
    }

    #[test]
    fn test_http_4xx_not_retryable() {
        assert!(!status(400).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!status(404).is_retryable());
    }

    #[test]
    fn test_risk_control_codes_retryable() {
        assert!(api(CODE_REQUEST_BLOCKED).is_retryable());
        assert!(api(CODE_RATE_LIMITED).is_retryable());
    }

    #[test]
    fn test_permanent_api_codes_not_retryable() {
        // -404: video removed, -403: no access, 62002: invisible
        assert!(!api(-404).is_retryable());
        assert!(!api(-403).is_retryable());
        assert!(!api(62002).is_retryable());
    }

    #[test]
    fn test_decode_not_retryable() {
        let e = ApiError::Decode {
            endpoint: "x".into(),
            reason: "missing data".into(),
        };
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_api_error_message() {
        let msg = api(-404).to_string();
        assert!(msg.contains("-404"));
        assert!(msg.contains("/x/web-interface/view"));
    }
}
