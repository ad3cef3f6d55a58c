//! Errors - エラー型と分類
//!
//! # 分類
//! - Transient: 一時的なエラー（timeout, 接続失敗, 5xx/408/429）→ backoff 付きで retry
//! - Permanent: 恒久的なエラー（408/429 以外の 4xx）→ retry しない
//! - Validation: payload の検証失敗 → 次の候補 URL へ、単独では retry しない

use thiserror::Error;

/// ErrorKind は fetch 失敗の運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Validation,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// Failure of a single fetch / produce attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("host is offline")]
    Offline,

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("invalid payload: {0}")]
    Validation(String),

    #[error("gave up after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    pub fn status(status: u16, url: impl Into<String>) -> Self {
        Self::Status {
            status,
            url: url.into(),
        }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout | FetchError::Connection(_) | FetchError::Offline => {
                ErrorKind::Transient
            }
            FetchError::Status { status, .. } => {
                if *status >= 500 || *status == 408 || *status == 429 {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            FetchError::Validation(_) => ErrorKind::Validation,
            FetchError::RetryExhausted { .. } => ErrorKind::Permanent,
        }
    }

    /// Deterministic failures short-circuit the retry scheduler.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Permanent)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout)
    }

    /// Unwrap `RetryExhausted` down to the failure that started it.
    pub fn root(&self) -> &FetchError {
        match self {
            FetchError::RetryExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Persistent-store failure. Never escapes `TieredStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not supported on this host")]
    Unsupported,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata is malformed: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Raster decode / draw failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("cannot decode source: {0}")]
    Decode(String),

    #[error("source has no intrinsic size")]
    NoIntrinsicSize,

    #[error("raster surface unavailable: {0}")]
    Surface(String),

    #[error("draw failed: {0}")]
    Draw(String),

    #[error("export failed: {0}")]
    Export(String),
}

/// Output channel failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("output channel is disconnected")]
    Disconnected,

    #[error("rule rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(FetchError::Timeout, ErrorKind::Transient)]
    #[case(FetchError::connection("reset"), ErrorKind::Transient)]
    #[case(FetchError::Offline, ErrorKind::Transient)]
    #[case(FetchError::status(500, "u"), ErrorKind::Transient)]
    #[case(FetchError::status(503, "u"), ErrorKind::Transient)]
    #[case(FetchError::status(408, "u"), ErrorKind::Transient)]
    #[case(FetchError::status(429, "u"), ErrorKind::Transient)]
    #[case(FetchError::status(404, "u"), ErrorKind::Permanent)]
    #[case(FetchError::status(403, "u"), ErrorKind::Permanent)]
    #[case(FetchError::validation("empty"), ErrorKind::Validation)]
    fn classification(#[case] error: FetchError, #[case] expected: ErrorKind) {
        assert_eq!(error.kind(), expected);
    }

    #[test]
    fn not_found_is_terminal() {
        assert!(FetchError::status(404, "https://x/y.svg").is_terminal());
        assert!(!FetchError::Timeout.is_terminal());
        assert!(!FetchError::validation("x").is_terminal());
    }

    #[test]
    fn root_unwraps_exhaustion() {
        let err = FetchError::RetryExhausted {
            attempts: 3,
            source: Box::new(FetchError::Timeout),
        };
        assert_eq!(err.root(), &FetchError::Timeout);
        assert!(err.to_string().contains("3 attempts"));
    }
}
