//! Frame load failures.
//!
//! None of these escape the loader: each one is logged and the waiting
//! ticket resolves to `None`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("no url for frame {index}")]
    MissingUrl { index: i32 },

    #[error("section for frame {index} not received in time")]
    SectionTimeout { index: i32 },

    #[error("fetch {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("decode {url} failed: {reason}")]
    Decode { url: String, reason: String },
}

impl LoadError {
    /// Worth another attempt from the scheduler.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MissingUrl { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy() {
        assert!(!LoadError::MissingUrl { index: 1 }.is_retryable());
        assert!(LoadError::SectionTimeout { index: 1 }.is_retryable());
        assert!(
            LoadError::Fetch {
                url: "http://x/1.jpg".into(),
                reason: "status 503".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_messages() {
        let err = LoadError::Decode {
            url: "file:///a.png".into(),
            reason: "bad header".into(),
        };
        assert_eq!(err.to_string(), "decode file:///a.png failed: bad header");
    }
}
