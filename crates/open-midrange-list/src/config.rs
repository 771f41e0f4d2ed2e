//! List session settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ListError, ListResult};

/// Settings shared by list sessions and enumerators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    /// Attempts per call while the host reports the object locked.
    pub max_attempts: u32,
    /// Wait between lock retries, in milliseconds.
    pub retry_delay_ms: u64,
    /// Entries requested per get-entries call.
    pub block_size: usize,
    /// Host message ids that mean "object locked, try again".
    pub lock_message_ids: Vec<String>,
    /// Program that returns list entries.
    pub get_entries_program: String,
    /// Program that closes a list.
    pub close_program: String,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_ms: 5000,
            block_size: 100,
            lock_message_ids: vec!["CPF9803".to_string()],
            get_entries_program: "QGYGTLE".to_string(),
            close_program: "QGYCLST".to_string(),
        }
    }
}

impl ListConfig {
    /// Wait between lock retries.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Whether a host message id signals lock contention.
    pub fn is_lock_message(&self, id: &str) -> bool {
        self.lock_message_ids.iter().any(|lock| lock == id)
    }

    /// Reject settings a session cannot run with.
    pub fn validate(&self) -> ListResult<()> {
        if self.max_attempts == 0 {
            return Err(ListError::InvalidConfiguration {
                message: "max_attempts must be at least 1".to_string(),
            });
        }
        if self.block_size == 0 {
            return Err(ListError::InvalidConfiguration {
                message: "block_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ListConfig::default();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.retry_delay(), Duration::from_secs(5));
        assert_eq!(cfg.block_size, 100);
        assert!(cfg.is_lock_message("CPF9803"));
        assert!(!cfg.is_lock_message("CPF9801"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_document() {
        let cfg: ListConfig =
            serde_json::from_str(r#"{"retry_delay_ms": 0, "block_size": 25}"#).unwrap();
        assert_eq!(cfg.retry_delay_ms, 0);
        assert_eq!(cfg.block_size, 25);
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.close_program, "QGYCLST");
    }

    #[test]
    fn test_serde_roundtrip() {
        let cfg = ListConfig {
            lock_message_ids: vec!["CPF9803".into(), "CPF3202".into()],
            ..ListConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ListConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let cfg = ListConfig {
            max_attempts: 0,
            ..ListConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ListError::InvalidConfiguration { .. })
        ));
        let cfg = ListConfig {
            block_size: 0,
            ..ListConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
