//! Kernel configuration
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```json
//! { "max_mailboxes": 64, "max_pending_lines": 4 }
//! ```

use relay_kernel_core::{
    DEFAULT_MAX_LINE, DEFAULT_MAX_MAILBOXES, DEFAULT_MAX_PENDING_LINES, DEFAULT_MAX_SLOTS,
    MAX_MESSAGE_SIZE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Limits and driver parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Live user mailboxes
    pub max_mailboxes: usize,
    /// Buffered slots across all live user mailboxes
    pub max_slots: usize,
    /// Largest `max_size` a mailbox may be created with
    pub max_message_size: usize,
    /// Terminal line length, newline included
    pub max_line: usize,
    /// Completed lines held per terminal while no reader waits
    pub max_pending_lines: usize,
    /// Queued requests per disk unit before submitters block
    pub disk_queue_depth: usize,
    /// Queued write requests per terminal unit before writers block
    pub terminal_queue_depth: usize,
    /// Stack size of driver processes
    pub driver_stack_size: usize,
    /// Priority of driver processes
    pub driver_priority: u8,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_mailboxes: DEFAULT_MAX_MAILBOXES,
            max_slots: DEFAULT_MAX_SLOTS,
            max_message_size: MAX_MESSAGE_SIZE,
            max_line: DEFAULT_MAX_LINE,
            max_pending_lines: DEFAULT_MAX_PENDING_LINES,
            disk_queue_depth: 64,
            terminal_queue_depth: 64,
            driver_stack_size: 64 * 1024,
            driver_priority: 2,
        }
    }
}

impl KernelConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check limits for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_mailboxes == 0 {
            return Err(ConfigError::Invalid("max_mailboxes must be non-zero"));
        }
        if self.max_message_size == 0 || self.max_message_size > MAX_MESSAGE_SIZE {
            return Err(ConfigError::Invalid("max_message_size out of range"));
        }
        if self.max_line == 0 || self.max_line > self.max_message_size {
            return Err(ConfigError::Invalid("max_line must be in 1..=max_message_size"));
        }
        if self.max_pending_lines == 0 {
            return Err(ConfigError::Invalid("max_pending_lines must be non-zero"));
        }
        if self.disk_queue_depth == 0 || self.terminal_queue_depth == 0 {
            return Err(ConfigError::Invalid("queue depths must be non-zero"));
        }
        if self.driver_stack_size == 0 {
            return Err(ConfigError::Invalid("driver_stack_size must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let c = KernelConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.max_line, 80);
        assert_eq!(c.max_pending_lines, 10);
        assert_eq!(c.max_mailboxes, 2000);
        assert_eq!(c.max_slots, 2500);
    }

    #[test]
    fn test_partial_json() {
        let c = KernelConfig::from_json(r#"{"max_mailboxes": 8, "max_line": 40}"#).unwrap();
        assert_eq!(c.max_mailboxes, 8);
        assert_eq!(c.max_line, 40);
        assert_eq!(c.max_slots, DEFAULT_MAX_SLOTS);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            KernelConfig::from_json(r#"{"max_line": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            KernelConfig::from_json(r#"{"max_line": 5000}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            KernelConfig::from_json(r#"{"disk_queue_depth": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        let err = KernelConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("config parse error"));
    }
}
