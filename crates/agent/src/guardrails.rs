use shopdesk_core::config::ChatConfig;
use shopdesk_core::errors::DomainError;

pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 4000;

/// Inbound message checks applied before any pipeline work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageGuardrails {
    max_message_chars: usize,
}

impl Default for MessageGuardrails {
    fn default() -> Self {
        Self { max_message_chars: DEFAULT_MAX_MESSAGE_CHARS }
    }
}

impl MessageGuardrails {
    pub fn new(max_message_chars: usize) -> Self {
        Self { max_message_chars }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.max_message_chars)
    }

    pub fn max_message_chars(&self) -> usize {
        self.max_message_chars
    }

    /// Empty text is accepted and classifies as a general inquiry.
    pub fn check(&self, text: &str) -> Result<(), DomainError> {
        let length = text.chars().count();
        if length > self.max_message_chars {
            return Err(DomainError::InvariantViolation(format!(
                "message is {length} characters; the limit is {}",
                self.max_message_chars
            )));
        }
        Ok(())
    }
}
