use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::remote::Intent;

/// Metadata sent to create a session.
///
/// The service assigns `session_id` and `created_at`; everything else comes from
/// the caller (usually a session form in the UI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub user_id: String,

    pub intent: Intent,

    /// DAW the user is working in, e.g. "Ableton"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daw: Option<String>,

    /// Musical key, e.g. "C#m" or "Bb"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Beats per minute, exclusive range (0, 400)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_goal: Option<String>,

    /// Reference tracks, in the order given
    #[serde(default)]
    pub references: Vec<String>,
}

impl SessionRequest {
    pub fn new(user_id: impl Into<String>, intent: Intent) -> Self {
        Self {
            user_id: user_id.into(),
            intent,
            daw: None,
            key: None,
            tempo: None,
            emotional_goal: None,
            references: Vec::new(),
        }
    }

    /// Same checks the service applies, so obviously bad forms fail before the round trip
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(ClientError::InvalidRequest("user_id must not be empty".into()));
        }

        if let Some(key) = &self.key {
            if !is_valid_key(key) {
                return Err(ClientError::InvalidRequest(format!(
                    "key must look like C, F#, Bb or Am, got {:?}",
                    key
                )));
            }
        }

        if let Some(tempo) = self.tempo {
            if !(tempo > 0.0 && tempo < 400.0) {
                return Err(ClientError::InvalidRequest(format!(
                    "tempo must be between 0 and 400 BPM, got {}",
                    tempo
                )));
            }
        }

        Ok(())
    }
}

/// Note letter, optional `#`/`b`, optional trailing `m`
fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars().peekable();

    match chars.next() {
        Some('A'..='G') => {}
        _ => return false,
    }
    if matches!(chars.peek(), Some('#') | Some('b')) {
        chars.next();
    }
    if chars.peek() == Some(&'m') {
        chars.next();
    }

    chars.next().is_none()
}
