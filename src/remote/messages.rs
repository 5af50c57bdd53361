use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ClientError, Result};

/// What the user wants out of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreativeSession,
    MixFeedback,
    PerformanceCoaching,
    AnalyticsOnly,
}

impl std::str::FromStr for Intent {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "creative_session" => Ok(Self::CreativeSession),
            "mix_feedback" => Ok(Self::MixFeedback),
            "performance_coaching" => Ok(Self::PerformanceCoaching),
            "analytics_only" => Ok(Self::AnalyticsOnly),
            other => Err(ClientError::InvalidRequest(format!("unknown intent: {}", other))),
        }
    }
}

/// Session metadata as assigned by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub user_id: String,
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_goal: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(with = "iso_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Server-side state of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub metadata: SessionMetadata,
    pub active: bool,
    /// Opaque to the client
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl SessionState {
    pub fn session_id(&self) -> &str {
        &self.metadata.session_id
    }

    /// The same state, marked closed
    pub fn into_inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// One audio frame on the wire: mono f32 PCM, base64 encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    pub session_id: String,
    pub frame_id: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: f64,
    pub waveform_base64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak: Option<f64>,
    /// Capture time, milliseconds since the Unix epoch
    pub timestamp_ms: f64,
}

impl AudioFrame {
    /// Build a frame for `samples` with a fresh frame ID
    pub fn from_samples(
        session_id: &str,
        samples: &[f32],
        sample_rate: u32,
        timestamp_ms: f64,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(ClientError::InvalidFrame("sample rate must be positive".into()));
        }
        if samples.is_empty() {
            return Err(ClientError::InvalidFrame("frame contains no samples".into()));
        }

        let pcm_bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        Ok(Self {
            session_id: session_id.to_string(),
            frame_id: new_frame_id(),
            sample_rate,
            channels: 1,
            duration_ms: duration_ms(samples.len(), sample_rate),
            waveform_base64: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            rms: None,
            peak: None,
            timestamp_ms,
        })
    }

    /// Decode the waveform back into samples
    pub fn decode_waveform(&self) -> Result<Vec<f32>> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.waveform_base64)
            .map_err(|e| ClientError::InvalidFrame(format!("waveform is not base64: {}", e)))?;

        if bytes.len() % 4 != 0 {
            return Err(ClientError::InvalidFrame(format!(
                "waveform length {} is not a multiple of 4",
                bytes.len()
            )));
        }

        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

/// Duration of `sample_count` mono samples at `sample_rate`
pub fn duration_ms(sample_count: usize, sample_rate: u32) -> f64 {
    sample_count as f64 / sample_rate as f64 * 1000.0
}

/// `frame_` followed by 32 lowercase hex digits
pub fn new_frame_id() -> String {
    format!("frame_{}", uuid::Uuid::new_v4().simple())
}

/// Event pushed by the remote service on the session stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub source: String,
    pub target: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
    #[serde(with = "iso_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl SessionEvent {
    /// Parse and validate one stream message
    pub fn decode(raw: &str) -> Result<Self> {
        let event: SessionEvent =
            serde_json::from_str(raw).map_err(|e| ClientError::StreamDecode(e.to_string()))?;

        if event.session_id.is_empty() {
            return Err(ClientError::StreamDecode("empty session_id".into()));
        }
        if event.source.is_empty() || event.target.is_empty() {
            return Err(ClientError::StreamDecode("empty source or target".into()));
        }

        Ok(event)
    }

    pub fn label(&self) -> String {
        format!("{}->{}:{}", self.source, self.target, self.session_id)
    }

    pub fn is_broadcast(&self) -> bool {
        self.target == "broadcast"
    }
}

/// Aggregate counters and timers, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetrySnapshot(pub BTreeMap<String, f64>);

impl TelemetrySnapshot {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Timestamps arrive either as RFC 3339 or as naive ISO-8601 (taken as UTC).
/// Always written back as RFC 3339.
mod iso_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
