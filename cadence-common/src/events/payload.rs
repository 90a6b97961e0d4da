//! Tagged event payloads
//!
//! Events carry a [`Payload`] instead of a dynamically typed value. The
//! expected variant for each event kind is documented on
//! [`UiEventKind`](super::UiEventKind) and
//! [`IntegrationEventKind`](super::IntegrationEventKind); the accessors below
//! return `None` when a consumer asks for the wrong variant.

use serde::{Deserialize, Serialize};

use crate::component::{ComponentStatus, ComponentType};

/// Event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value")]
pub enum Payload {
    /// No data attached
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Progress of a long-running operation
    Progress {
        /// 0-100
        percent: u8,
        message: String,
    },
    /// A component's health, as forwarded by the registry
    Status {
        component: ComponentType,
        status: ComponentStatus,
        message: String,
    },
    /// Structured data with no dedicated variant
    Json(serde_json::Value),
}

impl Payload {
    pub fn text(message: impl Into<String>) -> Self {
        Payload::Text(message.into())
    }

    /// Progress payload; `percent` is clamped to 100
    pub fn progress(percent: u8, message: impl Into<String>) -> Self {
        Payload::Progress {
            percent: percent.min(100),
            message: message.into(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Payload::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Payload::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Payload::Float(f) => Some(*f),
            Payload::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Text of `Text`, or the message of `Progress`/`Status`
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Progress { message, .. } | Payload::Status { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn as_progress(&self) -> Option<(u8, &str)> {
        match self {
            Payload::Progress { percent, message } => Some((*percent, message)),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Bool(value)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Int(value)
    }
}

impl From<f64> for Payload {
    fn from(value: f64) -> Self {
        Payload::Float(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}
