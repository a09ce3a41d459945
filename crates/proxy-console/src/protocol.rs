use serde::{Deserialize, Serialize};

use crate::error::{ConsoleError, Result};
use crate::metrics::MetricSeries;
use crate::{Level, WireRecord};

/// Close code sent on a clean, client-initiated close.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Client to server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        level: Level,
        search: Option<String>,
    },
    Unsubscribe,
    UpdateFilter {
        level: Level,
        search: Option<String>,
    },
    GetPage {
        page: u32,
        level: Level,
        search: Option<String>,
    },
    GetBufferInfo,
    Ping,
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ConsoleError::json("client frame", e))
    }
}

/// Server-side log buffer statistics attached to some `info` frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferInfo {
    #[serde(default)]
    pub current_size: u64,
    #[serde(default)]
    pub max_size: u64,
    #[serde(default)]
    pub usage_percent: f64,
    #[serde(default)]
    pub memory_limit_mb: f64,
}

/// Paging metadata attached to `data` frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: u32,
    pub total_pages: u32,
    pub total_logs: u64,
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Realtime {
        #[serde(default)]
        logs: Vec<WireRecord>,
    },
    Data {
        #[serde(default)]
        logs: Vec<WireRecord>,
        #[serde(default)]
        page: u32,
        #[serde(default)]
        total_pages: u32,
        #[serde(default)]
        total_logs: u64,
    },
    Info {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        buffer_info: Option<BufferInfo>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
    Metrics {
        series: MetricSeries,
        data: serde_json::Value,
    },
    Ping,
    Pong,
}

impl ServerFrame {
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ConsoleError::json("server frame", e))
    }

    /// Human readable text of an `error` frame.
    pub fn error_text(message: Option<String>, error: Option<String>) -> String {
        message
            .or(error)
            .unwrap_or_else(|| "server reported an unspecified error".to_string())
    }
}

/// How a stream connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseKind {
    /// Close code 1000, initiated by us.
    Clean,
    /// Any other close code, a dropped socket, or a failed handshake.
    Abnormal { code: Option<u16>, reason: String },
}

impl CloseKind {
    /// Classifies a finished connection. Only a close we started ourselves
    /// with code 1000 is clean; a server-sent 1000 still warrants a reconnect.
    pub fn observed(initiated_locally: bool, code: Option<u16>, reason: impl Into<String>) -> Self {
        if initiated_locally && code == Some(NORMAL_CLOSURE) {
            CloseKind::Clean
        } else {
            CloseKind::Abnormal {
                code,
                reason: reason.into(),
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, CloseKind::Clean)
    }
}
