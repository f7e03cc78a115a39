use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct FrameEvent {
    pub frame: i64,
    pub time: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct CrashInfo {
    #[serde(default)]
    pub crash_count: u64,
    #[serde(default)]
    pub crash_reasons: Vec<String>,
}

impl CrashInfo {
    pub fn has_crashed(&self) -> bool {
        self.crash_count > 0 || !self.crash_reasons.is_empty()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptStatus {
    Running,
    Other(String),
}

impl ScriptStatus {
    pub fn from_label(label: &str) -> Self {
        if label == "running" {
            Self::Running
        } else {
            Self::Other(label.to_string())
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Other(label) => label,
        }
    }
}

/// Body of `POST /start-script`.
///
/// Frame bounds left unset are omitted so the backend falls back to its own
/// defaults.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StartRequest {
    pub blend_file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_frame: Option<i64>,
}
