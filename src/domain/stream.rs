use crate::domain::FrameEvent;
use serde_json::Value;
use std::time::Duration;

/// One decoded message from the progress stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    Frame(FrameEvent),
    Error(String),
    /// Anything else, kept verbatim for the log.
    Raw(String),
}

impl StreamMessage {
    pub fn decode(data: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(data) else {
            return Self::Raw(data.to_string());
        };
        let Value::Object(fields) = &value else {
            return Self::Raw(data.to_string());
        };

        if fields.contains_key("frame") && fields.contains_key("time") {
            if let Ok(event) = serde_json::from_value::<FrameEvent>(value.clone()) {
                return Self::Frame(event);
            }
        }

        match fields.get("error") {
            Some(Value::String(text)) if !text.is_empty() => Self::Error(text.clone()),
            Some(Value::Null | Value::Bool(false)) | Some(Value::String(_)) | None => {
                Self::Raw(data.to_string())
            }
            // Zero is falsy like `false`; the line is only log text.
            Some(Value::Number(number)) if number.as_f64() == Some(0.0) => {
                Self::Raw(data.to_string())
            }
            Some(other) => Self::Error(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` decoder fed one line at a time.
#[derive(Clone, Debug, Default)]
pub struct SseDecoder {
    data: String,
    event: Option<String>,
    last_id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server-suggested reconnection delay, if one was sent.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "event" => self.event = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        Some(SseEvent {
            event,
            id: self.last_id.clone(),
            data,
        })
    }
}
