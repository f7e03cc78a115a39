use crate::domain::{CrashInfo, ScriptStatus, StartRequest};
use crate::infra::config::{Config, endpoint_url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::BufReader;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {url} failed: {source}")]
    Transport { url: String, source: ureq::Error },

    #[error("{url} returned HTTP {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub type StreamReader = BufReader<ureq::BodyReader<'static>>;

/// Blocking client for the render backend.
#[derive(Clone, Debug)]
pub struct RenderClient {
    server: Url,
    agent: ureq::Agent,
    stream_agent: ureq::Agent,
}

impl RenderClient {
    pub fn new(server: Url, request_timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(request_timeout))
            .http_status_as_error(false)
            .build()
            .into();
        let stream_agent = ureq::Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            server,
            agent,
            stream_agent,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.server.clone(), config.request_timeout)
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    pub fn list_blend_files(&self) -> Result<Vec<String>, ClientError> {
        self.get_json("list_blend_files")
    }

    pub fn script_status(&self) -> Result<ScriptStatus, ClientError> {
        let body: StatusBody = self.get_json("script-status")?;
        Ok(ScriptStatus::from_label(&body.status))
    }

    pub fn crash_info(&self) -> Result<CrashInfo, ClientError> {
        self.get_json("crash-info")
    }

    /// Returns the backend's acknowledgement text.
    pub fn start_script(&self, request: &StartRequest) -> Result<String, ClientError> {
        let url = endpoint_url(&self.server, "start-script");
        let response = self
            .agent
            .post(&url)
            .header("User-Agent", &user_agent())
            .send_json(request)
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        let body = read_success_body(&url, response)?;
        Ok(ack_text(&body))
    }

    pub fn stop_script(&self) -> Result<String, ClientError> {
        let url = endpoint_url(&self.server, "stop-script");
        let response = self.call_get(&self.agent, &url)?;
        let body = read_success_body(&url, response)?;
        Ok(ack_text(&body))
    }

    /// Opens `/stream-logs`. The returned reader blocks until the server sends
    /// more data or closes the connection.
    pub fn open_stream(&self) -> Result<StreamReader, ClientError> {
        let url = endpoint_url(&self.server, "stream-logs");
        let response = self
            .stream_agent
            .get(&url)
            .header("User-Agent", &user_agent())
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .call()
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = read_body_text(&url, response)?;
            return Err(ClientError::Status {
                url,
                status,
                message: error_message(&body),
            });
        }

        Ok(BufReader::new(response.into_body().into_reader()))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = endpoint_url(&self.server, path);
        let response = self.call_get(&self.agent, &url)?;
        let body = read_success_body(&url, response)?;
        serde_json::from_str(&body).map_err(|source| ClientError::Decode { url, source })
    }

    fn call_get(
        &self,
        agent: &ureq::Agent,
        url: &str,
    ) -> Result<ureq::http::Response<ureq::Body>, ClientError> {
        agent
            .get(url)
            .header("User-Agent", &user_agent())
            .call()
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })
    }
}

fn user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn read_body_text(
    url: &str,
    mut response: ureq::http::Response<ureq::Body>,
) -> Result<String, ClientError> {
    response
        .body_mut()
        .read_to_string()
        .map_err(|source| ClientError::Transport {
            url: url.to_string(),
            source,
        })
}

fn read_success_body(
    url: &str,
    response: ureq::http::Response<ureq::Body>,
) -> Result<String, ClientError> {
    let status = response.status();
    let body = read_body_text(url, response)?;
    if status.is_success() {
        return Ok(body);
    }
    Err(ClientError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response".to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}

fn ack_text(body: &str) -> String {
    match serde_json::from_str::<StatusBody>(body) {
        Ok(parsed) => parsed.status,
        Err(_) => body.trim().to_string(),
    }
}
