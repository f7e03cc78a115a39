use crate::domain::{
    CrashInfo, ProgressEstimator, ProgressState, ReconnectDecision, StartRequest, StreamMessage,
    format_eta,
};
use crate::infra::{ClientError, Config, ConfigOverrides, EventStream, RenderClient};
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Tui {
        overrides: ConfigOverrides,
    },
    Command {
        command: CliCommand,
        overrides: ConfigOverrides,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliCommand {
    Files,
    Status,
    CrashInfo {
        json: bool,
    },
    Start {
        file: String,
        start: Option<i64>,
        end: Option<i64>,
    },
    Stop,
    Watch {
        end: Option<i64>,
    },
}

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error("unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for flag: {0}")]
    MissingFlagValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidFlagValue { flag: String, value: String },

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("missing scene file for start")]
    MissingSceneFile,
}

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to encode crash info: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    WriteOutput(#[from] io::Error),
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliInvocation::PrintHelp);
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut overrides = ConfigOverrides::default();
    let mut iter = args.iter().skip(1).peekable();
    while let Some(arg) = iter.peek() {
        if arg.as_str() == "--" {
            let _ = iter.next();
            break;
        }
        if !arg.starts_with('-') {
            break;
        }
        let Some(arg) = iter.next() else {
            break;
        };
        if !parse_global_flag(arg, &mut iter, &mut overrides)? {
            return Err(CliParseError::UnknownFlag(arg.to_string()));
        }
    }

    let Some(subcommand) = iter.next() else {
        return Ok(CliInvocation::Tui { overrides });
    };

    let command = match subcommand.as_str() {
        "files" => {
            expect_no_arguments(&mut iter, &mut overrides)?;
            CliCommand::Files
        }
        "status" => {
            expect_no_arguments(&mut iter, &mut overrides)?;
            CliCommand::Status
        }
        "stop" => {
            expect_no_arguments(&mut iter, &mut overrides)?;
            CliCommand::Stop
        }
        "crash-info" => {
            let mut json = false;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--json" => json = true,
                    _ if parse_global_flag(arg, &mut iter, &mut overrides)? => {}
                    _ if arg.starts_with('-') => {
                        return Err(CliParseError::UnknownFlag(arg.to_string()));
                    }
                    _ => return Err(CliParseError::UnexpectedArgument(arg.to_string())),
                }
            }
            CliCommand::CrashInfo { json }
        }
        "start" => {
            let mut file: Option<String> = None;
            let mut start: Option<i64> = None;
            let mut end: Option<i64> = None;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--start" => {
                        let value = iter.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--start".to_string())
                        })?;
                        start = Some(parse_frame_flag("--start", value)?);
                    }
                    "--end" => {
                        let value = iter.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--end".to_string())
                        })?;
                        end = Some(parse_frame_flag("--end", value)?);
                    }
                    _ if parse_global_flag(arg, &mut iter, &mut overrides)? => {}
                    _ if arg.starts_with('-') => {
                        return Err(CliParseError::UnknownFlag(arg.to_string()));
                    }
                    _ if file.is_none() => file = Some(arg.to_string()),
                    _ => return Err(CliParseError::UnexpectedArgument(arg.to_string())),
                }
            }
            let file = file.ok_or(CliParseError::MissingSceneFile)?;
            CliCommand::Start { file, start, end }
        }
        "watch" => {
            let mut end: Option<i64> = None;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--end" => {
                        let value = iter.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--end".to_string())
                        })?;
                        end = Some(parse_frame_flag("--end", value)?);
                    }
                    _ if parse_global_flag(arg, &mut iter, &mut overrides)? => {}
                    _ if arg.starts_with('-') => {
                        return Err(CliParseError::UnknownFlag(arg.to_string()));
                    }
                    _ => return Err(CliParseError::UnexpectedArgument(arg.to_string())),
                }
            }
            CliCommand::Watch { end }
        }
        other => return Err(CliParseError::UnknownSubcommand(other.to_string())),
    };

    Ok(CliInvocation::Command { command, overrides })
}

/// Consumes one global flag (and its value). Returns `false` when `arg` is not one.
fn parse_global_flag<'a>(
    arg: &str,
    iter: &mut impl Iterator<Item = &'a String>,
    overrides: &mut ConfigOverrides,
) -> Result<bool, CliParseError> {
    match arg {
        "--server" | "-s" => {
            let value = iter
                .next()
                .ok_or_else(|| CliParseError::MissingFlagValue("--server".to_string()))?;
            overrides.server = Some(value.to_string());
        }
        "--timeout" => {
            let value = iter
                .next()
                .ok_or_else(|| CliParseError::MissingFlagValue("--timeout".to_string()))?;
            overrides.timeout_secs = Some(parse_positive_flag("--timeout", value)?);
        }
        "--reconnect-attempts" => {
            let value = iter.next().ok_or_else(|| {
                CliParseError::MissingFlagValue("--reconnect-attempts".to_string())
            })?;
            overrides.reconnect_attempts = Some(parse_u32_flag("--reconnect-attempts", value)?);
        }
        "--eta-window" => {
            let value = iter
                .next()
                .ok_or_else(|| CliParseError::MissingFlagValue("--eta-window".to_string()))?;
            overrides.eta_window = Some(parse_positive_flag("--eta-window", value)? as usize);
        }
        "--no-reconnect" => overrides.no_reconnect = true,
        "--eta-raw" => overrides.eta_raw = true,
        _ => return Ok(false),
    }
    Ok(true)
}

fn expect_no_arguments<'a>(
    iter: &mut impl Iterator<Item = &'a String>,
    overrides: &mut ConfigOverrides,
) -> Result<(), CliParseError> {
    while let Some(arg) = iter.next() {
        if parse_global_flag(arg, iter, overrides)? {
            continue;
        }
        if arg.starts_with('-') {
            return Err(CliParseError::UnknownFlag(arg.to_string()));
        }
        return Err(CliParseError::UnexpectedArgument(arg.to_string()));
    }
    Ok(())
}

pub fn run(command: CliCommand, config: &Config) -> Result<(), CliRunError> {
    let client = RenderClient::from_config(config);
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    match command {
        CliCommand::Files => {
            for file in client.list_blend_files()? {
                if !write_line(&mut out, &file)? {
                    return Ok(());
                }
            }
        }
        CliCommand::Status => {
            let status = client.script_status()?;
            write_line(&mut out, status.label())?;
        }
        CliCommand::CrashInfo { json } => {
            let info = client.crash_info()?;
            if json {
                write_line(&mut out, &serde_json::to_string_pretty(&info)?)?;
            } else {
                print_crash_info(&mut out, &info)?;
            }
        }
        CliCommand::Start { file, start, end } => {
            let request = StartRequest {
                blend_file_path: file,
                start_frame: start,
                end_frame: end,
            };
            tracing::info!(file = %request.blend_file_path, ?start, ?end, "starting render");
            let ack = client.start_script(&request)?;
            write_line(&mut out, non_empty_or(&ack, "Script started"))?;
        }
        CliCommand::Stop => {
            let ack = client.stop_script()?;
            write_line(&mut out, non_empty_or(&ack, "Script stopped"))?;
        }
        CliCommand::Watch { end } => {
            let stderr = io::stderr();
            let mut err = io::BufWriter::new(stderr.lock());
            watch(&client, config, end, &mut out, &mut err)?;
        }
    }

    out.flush()?;
    Ok(())
}

fn print_crash_info(out: &mut impl Write, info: &CrashInfo) -> io::Result<()> {
    if !write_line(out, &format!("crash count: {}", info.crash_count))? {
        return Ok(());
    }
    if info.crash_reasons.is_empty() {
        write_line(out, "Not crashed yet")?;
        return Ok(());
    }
    for reason in &info.crash_reasons {
        if !write_line(out, &format!("- {}", reason.trim_end()))? {
            return Ok(());
        }
    }
    Ok(())
}

/// Follows the log stream until it closes for good.
fn watch(
    client: &RenderClient,
    config: &Config,
    end: Option<i64>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<(), CliRunError> {
    let estimator = ProgressEstimator::new(config.estimator);
    let mut state = ProgressState::new();
    let mut attempt = 0u32;
    let mut connected_once = false;
    let mut server_retry = None;

    loop {
        match client.open_stream() {
            Ok(reader) => {
                connected_once = true;
                let mut stream = EventStream::new(reader);
                loop {
                    match stream.next_message() {
                        Ok(Some(message)) => {
                            attempt = 0;
                            let written = report_message(
                                message,
                                &estimator,
                                &mut state,
                                end,
                                out,
                                || client.crash_info(),
                            )?;
                            if !written {
                                return Ok(());
                            }
                            out.flush()?;
                        }
                        Ok(None) => break,
                        Err(error) => {
                            tracing::warn!(%error, "log stream transport error");
                            break;
                        }
                    }
                }
                server_retry = stream.retry().or(server_retry);
            }
            Err(error) if !connected_once => return Err(error.into()),
            Err(error) => tracing::warn!(%error, "log stream unavailable"),
        }

        attempt = attempt.saturating_add(1);
        let backend_running = config.reconnect.is_enabled()
            && client
                .script_status()
                .map(|status| status.is_running())
                .unwrap_or(false);
        match config.reconnect.decide(attempt, backend_running) {
            ReconnectDecision::RetryAfter(delay) => {
                let delay = server_retry.map_or(delay, |retry: Duration| retry.max(delay));
                write_line(
                    err,
                    &format!(
                        "log stream ended; reconnecting in {:.1}s (attempt {attempt}/{})",
                        delay.as_secs_f64(),
                        config.reconnect.max_attempts
                    ),
                )?;
                err.flush()?;
                std::thread::sleep(delay);
            }
            ReconnectDecision::GiveUp => {
                write_line(err, "log stream closed")?;
                err.flush()?;
                return Ok(());
            }
        }
    }
}

/// Prints one stream message. Error messages are followed by a fresh crash
/// report. Returns `false` once stdout is gone.
fn report_message(
    message: StreamMessage,
    estimator: &ProgressEstimator,
    state: &mut ProgressState,
    end: Option<i64>,
    out: &mut impl Write,
    fetch_crash_info: impl FnOnce() -> Result<CrashInfo, ClientError>,
) -> io::Result<bool> {
    match message {
        StreamMessage::Frame(event) => {
            *state = estimator.on_frame_event(state, &event, end);
            write_line(out, &progress_line(event.frame, &event.time, state))
        }
        StreamMessage::Raw(text) => write_line(out, &text),
        StreamMessage::Error(text) => {
            if !write_line(out, &text)? {
                return Ok(false);
            }
            match fetch_crash_info() {
                Ok(info) => {
                    print_crash_info(out, &info)?;
                    Ok(true)
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to fetch crash info");
                    Ok(true)
                }
            }
        }
    }
}

fn progress_line(frame: i64, time: &str, state: &ProgressState) -> String {
    format!(
        "frame {frame}  time {time}  eta {}",
        format_eta(state.estimated_time_left)
    )
}

fn non_empty_or<'a>(text: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = text.trim();
    if trimmed.is_empty() { fallback } else { trimmed }
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<bool> {
    match writeln!(out, "{line}") {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(error) => Err(error),
    }
}

fn parse_frame_flag(flag: &str, value: &str) -> Result<i64, CliParseError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| CliParseError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        })
}

fn parse_u32_flag(flag: &str, value: &str) -> Result<u32, CliParseError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| CliParseError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        })
}

fn parse_positive_flag(flag: &str, value: &str) -> Result<u64, CliParseError> {
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(CliParseError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        }),
    }
}
