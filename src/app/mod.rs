mod frame_input;

use crate::domain::{
    CrashInfo, EstimatorOptions, FrameEvent, ProgressEstimator, ProgressState, ReconnectDecision,
    ReconnectPolicy, ScriptStatus, StartRequest, StreamMessage,
};
use crate::infra::{StreamEvent, StreamSignal, SubscriptionId};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use frame_input::FrameInput;

pub const DEFAULT_START_FRAME: i64 = 1;
pub const DEFAULT_END_FRAME: i64 = 300;
pub const STOPPED_MARKER: &str = "Script stopped.";
const LOG_PAGE: usize = 10;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Render session lifecycle as seen by this client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Idle,
    /// Start request sent, not yet acknowledged.
    Starting,
    Running,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Focus {
    Files,
    StartFrame,
    EndFrame,
    Log,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Self::Files => Self::StartFrame,
            Self::StartFrame => Self::EndFrame,
            Self::EndFrame => Self::Log,
            Self::Log => Self::Files,
        }
    }

    fn prev(self) -> Self {
        match self {
            Self::Files => Self::Log,
            Self::StartFrame => Self::Files,
            Self::EndFrame => Self::StartFrame,
            Self::Log => Self::EndFrame,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppSettings {
    pub server_label: String,
    pub estimator: EstimatorOptions,
    pub reconnect: ReconnectPolicy,
}

#[derive(Clone, Debug)]
pub struct AppModel {
    pub server_label: String,
    pub phase: Phase,
    pub blend_files: Vec<String>,
    /// Index into the picker rows; row 0 is the empty "no file" choice.
    pub file_row: usize,
    pub start_frame: FrameInput,
    pub end_frame: FrameInput,
    pub log: Arc<String>,
    /// Lines in `log`, kept so rendering never rescans the buffer.
    pub log_lines: usize,
    /// Lines scrolled back from the tail; 0 follows new output.
    pub log_scroll_back: usize,
    pub crash: CrashInfo,
    pub current_frame: Option<FrameEvent>,
    pub progress: ProgressState,
    pub estimator: ProgressEstimator,
    pub reconnect: ReconnectPolicy,
    pub reconnect_attempt: u32,
    pub subscription: Option<SubscriptionId>,
    pub last_subscription: SubscriptionId,
    pub focus: Focus,
    pub help_open: bool,
    pub notice: Option<String>,
}

impl AppModel {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            server_label: settings.server_label,
            phase: Phase::Idle,
            blend_files: Vec::new(),
            file_row: 0,
            start_frame: FrameInput::from_value(DEFAULT_START_FRAME),
            end_frame: FrameInput::from_value(DEFAULT_END_FRAME),
            log: Arc::new(String::new()),
            log_lines: 0,
            log_scroll_back: 0,
            crash: CrashInfo::default(),
            current_frame: None,
            progress: ProgressState::new(),
            estimator: ProgressEstimator::new(settings.estimator),
            reconnect: settings.reconnect,
            reconnect_attempt: 0,
            subscription: None,
            last_subscription: 0,
            focus: Focus::Files,
            help_open: false,
            notice: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn can_start(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn can_stop(&self) -> bool {
        self.is_running()
    }

    /// Selected scene file; empty when the placeholder row is chosen.
    pub fn selected_file(&self) -> &str {
        self.file_row
            .checked_sub(1)
            .and_then(|index| self.blend_files.get(index))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn file_rows(&self) -> usize {
        self.blend_files.len() + 1
    }

    pub fn log_text(&self) -> &str {
        &self.log
    }

    fn append_log(&mut self, text: &str) {
        let log = Arc::make_mut(&mut self.log);
        log.push_str(text);
        log.push('\n');
        self.log_lines += text.split('\n').count();
    }

    fn open_subscription(&mut self) -> SubscriptionId {
        self.last_subscription = self.last_subscription.wrapping_add(1);
        self.subscription = Some(self.last_subscription);
        self.last_subscription
    }

    fn reset_progress(&mut self) {
        self.progress = ProgressState::new();
        self.current_frame = None;
        self.reconnect_attempt = 0;
    }
}

#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
    FilesLoaded(Result<Vec<String>, String>),
    StatusLoaded(Result<ScriptStatus, String>),
    CrashInfoLoaded(Result<CrashInfo, String>),
    StartFinished(Result<String, String>),
    StopFinished(Result<String, String>),
    Stream(StreamEvent),
    ReconnectStatus {
        attempt: u32,
        result: Result<ScriptStatus, String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum AppCommand {
    None,
    Quit,
    /// Reload the file list and the crash snapshot.
    Refresh,
    FetchCrashInfo,
    StartRender(StartRequest),
    StopRender,
    Subscribe {
        id: SubscriptionId,
        delay: Duration,
    },
    CheckReconnect {
        attempt: u32,
    },
}

pub fn update(model: AppModel, event: AppEvent) -> (AppModel, AppCommand) {
    match event {
        AppEvent::Key(key) => update_on_key(model, key),
        AppEvent::Paste(text) => update_on_paste(model, text),
        AppEvent::FilesLoaded(result) => update_files_loaded(model, result),
        AppEvent::StatusLoaded(result) => update_status_loaded(model, result),
        AppEvent::CrashInfoLoaded(result) => update_crash_info_loaded(model, result),
        AppEvent::StartFinished(result) => update_start_finished(model, result),
        AppEvent::StopFinished(result) => update_stop_finished(model, result),
        AppEvent::Stream(event) => update_stream(model, event),
        AppEvent::ReconnectStatus { attempt, result } => {
            update_reconnect_status(model, attempt, result)
        }
    }
}

pub fn start_render(mut model: AppModel) -> (AppModel, AppCommand) {
    if !model.can_start() {
        model.notice = Some("A render is already running.".to_string());
        return (model, AppCommand::None);
    }

    let request = StartRequest {
        blend_file_path: model.selected_file().to_string(),
        start_frame: model.start_frame.value(),
        end_frame: model.end_frame.value(),
    };
    model.phase = Phase::Starting;
    model.notice = Some("Starting render...".to_string());
    (model, AppCommand::StartRender(request))
}

pub fn stop_render(mut model: AppModel) -> (AppModel, AppCommand) {
    if !model.can_stop() {
        return (model, AppCommand::None);
    }

    model.phase = Phase::Idle;
    model.subscription = None;
    model.reconnect_attempt = 0;
    model.append_log(STOPPED_MARKER);
    model.notice = None;
    (model, AppCommand::StopRender)
}

fn update_on_key(mut model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
        return (model, AppCommand::Quit);
    }

    if model.help_open {
        if matches!(key.code, KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('?')) {
            model.help_open = false;
        }
        return (model, AppCommand::None);
    }

    match key.code {
        KeyCode::F(1) | KeyCode::Char('?') => {
            model.help_open = true;
            return (model, AppCommand::None);
        }
        KeyCode::F(5) => return start_render(model),
        KeyCode::F(6) => return stop_render(model),
        KeyCode::Char('s') if ctrl => return start_render(model),
        KeyCode::Char('x') if ctrl => return stop_render(model),
        KeyCode::Char('r') if ctrl => {
            model.notice = Some("Refreshing...".to_string());
            return (model, AppCommand::Refresh);
        }
        KeyCode::Tab => {
            model.focus = model.focus.next();
            return (model, AppCommand::None);
        }
        KeyCode::BackTab => {
            model.focus = model.focus.prev();
            return (model, AppCommand::None);
        }
        KeyCode::PageUp => {
            model.log_scroll_back = model.log_scroll_back.saturating_add(LOG_PAGE);
            return (model, AppCommand::None);
        }
        KeyCode::PageDown => {
            model.log_scroll_back = model.log_scroll_back.saturating_sub(LOG_PAGE);
            return (model, AppCommand::None);
        }
        _ => {}
    }

    match model.focus {
        Focus::Files => update_files_focus(&mut model, key),
        Focus::StartFrame => update_frame_focus(&mut model.start_frame, key),
        Focus::EndFrame => update_frame_focus(&mut model.end_frame, key),
        Focus::Log => update_log_focus(&mut model, key),
    }
    (model, AppCommand::None)
}

fn update_files_focus(model: &mut AppModel, key: KeyEvent) {
    let last = model.file_rows() - 1;
    match key.code {
        KeyCode::Up => model.file_row = model.file_row.saturating_sub(1),
        KeyCode::Down => model.file_row = (model.file_row + 1).min(last),
        KeyCode::Home => model.file_row = 0,
        KeyCode::End => model.file_row = last,
        _ => {}
    }
}

fn update_frame_focus(input: &mut FrameInput, key: KeyEvent) {
    match key.code {
        KeyCode::Char(ch) => {
            input.insert_char(ch);
        }
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete_forward(),
        KeyCode::Left => input.move_left(),
        KeyCode::Right => input.move_right(),
        KeyCode::Home => input.move_home(),
        KeyCode::End => input.move_end(),
        KeyCode::Up => input.step(1),
        KeyCode::Down => input.step(-1),
        _ => {}
    }
}

fn update_log_focus(model: &mut AppModel, key: KeyEvent) {
    match key.code {
        KeyCode::Up => model.log_scroll_back = model.log_scroll_back.saturating_add(1),
        KeyCode::Down => model.log_scroll_back = model.log_scroll_back.saturating_sub(1),
        KeyCode::Home => model.log_scroll_back = usize::MAX,
        KeyCode::End => model.log_scroll_back = 0,
        _ => {}
    }
}

fn update_on_paste(mut model: AppModel, text: String) -> (AppModel, AppCommand) {
    match model.focus {
        Focus::StartFrame => model.start_frame.insert_str(&text),
        Focus::EndFrame => model.end_frame.insert_str(&text),
        Focus::Files | Focus::Log => {}
    }
    (model, AppCommand::None)
}

fn update_files_loaded(
    mut model: AppModel,
    result: Result<Vec<String>, String>,
) -> (AppModel, AppCommand) {
    match result {
        Ok(files) => {
            let selected = model.selected_file().to_string();
            model.file_row = files
                .iter()
                .position(|file| *file == selected)
                .map(|index| index + 1)
                .unwrap_or(0);
            model.blend_files = files;
        }
        Err(error) => {
            model.notice = Some(format!("Failed to list scene files: {error}"));
        }
    }
    (model, AppCommand::None)
}

fn update_status_loaded(
    mut model: AppModel,
    result: Result<ScriptStatus, String>,
) -> (AppModel, AppCommand) {
    match result {
        Ok(status) if status.is_running() && model.phase == Phase::Idle => {
            model.phase = Phase::Running;
            model.reset_progress();
            model.notice = Some("Render already running; reattached to its log.".to_string());
            let id = model.open_subscription();
            (
                model,
                AppCommand::Subscribe {
                    id,
                    delay: Duration::ZERO,
                },
            )
        }
        Ok(_) => (model, AppCommand::None),
        Err(error) => {
            model.notice = Some(format!("Failed to query render status: {error}"));
            (model, AppCommand::None)
        }
    }
}

fn update_crash_info_loaded(
    mut model: AppModel,
    result: Result<CrashInfo, String>,
) -> (AppModel, AppCommand) {
    match result {
        Ok(crash) => model.crash = crash,
        Err(error) => model.notice = Some(format!("Failed to fetch crash info: {error}")),
    }
    (model, AppCommand::None)
}

fn update_start_finished(
    mut model: AppModel,
    result: Result<String, String>,
) -> (AppModel, AppCommand) {
    if model.phase != Phase::Starting {
        // Stopped while the start request was in flight.
        return (model, AppCommand::None);
    }

    match result {
        Ok(ack) => {
            model.phase = Phase::Running;
            model.reset_progress();
            model.notice = Some(if ack.is_empty() {
                "Render started.".to_string()
            } else {
                ack
            });
            let id = model.open_subscription();
            (
                model,
                AppCommand::Subscribe {
                    id,
                    delay: Duration::ZERO,
                },
            )
        }
        Err(error) => {
            model.phase = Phase::Idle;
            model.notice = Some(format!("Failed to start render: {error}"));
            (model, AppCommand::None)
        }
    }
}

fn update_stop_finished(
    mut model: AppModel,
    result: Result<String, String>,
) -> (AppModel, AppCommand) {
    if let Err(error) = result {
        model.notice = Some(format!("Stop request failed: {error}"));
    }
    (model, AppCommand::None)
}

fn update_stream(mut model: AppModel, event: StreamEvent) -> (AppModel, AppCommand) {
    if model.subscription != Some(event.subscription) {
        return (model, AppCommand::None);
    }

    match event.signal {
        StreamSignal::Message(message) => {
            model.reconnect_attempt = 0;
            apply_stream_message(model, message)
        }
        StreamSignal::Ended { error } => {
            model.subscription = None;
            if !model.reconnect.is_enabled() {
                model.phase = Phase::Idle;
                model.notice = Some(match error {
                    Some(error) => format!("Log stream closed: {error}"),
                    None => "Log stream closed.".to_string(),
                });
                return (model, AppCommand::None);
            }

            model.reconnect_attempt = model.reconnect_attempt.saturating_add(1);
            model.notice = Some("Log stream ended; checking render status...".to_string());
            let attempt = model.reconnect_attempt;
            (model, AppCommand::CheckReconnect { attempt })
        }
    }
}

fn apply_stream_message(mut model: AppModel, message: StreamMessage) -> (AppModel, AppCommand) {
    match message {
        StreamMessage::Frame(event) => {
            model.progress =
                model
                    .estimator
                    .on_frame_event(&model.progress, &event, model.end_frame.value());
            model.current_frame = Some(event);
            (model, AppCommand::None)
        }
        StreamMessage::Error(text) => {
            model.append_log(&text);
            (model, AppCommand::FetchCrashInfo)
        }
        StreamMessage::Raw(text) => {
            model.append_log(&text);
            (model, AppCommand::None)
        }
    }
}

fn update_reconnect_status(
    mut model: AppModel,
    attempt: u32,
    result: Result<ScriptStatus, String>,
) -> (AppModel, AppCommand) {
    if model.phase != Phase::Running
        || model.subscription.is_some()
        || attempt != model.reconnect_attempt
    {
        return (model, AppCommand::None);
    }

    let backend_running = matches!(&result, Ok(status) if status.is_running());
    match model.reconnect.decide(attempt, backend_running) {
        ReconnectDecision::RetryAfter(delay) => {
            model.notice = Some(format!(
                "Reconnecting to log stream (attempt {attempt}/{})...",
                model.reconnect.max_attempts
            ));
            let id = model.open_subscription();
            (model, AppCommand::Subscribe { id, delay })
        }
        ReconnectDecision::GiveUp => {
            model.phase = Phase::Idle;
            model.reconnect_attempt = 0;
            model.notice = Some(match result {
                Ok(status) if !status.is_running() => {
                    format!("Render finished (backend status: {}).", status.label())
                }
                Ok(_) => "Log stream lost; giving up after repeated failures.".to_string(),
                Err(error) => format!("Log stream lost: {error}"),
            });
            (model, AppCommand::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(reconnect: ReconnectPolicy) -> AppSettings {
        AppSettings {
            server_label: "http://127.0.0.1:5000".to_string(),
            estimator: EstimatorOptions::default(),
            reconnect,
        }
    }

    fn idle_model() -> AppModel {
        AppModel::new(settings(ReconnectPolicy::disabled()))
    }

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn stream(id: SubscriptionId, data: &str) -> AppEvent {
        AppEvent::Stream(StreamEvent {
            subscription: id,
            signal: StreamSignal::Message(StreamMessage::decode(data)),
        })
    }

    fn ended(id: SubscriptionId) -> AppEvent {
        AppEvent::Stream(StreamEvent {
            subscription: id,
            signal: StreamSignal::Ended {
                error: Some("connection reset".to_string()),
            },
        })
    }

    fn running_model(policy: ReconnectPolicy) -> (AppModel, SubscriptionId) {
        let model = AppModel::new(settings(policy));
        let (model, _) = update(model, key(KeyCode::F(5)));
        let (model, cmd) = update(model, AppEvent::StartFinished(Ok("Script started".to_string())));
        let AppCommand::Subscribe { id, .. } = cmd else {
            panic!("expected Subscribe");
        };
        (model, id)
    }

    #[test]
    fn start_is_optimistic_and_subscribes_after_ack() {
        let model = AppModel {
            blend_files: vec!["a.blend".to_string(), "b.blend".to_string()],
            file_row: 2,
            ..idle_model()
        };

        let (model, cmd) = update(model, key(KeyCode::F(5)));
        assert_eq!(model.phase, Phase::Starting);
        assert!(model.is_running());
        assert_eq!(
            cmd,
            AppCommand::StartRender(StartRequest {
                blend_file_path: "b.blend".to_string(),
                start_frame: Some(1),
                end_frame: Some(300),
            })
        );

        let (model, cmd) = update(model, AppEvent::StartFinished(Ok("Script started".to_string())));
        assert_eq!(model.phase, Phase::Running);
        assert!(matches!(cmd, AppCommand::Subscribe { id, .. } if Some(id) == model.subscription));
    }

    #[test]
    fn empty_selection_is_still_submitted() {
        let (_model, cmd) = update(idle_model(), key(KeyCode::F(5)));
        let AppCommand::StartRender(request) = cmd else {
            panic!("expected StartRender");
        };
        assert_eq!(request.blend_file_path, "");
    }

    #[test]
    fn failed_start_reverts_to_idle_without_subscribing() {
        let (model, _) = update(idle_model(), key(KeyCode::F(5)));
        let (model, cmd) = update(model, AppEvent::StartFinished(Err("HTTP 400".to_string())));
        assert_eq!(model.phase, Phase::Idle);
        assert!(!model.is_running());
        assert_eq!(cmd, AppCommand::None);
        assert!(model.subscription.is_none());
    }

    #[test]
    fn start_while_running_is_rejected() {
        let (model, _) = running_model(ReconnectPolicy::disabled());
        let (model, cmd) = start_render(model);
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(model.phase, Phase::Running);

        let (starting, _) = update(idle_model(), key(KeyCode::F(5)));
        let (_, cmd) = update(starting, key(KeyCode::F(5)));
        assert_eq!(cmd, AppCommand::None);
    }

    #[test]
    fn stop_while_idle_is_a_noop() {
        let model = idle_model();
        let (next, cmd) = stop_render(model);
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(next.phase, Phase::Idle);
        assert!(next.log_text().is_empty());
    }

    #[test]
    fn stop_goes_idle_immediately_and_marks_the_log() {
        let (model, _) = running_model(ReconnectPolicy::disabled());
        let (model, cmd) = update(model, key(KeyCode::F(6)));
        assert_eq!(cmd, AppCommand::StopRender);
        assert_eq!(model.phase, Phase::Idle);
        assert!(model.subscription.is_none());
        assert_eq!(model.log_text(), "Script stopped.\n");

        let (model, _) = update(model, AppEvent::StopFinished(Err("timeout".to_string())));
        assert_eq!(model.phase, Phase::Idle);
        assert_eq!(model.log_text(), "Script stopped.\n");
    }

    #[test]
    fn late_start_ack_after_stop_does_not_subscribe() {
        let (model, _) = update(idle_model(), key(KeyCode::F(5)));
        let (model, _) = stop_render(model);
        let (model, cmd) = update(model, AppEvent::StartFinished(Ok(String::new())));
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(model.phase, Phase::Idle);
    }

    #[test]
    fn stream_routing_by_message_shape() {
        let (model, id) = running_model(ReconnectPolicy::disabled());

        let (model, cmd) = update(model, stream(id, r#"{"frame":5,"time":"00:01.00"}"#));
        assert_eq!(cmd, AppCommand::None);
        assert!(model.log_text().is_empty());
        assert_eq!(model.current_frame.as_ref().map(|f| f.frame), Some(5));

        let (model, cmd) = update(model, stream(id, r#"{"error":"boom"}"#));
        assert_eq!(cmd, AppCommand::FetchCrashInfo);
        assert_eq!(model.log_text(), "boom\n");
        assert_eq!(model.phase, Phase::Running);

        let (model, cmd) = update(model, stream(id, "plain text"));
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(model.log_text(), "boom\nplain text\n");
    }

    #[test]
    fn frame_events_drive_the_estimate() {
        let (model, id) = running_model(ReconnectPolicy::disabled());
        let (model, _) = update(model, stream(id, r#"{"frame":10,"time":"00:08.89"}"#));
        assert_eq!(model.progress.estimated_time_left, None);

        let (model, _) = update(model, stream(id, r#"{"frame":11,"time":"00:09.10"}"#));
        let estimate = model.progress.estimated_time_left.expect("estimate");
        assert!((estimate - 289.0 * 8.89).abs() < 1e-6);
        assert_eq!(model.progress.last_frame_time.as_deref(), Some("00:09.10"));
    }

    #[test]
    fn restarting_clears_progress_from_the_previous_render() {
        let (model, id) = running_model(ReconnectPolicy::disabled());
        let (model, _) = update(model, stream(id, r#"{"frame":10,"time":"00:08.89"}"#));
        let (model, _) = update(model, stream(id, r#"{"frame":11,"time":"00:09.10"}"#));
        assert!(model.progress.estimated_time_left.is_some());

        let (model, _) = stop_render(model);
        let (model, _) = update(model, key(KeyCode::F(5)));
        let (model, cmd) = update(model, AppEvent::StartFinished(Ok("Script started".to_string())));
        let AppCommand::Subscribe { id, .. } = cmd else {
            panic!("expected Subscribe");
        };
        assert_eq!(model.progress, ProgressState::new());
        assert_eq!(model.current_frame, None);

        let (model, _) = update(model, stream(id, r#"{"frame":1,"time":"00:07.50"}"#));
        assert_eq!(model.progress.estimated_time_left, None);
        assert_eq!(model.progress.last_frame_time.as_deref(), Some("00:07.50"));
    }

    #[test]
    fn reattaching_to_a_running_render_clears_progress() {
        let mut model = idle_model();
        model.progress.last_frame_time = Some("00:08.89".to_string());
        model.progress.estimated_time_left = Some(12.0);
        model.current_frame = Some(FrameEvent {
            frame: 40,
            time: "00:08.89".to_string(),
        });

        let (model, cmd) = update(model, AppEvent::StatusLoaded(Ok(ScriptStatus::Running)));
        assert!(matches!(cmd, AppCommand::Subscribe { .. }));
        assert_eq!(model.progress, ProgressState::new());
        assert_eq!(model.current_frame, None);
    }

    #[test]
    fn log_line_count_tracks_appended_text() {
        let (model, id) = running_model(ReconnectPolicy::disabled());
        let (model, _) = update(model, stream(id, "Fra:1 Mem:12M"));
        let (model, _) = update(model, stream(id, "line one\nline two"));
        let (model, _) = update(model, stream(id, ""));
        assert_eq!(model.log_lines, 4);
        assert_eq!(model.log_lines, model.log_text().lines().count());
    }

    #[test]
    fn messages_from_a_closed_subscription_are_ignored() {
        let (model, id) = running_model(ReconnectPolicy::disabled());
        let (model, _) = stop_render(model);
        let (model, cmd) = update(model, stream(id, r#"{"error":"late"}"#));
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(model.log_text(), "Script stopped.\n");
    }

    #[test]
    fn transport_error_without_reconnect_goes_idle() {
        let (model, id) = running_model(ReconnectPolicy::disabled());
        let (model, cmd) = update(model, ended(id));
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(model.phase, Phase::Idle);
        assert!(model.subscription.is_none());
    }

    #[test]
    fn stream_end_with_reconnect_checks_status_then_resubscribes() {
        let (model, id) = running_model(ReconnectPolicy::default());
        let (model, cmd) = update(model, ended(id));
        assert_eq!(cmd, AppCommand::CheckReconnect { attempt: 1 });
        assert_eq!(model.phase, Phase::Running);

        let (model, cmd) = update(
            model,
            AppEvent::ReconnectStatus {
                attempt: 1,
                result: Ok(ScriptStatus::Running),
            },
        );
        let AppCommand::Subscribe { id: next_id, delay } = cmd else {
            panic!("expected Subscribe");
        };
        assert_ne!(next_id, id);
        assert_eq!(delay, Duration::from_millis(500));
        assert_eq!(model.subscription, Some(next_id));

        let (model, _) = update(model, stream(next_id, "Fra:12"));
        assert_eq!(model.reconnect_attempt, 0);
    }

    #[test]
    fn stream_end_after_render_finished_goes_idle() {
        let (model, id) = running_model(ReconnectPolicy::default());
        let (model, _) = update(model, ended(id));
        let (model, cmd) = update(
            model,
            AppEvent::ReconnectStatus {
                attempt: 1,
                result: Ok(ScriptStatus::Other("stopped".to_string())),
            },
        );
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(model.phase, Phase::Idle);
    }

    #[test]
    fn reconnect_gives_up_after_max_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: 1,
            ..ReconnectPolicy::default()
        };
        let (model, id) = running_model(policy);
        let (model, _) = update(model, ended(id));
        let (model, cmd) = update(
            model,
            AppEvent::ReconnectStatus {
                attempt: 1,
                result: Ok(ScriptStatus::Running),
            },
        );
        let AppCommand::Subscribe { id, .. } = cmd else {
            panic!("expected Subscribe");
        };
        let (model, cmd) = update(model, ended(id));
        assert_eq!(cmd, AppCommand::CheckReconnect { attempt: 2 });
        let (model, cmd) = update(
            model,
            AppEvent::ReconnectStatus {
                attempt: 2,
                result: Ok(ScriptStatus::Running),
            },
        );
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(model.phase, Phase::Idle);
    }

    #[test]
    fn reload_recovery_subscribes_without_starting() {
        let (model, cmd) = update(idle_model(), AppEvent::StatusLoaded(Ok(ScriptStatus::Running)));
        assert_eq!(model.phase, Phase::Running);
        assert!(matches!(cmd, AppCommand::Subscribe { .. }));

        let (model, cmd) = update(
            idle_model(),
            AppEvent::StatusLoaded(Ok(ScriptStatus::Other("stopped".to_string()))),
        );
        assert_eq!(model.phase, Phase::Idle);
        assert_eq!(cmd, AppCommand::None);
    }

    #[test]
    fn crash_info_is_replaced_wholesale() {
        let info = CrashInfo {
            crash_count: 2,
            crash_reasons: vec!["oom".to_string(), "segfault".to_string()],
        };
        let (model, _) = update(idle_model(), AppEvent::CrashInfoLoaded(Ok(info.clone())));
        let (model, _) = update(model, AppEvent::CrashInfoLoaded(Ok(info.clone())));
        assert_eq!(model.crash, info);

        let (model, _) = update(model, AppEvent::CrashInfoLoaded(Ok(CrashInfo::default())));
        assert!(model.crash.crash_reasons.is_empty());

        let (model, _) = update(model, AppEvent::CrashInfoLoaded(Err("down".to_string())));
        assert_eq!(model.crash, CrashInfo::default());
        assert!(model.notice.is_some());
    }

    #[test]
    fn file_list_reload_keeps_selection_by_name() {
        let model = AppModel {
            blend_files: vec!["a.blend".to_string(), "b.blend".to_string()],
            file_row: 2,
            ..idle_model()
        };
        let files = vec!["0.blend".to_string(), "a.blend".to_string(), "b.blend".to_string()];
        let (model, _) = update(model, AppEvent::FilesLoaded(Ok(files)));
        assert_eq!(model.selected_file(), "b.blend");

        let (model, _) = update(model, AppEvent::FilesLoaded(Err("refused".to_string())));
        assert_eq!(model.blend_files.len(), 3);
    }

    #[test]
    fn keys_edit_the_focused_field() {
        let model = AppModel {
            blend_files: vec!["a.blend".to_string()],
            ..idle_model()
        };
        let (model, _) = update(model, key(KeyCode::Down));
        assert_eq!(model.selected_file(), "a.blend");
        let (model, _) = update(model, key(KeyCode::Down));
        assert_eq!(model.file_row, 1);

        let (model, _) = update(model, key(KeyCode::Tab));
        let (model, _) = update(model, key(KeyCode::Tab));
        assert_eq!(model.focus, Focus::EndFrame);
        let (model, _) = update(model, key(KeyCode::Backspace));
        let (model, _) = update(model, key(KeyCode::Backspace));
        let (model, _) = update(model, AppEvent::Paste("50".to_string()));
        assert_eq!(model.end_frame.value(), Some(350));
    }

    #[test]
    fn help_overlay_swallows_keys_until_closed() {
        let (model, _) = update(idle_model(), key(KeyCode::Char('?')));
        assert!(model.help_open);
        let (model, cmd) = update(model, key(KeyCode::F(5)));
        assert_eq!(cmd, AppCommand::None);
        assert_eq!(model.phase, Phase::Idle);
        let (model, _) = update(model, key(KeyCode::Esc));
        assert!(!model.help_open);

        let ctrl_q = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL);
        let (_, cmd) = update(model, AppEvent::Key(ctrl_q));
        assert_eq!(cmd, AppCommand::Quit);
    }
}
