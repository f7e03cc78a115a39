mod app;
mod cli;
mod domain;
mod infra;
mod ui;

use crate::app::{AppCommand, AppEvent, AppModel, AppSettings};
use crate::cli::CliInvocation;
use crate::domain::StartRequest;
use crate::infra::{
    Config, ConfigOverrides, LogTarget, RenderClient, StreamEvent, StreamSubscription,
    SubscriptionId, init_logging, resolve_config, subscribe,
};
use crossterm::event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{ExecutableCommand, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use std::io::{self, Stdout, Write};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    App(#[from] crate::app::AppError),

    #[error(transparent)]
    Cli(#[from] crate::cli::CliRunError),

    #[error(transparent)]
    Config(#[from] crate::infra::ConfigError),

    #[error(transparent)]
    Logging(#[from] crate::infra::LoggingError),
}

fn main() {
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), MainError> {
    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Tui { overrides } => {
            let config = load_config(&overrides)?;
            let log_path = init_logging(LogTarget::File(config.log_dir.clone()))?;
            tracing::info!(server = %config.server, log = ?log_path, "starting control panel");
            Ok(run_tui(&config)?)
        }
        CliInvocation::Command { command, overrides } => {
            let config = load_config(&overrides)?;
            init_logging(LogTarget::Stderr)?;
            crate::cli::run(command, &config)?;
            Ok(())
        }
    }
}

fn load_config(overrides: &ConfigOverrides) -> Result<Config, MainError> {
    Ok(resolve_config(overrides)?)
}

fn print_help() {
    let text = format!(
        "{name} - control panel for a remote render server\n\nUSAGE:\n  {name} [FLAGS]                         Start the TUI\n  {name} files                           List scene files on the server\n  {name} status                          Print the render script status\n  {name} crash-info [--json]             Print crash count and reasons\n  {name} start FILE [--start N] [--end N]  Start a render (unset frames use server defaults)\n  {name} stop                            Stop the running render\n  {name} watch [--end N]                 Follow the log stream with progress and ETA\n  {name} --help | --version\n\nFLAGS:\n  --server URL, -s URL      Render server (default: {server})\n  --timeout SECS            Request timeout (default: 15)\n  --no-reconnect            Stop following the log once the stream ends\n  --reconnect-attempts N    Reconnects after a dropped stream (default: 5)\n  --eta-window N            Average the last N frame durations for the ETA\n  --eta-raw                 Let the ETA go negative past the end frame\n\nTUI KEYS:\n  Tab/Shift+Tab focus, F5 start, F6 stop, Ctrl+R refresh, PgUp/PgDn log, F1 help, Ctrl+Q quit\n\nENV:\n  RENDERBOX_SERVER        Render server URL\n  RENDERBOX_TIMEOUT_SECS  Request timeout in seconds\n  RENDERBOX_LOG_DIR       Log directory (default: ~/.renderbox/logs)\n  RENDERBOX_LOG           Log filter (default: info)\n",
        name = env!("CARGO_PKG_NAME"),
        server = crate::infra::DEFAULT_SERVER_URL,
    );
    let mut out = io::stdout().lock();
    let _ = write!(out, "{text}");
}

fn run_tui(config: &Config) -> Result<(), crate::app::AppError> {
    let model = AppModel::new(AppSettings {
        server_label: config.server.to_string(),
        estimator: config.estimator,
        reconnect: config.reconnect,
    });
    let mut terminal = setup_terminal()?;
    let result = run(&mut terminal, model, RenderClient::from_config(config));
    restore_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, app::AppError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let _ = stdout.execute(EnableBracketedPaste);
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
) -> Result<(), app::AppError> {
    disable_raw_mode()?;
    let _ = execute!(terminal.backend_mut(), DisableBracketedPaste);
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Executes reducer commands against the render server on worker threads.
struct Runtime {
    client: RenderClient,
    work_tx: Sender<AppEvent>,
    stream_tx: Sender<StreamEvent>,
    subscription: Option<StreamSubscription>,
}

impl Runtime {
    fn load_files(&self) {
        let client = self.client.clone();
        self.spawn(move || {
            let result = client.list_blend_files().map_err(|error| {
                tracing::warn!(%error, "failed to list scene files");
                error.to_string()
            });
            AppEvent::FilesLoaded(result)
        });
    }

    fn load_status(&self) {
        let client = self.client.clone();
        self.spawn(move || {
            let result = client.script_status().map_err(|error| {
                tracing::warn!(%error, "failed to query script status");
                error.to_string()
            });
            AppEvent::StatusLoaded(result)
        });
    }

    fn load_crash_info(&self) {
        let client = self.client.clone();
        self.spawn(move || {
            let result = client.crash_info().map_err(|error| {
                tracing::warn!(%error, "failed to fetch crash info");
                error.to_string()
            });
            AppEvent::CrashInfoLoaded(result)
        });
    }

    fn start(&self, request: StartRequest) {
        let client = self.client.clone();
        self.spawn(move || {
            tracing::info!(
                file = %request.blend_file_path,
                start = ?request.start_frame,
                end = ?request.end_frame,
                "starting render"
            );
            let result = client.start_script(&request).map_err(|error| {
                tracing::warn!(%error, "start request failed");
                error.to_string()
            });
            AppEvent::StartFinished(result)
        });
    }

    fn stop(&self) {
        let client = self.client.clone();
        self.spawn(move || {
            tracing::info!("stopping render");
            let result = client.stop_script().map_err(|error| {
                tracing::warn!(%error, "stop request failed");
                error.to_string()
            });
            AppEvent::StopFinished(result)
        });
    }

    fn check_reconnect(&self, attempt: u32) {
        let client = self.client.clone();
        self.spawn(move || {
            let result = client.script_status().map_err(|error| {
                tracing::warn!(%error, attempt, "status check before reconnect failed");
                error.to_string()
            });
            AppEvent::ReconnectStatus { attempt, result }
        });
    }

    fn subscribe(&mut self, id: SubscriptionId, delay: Duration) {
        self.subscription = Some(subscribe(
            self.client.clone(),
            id,
            delay,
            self.stream_tx.clone(),
        ));
    }

    /// Drops the stream handle once the model no longer follows it.
    fn sync_subscription(&mut self, wanted: Option<SubscriptionId>) {
        let stale = self
            .subscription
            .as_ref()
            .is_some_and(|handle| Some(handle.id()) != wanted);
        if stale {
            if let Some(handle) = self.subscription.take() {
                tracing::debug!(subscription = handle.id(), "closing log stream");
                handle.close();
            }
        }
    }

    fn spawn(&self, job: impl FnOnce() -> AppEvent + Send + 'static) {
        let tx = self.work_tx.clone();
        std::thread::spawn(move || {
            let _ = tx.send(job());
        });
    }

    /// Returns `false` when the app should exit.
    fn execute(&mut self, command: AppCommand) -> bool {
        match command {
            AppCommand::None => {}
            AppCommand::Quit => return false,
            AppCommand::Refresh => {
                self.load_files();
                self.load_crash_info();
            }
            AppCommand::FetchCrashInfo => self.load_crash_info(),
            AppCommand::StartRender(request) => self.start(request),
            AppCommand::StopRender => self.stop(),
            AppCommand::Subscribe { id, delay } => self.subscribe(id, delay),
            AppCommand::CheckReconnect { attempt } => self.check_reconnect(attempt),
        }
        true
    }
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut model: AppModel,
    client: RenderClient,
) -> Result<(), app::AppError> {
    let (work_tx, work_rx) = channel::<AppEvent>();
    let (stream_tx, stream_rx) = channel::<StreamEvent>();
    let mut runtime = Runtime {
        client,
        work_tx,
        stream_tx,
        subscription: None,
    };

    runtime.load_files();
    runtime.load_status();
    runtime.load_crash_info();

    loop {
        for event in drain(&work_rx).chain(drain(&stream_rx).map(AppEvent::Stream)) {
            let (next, keep_running) = apply(model, &mut runtime, event);
            model = next;
            if !keep_running {
                return Ok(());
            }
        }
        runtime.sync_subscription(model.subscription);

        let size = terminal.size()?;
        ui::clamp_scroll_state(&mut model, Rect::new(0, 0, size.width, size.height));
        terminal.draw(|frame| ui::render(frame, &model))?;

        if event::poll(Duration::from_millis(150))? {
            let event = match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => AppEvent::Key(key),
                Event::Paste(text) => AppEvent::Paste(text),
                _ => continue,
            };
            let (next, keep_running) = apply(model, &mut runtime, event);
            model = next;
            if !keep_running {
                return Ok(());
            }
            runtime.sync_subscription(model.subscription);
        }
    }
}

/// Runs one event through the reducer. The model is moved in so the shared log
/// buffer stays uniquely owned and appends never copy it.
fn apply(model: AppModel, runtime: &mut Runtime, event: AppEvent) -> (AppModel, bool) {
    let (next, command) = app::update(model, event);
    let keep_running = runtime.execute(command);
    (next, keep_running)
}

fn drain<T>(rx: &Receiver<T>) -> impl Iterator<Item = T> + '_ {
    std::iter::from_fn(move || match rx.try_recv() {
        Ok(value) => Some(value),
        Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
    })
}
