//! skiff shell: interactive evaluation inside a skiff project.
//!
//! The shell owns the session and hands every line either to a slash
//! command or to the evaluation interceptor:
//! - Commands: `/cls`, `/reload`, `/promise`, `/help`, `/quit`, plus any
//!   declared in the project's `skiff-repl.toml`
//! - Expressions go through [`EvalInterceptor`], so deferred values are
//!   awaited and can be abandoned with Escape
//! - Line editing and history via rustyline, or plain stdin lines when the
//!   terminal is off

pub mod commands;
pub mod format;
pub mod terminal;

use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tokio::runtime::Runtime;

use skiff_kernel::reload::RELOAD_EXIT_CODE;
use skiff_kernel::{
    EvalInterceptor, EvaluationOutcome, EvaluationRequest, ExitHook, FailureReport, Interpreter,
    KeyListener, LogNotices, NoticeSink, ReloadCoordinator, ReloadOutcome, ReplConfig, SessionState,
};

use crate::commands::Customization;
use crate::format::Style;
use crate::terminal::{TerminalKeys, TerminalNotices};

/// Label evaluation requests from the prompt carry.
pub const SOURCE_LABEL: &str = "repl";

/// Returned from [`Repl::process_line`] when the shell should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRequested {
    pub status: u8,
}

impl fmt::Display for ExitRequested {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit requested (status {})", self.status)
    }
}

impl std::error::Error for ExitRequested {}

/// Result from command handling.
#[derive(Debug)]
enum CommandResult {
    /// Continue with optional output
    Continue(Option<String>),
    Exit(u8),
}

pub struct Repl {
    session: SessionState,
    interceptor: EvalInterceptor<Interpreter>,
    reloader: ReloadCoordinator,
    custom: Customization,
    config: ReplConfig,
    style: Style,
    runtime: Runtime,
}

impl Repl {
    /// Open the project at `root` with the settings from its manifest.
    pub fn open(root: &Path) -> Result<Self> {
        let manifest = skiff_kernel::paths::manifest_path(root);
        let config = ReplConfig::load_from(&manifest)?;
        Self::with_config(root, config)
    }

    /// Open the project at `root` with an explicit configuration.
    pub fn with_config(root: &Path, config: ReplConfig) -> Result<Self> {
        let session = SessionState::bootstrap(root, config.use_global)
            .context("Failed to load the skiff framework")?;
        let style = if config.terminal {
            Style::detect(&config)
        } else {
            Style::plain()
        };

        // The shell owns the user-facing report; the kernel only logs.
        let reloader = ReloadCoordinator::from_config(&config)
            .context("Failed to set up reload")?
            .with_failure_report(FailureReport::new(move |e| {
                eprintln!("{}", format::reload_failure(e, style));
            }));

        let interceptor = EvalInterceptor::new(Interpreter::new())
            .with_hint_delay(std::time::Duration::from_millis(config.hint_delay_ms));
        let interceptor = if config.terminal {
            interceptor
                .with_keys(TerminalKeys)
                .with_notices(TerminalNotices::new(style))
        } else {
            interceptor.with_notices(LogNotices)
        };

        // Single-threaded: evaluation never overlaps the prompt.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;

        Ok(Self {
            session,
            interceptor,
            reloader,
            custom: Customization::load_or_default(root),
            config,
            style,
            runtime,
        })
    }

    pub fn with_keys(mut self, keys: impl KeyListener + 'static) -> Self {
        self.interceptor = self.interceptor.with_keys(keys);
        self
    }

    pub fn with_notices(mut self, notices: impl NoticeSink + 'static) -> Self {
        self.interceptor = self.interceptor.with_notices(notices);
        self
    }

    /// Replace where a fatal reload is reported.
    pub fn with_failure_report(mut self, report: FailureReport) -> Self {
        self.reloader = self.reloader.with_failure_report(report);
        self
    }

    /// Replace how a fatal reload ends the process.
    pub fn with_exit_hook(mut self, exit: ExitHook) -> Self {
        self.reloader = self.reloader.with_exit_hook(exit);
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn config(&self) -> &ReplConfig {
        &self.config
    }

    pub fn customization(&self) -> &Customization {
        &self.custom
    }

    /// The prompt for the next line.
    pub fn prompt(&self) -> String {
        let name = self
            .session
            .framework()
            .ok()
            .and_then(|fw| fw.manifest().project.name.clone())
            .unwrap_or_else(|| "skiff".to_string());
        format::prompt(&self.config, &name, self.style)
    }

    /// Evaluate `code` through the interceptor and report any internal
    /// faults raised while delivering the result.
    pub fn evaluate(&mut self, code: &str) -> EvaluationOutcome {
        let request = EvaluationRequest::new(code, self.session.default_context(), SOURCE_LABEL);
        let outcome = self
            .runtime
            .block_on(self.interceptor.evaluate_outcome(request, &mut self.session));

        for fault in self.interceptor.drain_faults() {
            eprintln!("{}", format::fault(&fault, self.style));
        }
        outcome
    }

    /// Render an outcome; `None` when there is nothing to show.
    pub fn render(&self, outcome: &EvaluationOutcome) -> Option<String> {
        match outcome {
            EvaluationOutcome::Value(value) if value.is_null() && self.config.ignore_undefined => None,
            EvaluationOutcome::Value(value) => Some(format::value(value, self.style)),
            EvaluationOutcome::Failure(error) => Some(format::error(error, self.style)),
        }
    }

    /// Process a single line of input.
    ///
    /// Returns `Ok(None)` when there is nothing to print, and an
    /// [`ExitRequested`] error when the shell should stop.
    pub fn process_line(&mut self, line: &str) -> Result<Option<String>> {
        let trimmed = line.trim();

        if trimmed.starts_with('/') {
            return match self.handle_command(trimmed) {
                CommandResult::Continue(output) => Ok(output),
                CommandResult::Exit(status) => Err(ExitRequested { status }.into()),
            };
        }

        if trimmed.is_empty() {
            return Ok(None);
        }

        let outcome = self.evaluate(trimmed);
        Ok(self.render(&outcome))
    }

    /// Handle a command (starts with /).
    fn handle_command(&mut self, cmd: &str) -> CommandResult {
        let mut parts = cmd.split_whitespace();
        let command = parts.next().unwrap_or("");
        let has_args = parts.next().is_some();

        match command {
            "/quit" | "/q" | "/exit" => CommandResult::Exit(0),
            "/help" | "/h" | "/?" => CommandResult::Continue(Some(self.help())),
            "/cls" => {
                if self.config.terminal {
                    terminal::clear_screen();
                }
                CommandResult::Continue(None)
            }
            "/promise" => {
                let mode = self.interceptor.toggle_mode();
                CommandResult::Continue(Some(format::mode(mode).to_string()))
            }
            "/reload" => self.reload(),
            _ => {
                let name = command.trim_start_matches('/');
                match self.custom.get(name).cloned() {
                    Some(_) if has_args => {
                        CommandResult::Continue(Some(format!("Usage: /{name} (takes no arguments)")))
                    }
                    Some(custom) => {
                        let outcome = self.evaluate(&custom.eval);
                        CommandResult::Continue(self.render(&outcome))
                    }
                    None => CommandResult::Continue(Some(format!(
                        "Unknown command: {command}\nType /help for available commands."
                    ))),
                }
            }
        }
    }

    fn reload(&mut self) -> CommandResult {
        match self.reloader.reload(&mut self.session) {
            ReloadOutcome::Reloaded(report) => {
                CommandResult::Continue(Some(format::reload_report(&report)))
            }
            ReloadOutcome::RolledBack(e) => CommandResult::Continue(Some(format!(
                "Reload failed, previous session restored: {e}"
            ))),
            // The exit hook returned; the session is unusable either way.
            ReloadOutcome::Fatal(_) => CommandResult::Exit(RELOAD_EXIT_CODE as u8),
        }
    }

    fn help(&self) -> String {
        let mut text = HELP_TEXT.to_string();
        if !self.custom.is_empty() {
            text.push_str("\nProject commands:\n");
            text.push_str(&self.custom.help());
            text.push('\n');
        }
        text
    }
}

const HELP_TEXT: &str = r#"skiff shell

Commands:
  /help, /?         Show this help
  /quit, /q         Exit the shell
  /cls              Clear the screen
  /reload           Reload the framework and the current project
  /promise          Toggle awaiting of deferred values

Language:
  let x = 1 + 2     Bind a name
  project.name      The current project
  framework         The loaded framework
  require('util')   Load util.sk from the project root
  modules()         Keys in the module cache
  after(ms, v)      A deferred value resolving to v after ms
  sleep(ms)         A deferred null
  reject(ms, msg)   A deferred value that rejects
  pending()         A deferred value that never settles
  len str json keys fail resolve

While a deferred value is awaited, press Escape to stop waiting and get
the unresolved value back.
"#;

/// Save shell history to disk.
fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Path) {
    if let Some(parent) = history_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create history directory: {}", e);
        }
    }
    if let Err(e) = rl.save_history(history_path) {
        tracing::warn!("Failed to save history: {}", e);
    }
}

/// Run the shell until `/quit`, end of input or a fatal reload.
pub fn run(repl: Repl) -> Result<ExitCode> {
    if repl.config.terminal {
        run_editor(repl, skiff_kernel::paths::history_path())
    } else {
        run_plain(repl)
    }
}

fn handle_output(result: Result<Option<String>>) -> Option<ExitCode> {
    match result {
        Ok(Some(output)) => println!("{}", output),
        Ok(None) => {}
        Err(e) => match e.downcast_ref::<ExitRequested>() {
            Some(exit) => return Some(ExitCode::from(exit.status)),
            None => eprintln!("Error: {:#}", e),
        },
    }
    None
}

fn run_editor(mut repl: Repl, history_path: PathBuf) -> Result<ExitCode> {
    println!("skiff v{}", env!("CARGO_PKG_VERSION"));
    println!("Type /help for commands, /quit to exit.");

    let mut rl: Editor<(), DefaultHistory> = Editor::new().context("Failed to create editor")?;

    if let Err(e) = rl.load_history(&history_path) {
        // Missing history is expected on first run
        let is_not_found = matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
        if !is_not_found {
            tracing::warn!("Failed to load history: {}", e);
        }
    }

    println!();

    loop {
        match rl.readline(&repl.prompt()) {
            Ok(line) => {
                if let Err(e) = rl.add_history_entry(line.as_str()) {
                    tracing::warn!("Failed to add history entry: {}", e);
                }

                if let Some(code) = handle_output(repl.process_line(&line)) {
                    save_history(&mut rl, &history_path);
                    return Ok(code);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    save_history(&mut rl, &history_path);
    Ok(ExitCode::SUCCESS)
}

fn run_plain(mut repl: Repl) -> Result<ExitCode> {
    use std::io::Write;

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", repl.prompt());
        std::io::stdout().flush().context("Failed to write the prompt")?;

        let Some(line) = lines.next() else { break };
        let line = line.context("Failed to read input")?;
        if let Some(code) = handle_output(repl.process_line(&line)) {
            return Ok(code);
        }
    }
    println!();
    Ok(ExitCode::SUCCESS)
}
