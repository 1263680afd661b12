//! Session reload.
//!
//! `reload` throws away everything derived from the project and builds it
//! again from disk:
//!
//! 1. clear the framework's project cache (best effort);
//! 2. prune module cache keys that match the internal pattern or start with
//!    the project root;
//! 3. as one guarded unit, drop the framework/project handles, bootstrap a
//!    new framework from the pruned cache and install a fresh lazy project
//!    accessor.
//!
//! Invalidation is destructive and happens before re-acquisition. If step 3
//! fails the default policy hands the error to the [`FailureReport`] and
//! exits through the [`ExitHook`]; the rollback policy puts the old handles
//! and pruned modules back, with the old accessor reset to unset.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use thiserror::Error;

use crate::config::{ReloadFailurePolicy, ReloadHook, ReplConfig};
use crate::framework::FrameworkError;
use crate::modules::Module;
use crate::session::{ReloadState, SessionState};

/// Keys of framework-internal modules.
pub const INTERNAL_PATTERN: &str = r"^skiff[-:]";

/// Exit status used when a reload is fatal.
pub const RELOAD_EXIT_CODE: i32 = 1;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to reload the framework: {0}")]
    Bootstrap(#[from] FrameworkError),

    #[error("invalid internal module pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// How a fatal reload ends the process.
#[derive(Clone)]
pub struct ExitHook(Arc<dyn Fn(i32) + Send + Sync>);

impl ExitHook {
    pub fn new(f: impl Fn(i32) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Terminate the process.
    pub fn process() -> Self {
        Self::new(|code| std::process::exit(code))
    }

    pub fn exit(&self, code: i32) {
        (self.0)(code)
    }
}

impl Default for ExitHook {
    fn default() -> Self {
        Self::process()
    }
}

impl fmt::Debug for ExitHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExitHook(..)")
    }
}

/// Where a fatal reload error goes before the exit hook runs. The kernel
/// only logs it; hosts with a user-facing stream install their own.
#[derive(Clone)]
pub struct FailureReport(Arc<dyn Fn(&ReloadError) + Send + Sync>);

impl FailureReport {
    pub fn new(f: impl Fn(&ReloadError) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Report nothing beyond the log line.
    pub fn silent() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, error: &ReloadError) {
        (self.0)(error)
    }
}

impl Default for FailureReport {
    fn default() -> Self {
        Self::silent()
    }
}

impl fmt::Debug for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FailureReport(..)")
    }
}

/// What a successful reload did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadReport {
    /// Module cache keys that were dropped, sorted.
    pub pruned: Vec<String>,
    /// Generation of the new framework handle.
    pub generation: u64,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum ReloadOutcome {
    Reloaded(ReloadReport),
    /// Re-acquisition failed; the previous session was restored.
    RolledBack(ReloadError),
    /// Re-acquisition failed and the exit hook was called. Only observable
    /// when the hook returns.
    Fatal(ReloadError),
}

impl ReloadOutcome {
    pub fn is_reloaded(&self) -> bool {
        matches!(self, ReloadOutcome::Reloaded(_))
    }
}

pub struct ReloadCoordinator {
    internal: Regex,
    policy: ReloadFailurePolicy,
    on_reload: Option<ReloadHook>,
    report: FailureReport,
    exit: ExitHook,
}

impl ReloadCoordinator {
    /// Exit-on-failure coordinator with no hook.
    pub fn new() -> Result<Self, ReloadError> {
        Ok(Self {
            internal: Regex::new(INTERNAL_PATTERN)?,
            policy: ReloadFailurePolicy::default(),
            on_reload: None,
            report: FailureReport::default(),
            exit: ExitHook::default(),
        })
    }

    /// Policy and hook from the shell configuration.
    pub fn from_config(config: &ReplConfig) -> Result<Self, ReloadError> {
        let mut coordinator = Self::new()?.with_policy(config.reload_failure);
        coordinator.on_reload = config.on_reload.clone();
        Ok(coordinator)
    }

    pub fn with_policy(mut self, policy: ReloadFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_on_reload(mut self, hook: ReloadHook) -> Self {
        self.on_reload = Some(hook);
        self
    }

    pub fn with_failure_report(mut self, report: FailureReport) -> Self {
        self.report = report;
        self
    }

    pub fn with_exit_hook(mut self, exit: ExitHook) -> Self {
        self.exit = exit;
        self
    }

    pub fn policy(&self) -> ReloadFailurePolicy {
        self.policy
    }

    /// Whether reload would drop `key` for a project rooted at `prefix`.
    pub fn is_stale(&self, key: &str, prefix: &str) -> bool {
        self.internal.is_match(key) || (!prefix.is_empty() && key.starts_with(prefix))
    }

    pub fn reload(&self, session: &mut SessionState) -> ReloadOutcome {
        let started = Instant::now();
        session.set_reload_state(ReloadState::Invalidating);

        if let Ok(framework) = session.framework() {
            framework.clear_project_cache();
        }

        let prefix = project_root(session).display().to_string();
        let mut pruned = Vec::new();
        for key in session.modules().keys() {
            if !self.is_stale(&key, &prefix) {
                continue;
            }
            if let Some(module) = session.modules_mut().remove(&key) {
                pruned.push(module);
            }
        }
        tracing::debug!(count = pruned.len(), prefix = %prefix, "pruned module cache");

        let (old_framework, mut old_project) = session.clear_handles();
        if let Some(accessor) = old_project.as_mut() {
            accessor.invalidate();
        }
        match session.install() {
            Ok(()) => {
                session.set_reload_state(ReloadState::Reloaded);
                let report = ReloadReport {
                    pruned: pruned.iter().map(|m| m.key.clone()).collect(),
                    generation: session.framework().map(|fw| fw.generation()).unwrap_or_default(),
                    elapsed: started.elapsed(),
                };
                tracing::info!(
                    generation = report.generation,
                    pruned = report.pruned.len(),
                    "reloaded in {:?}",
                    report.elapsed
                );
                if let Some(hook) = &self.on_reload {
                    hook.call(session);
                }
                ReloadOutcome::Reloaded(report)
            }
            Err(error) => {
                let error = ReloadError::from(error);
                match self.policy {
                    ReloadFailurePolicy::Exit => {
                        session.set_reload_state(ReloadState::Fatal);
                        tracing::error!("{error}");
                        self.report.report(&error);
                        self.exit.exit(RELOAD_EXIT_CODE);
                        ReloadOutcome::Fatal(error)
                    }
                    ReloadFailurePolicy::Rollback => {
                        tracing::warn!("{error}; restoring the previous session");
                        restore(session, pruned);
                        session.restore_handles(old_framework, old_project);
                        session.set_reload_state(ReloadState::Loaded);
                        ReloadOutcome::RolledBack(error)
                    }
                }
            }
        }
    }
}

impl fmt::Debug for ReloadCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadCoordinator")
            .field("internal", &self.internal.as_str())
            .field("policy", &self.policy)
            .field("on_reload", &self.on_reload)
            .finish()
    }
}

/// Root of the current project without computing it: the cached project's
/// root, else the directory the accessor would load, else the session root.
fn project_root(session: &SessionState) -> PathBuf {
    match session.project_accessor() {
        Some(accessor) => accessor
            .peek()
            .map(|project| project.root.clone())
            .unwrap_or_else(|| accessor.dir().to_path_buf()),
        None => session.root().to_path_buf(),
    }
}

fn restore(session: &mut SessionState, modules: Vec<Arc<Module>>) {
    for module in modules {
        session.modules_mut().restore(module);
    }
}
