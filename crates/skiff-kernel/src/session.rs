//! Session state.
//!
//! One explicit struct owns the current framework handle, the lazy project
//! accessor, the module cache and the evaluation scopes. It is passed by
//! reference to the evaluator, the interceptor and the reload coordinator;
//! nothing looks these up ambiently. The handles are replaced, never
//! mutated, and only the reload coordinator replaces them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skiff_types::ContextId;

use crate::accessor::ProjectAccessor;
use crate::framework::{Framework, FrameworkError, Project, MANIFEST_FILE};
use crate::interpreter::scope::Scope;
use crate::modules::ModuleCache;

/// Lifecycle of the framework/project pair.
///
/// `Loaded → Invalidating → {Reloaded | Fatal}`. A rolled-back reload
/// returns to `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Loaded,
    Invalidating,
    Reloaded,
    Fatal,
}

impl fmt::Display for ReloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadState::Loaded => write!(f, "loaded"),
            ReloadState::Invalidating => write!(f, "invalidating"),
            ReloadState::Reloaded => write!(f, "reloaded"),
            ReloadState::Fatal => write!(f, "fatal"),
        }
    }
}

pub struct SessionState {
    root: PathBuf,
    manifest_path: PathBuf,
    use_global: bool,
    modules: ModuleCache,
    framework: Option<Arc<Framework>>,
    project: Option<ProjectAccessor>,
    globals: Scope,
    shell: Scope,
    reload_state: ReloadState,
}

impl SessionState {
    /// Bootstrap a session for the project rooted at `root`.
    ///
    /// Fails when the manifest is missing or the framework can't load;
    /// both are startup-fatal for the shell.
    pub fn bootstrap(root: impl Into<PathBuf>, use_global: bool) -> Result<Self, FrameworkError> {
        let root = root.into();
        let manifest_path = root.join(MANIFEST_FILE);
        let mut session = Self {
            root,
            manifest_path,
            use_global,
            modules: ModuleCache::new(),
            framework: None,
            project: None,
            globals: Scope::new(),
            shell: Scope::new(),
            reload_state: ReloadState::Loaded,
        };
        session.install()?;
        Ok(session)
    }

    /// Bootstrap the framework from the (possibly pruned) module cache and
    /// install a fresh lazy project accessor.
    pub fn install(&mut self) -> Result<(), FrameworkError> {
        let framework = Framework::bootstrap(&self.manifest_path, &mut self.modules)?;
        self.project = Some(ProjectAccessor::install(framework.clone(), self.root.clone()));
        self.framework = Some(framework);
        Ok(())
    }

    /// Drop both handles. Anything that still holds the old framework keeps
    /// a stale object.
    pub fn clear_handles(&mut self) -> (Option<Arc<Framework>>, Option<ProjectAccessor>) {
        (self.framework.take(), self.project.take())
    }

    /// Put previously cleared handles back.
    pub fn restore_handles(&mut self, framework: Option<Arc<Framework>>, project: Option<ProjectAccessor>) {
        self.framework = framework;
        self.project = project;
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn use_global(&self) -> bool {
        self.use_global
    }

    /// The current framework handle.
    pub fn framework(&self) -> Result<Arc<Framework>, FrameworkError> {
        self.framework.clone().ok_or(FrameworkError::NotLoaded)
    }

    /// The current project, computed lazily.
    pub fn project(&mut self) -> Result<Arc<Project>, FrameworkError> {
        match self.project.as_mut() {
            Some(accessor) => accessor.get(),
            None => Err(FrameworkError::NotLoaded),
        }
    }

    pub fn project_accessor(&self) -> Option<&ProjectAccessor> {
        self.project.as_ref()
    }

    pub fn modules(&self) -> &ModuleCache {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut ModuleCache {
        &mut self.modules
    }

    pub fn reload_state(&self) -> ReloadState {
        self.reload_state
    }

    pub(crate) fn set_reload_state(&mut self, state: ReloadState) {
        tracing::debug!(from = %self.reload_state, to = %state, "reload state");
        self.reload_state = state;
    }

    /// The context shell input evaluates in.
    pub fn default_context(&self) -> ContextId {
        if self.use_global {
            ContextId::Global
        } else {
            ContextId::Shell
        }
    }

    /// Whether `project` and `framework` resolve from `context`.
    pub fn handles_visible(&self, context: &ContextId) -> bool {
        match context {
            ContextId::Global | ContextId::Shell => true,
            ContextId::Module(_) => self.use_global,
        }
    }

    pub fn globals(&self) -> &Scope {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Scope {
        &mut self.globals
    }

    pub fn shell_scope(&self) -> &Scope {
        &self.shell
    }

    pub fn shell_scope_mut(&mut self) -> &mut Scope {
        &mut self.shell
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("root", &self.root)
            .field("use_global", &self.use_global)
            .field("modules", &self.modules.len())
            .field("framework", &self.framework.as_ref().map(|fw| fw.generation()))
            .field("reload_state", &self.reload_state)
            .finish()
    }
}
