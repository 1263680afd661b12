//! The lazy `project` accessor.
//!
//! Memoized until invalidated: the first `get` after install or
//! `invalidate` asks the framework for the project, every other `get`
//! returns the cached handle without touching the framework.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::framework::{Framework, FrameworkError, Project};

#[derive(Debug, Clone)]
enum Memo<T> {
    Unset,
    Cached(T),
}

/// Accessor for the current project, bound to one framework handle.
#[derive(Debug)]
pub struct ProjectAccessor {
    framework: Arc<Framework>,
    dir: PathBuf,
    state: Memo<Arc<Project>>,
}

impl ProjectAccessor {
    /// Install an accessor in the `Unset` state.
    pub fn install(framework: Arc<Framework>, dir: impl Into<PathBuf>) -> Self {
        Self {
            framework,
            dir: dir.into(),
            state: Memo::Unset,
        }
    }

    /// The project, computing it on the first read after install or
    /// invalidation.
    pub fn get(&mut self) -> Result<Arc<Project>, FrameworkError> {
        if let Memo::Cached(project) = &self.state {
            return Ok(project.clone());
        }
        let project = self.framework.load(&self.dir)?;
        self.state = Memo::Cached(project.clone());
        Ok(project)
    }

    /// The cached project, without computing.
    pub fn peek(&self) -> Option<&Arc<Project>> {
        match &self.state {
            Memo::Cached(project) => Some(project),
            Memo::Unset => None,
        }
    }

    /// Force the next `get` to recompute.
    pub fn invalidate(&mut self) {
        self.state = Memo::Unset;
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.state, Memo::Cached(_))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
