//! Shell configuration.
//!
//! Settings come from the `[repl]` table of the project's `skiff.toml`,
//! layered over the defaults below. The reload hook can only be set from
//! code.
//!
//! ```toml
//! [repl]
//! prompt = "demo> "
//! colors = false
//! icon = "sailboat"
//! use_global = true
//! hint_delay_ms = 5000
//! reload_failure = "rollback"
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::framework::Manifest;
use crate::session::SessionState;

/// What to do when the guarded part of a reload fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadFailurePolicy {
    /// Report and terminate the process.
    #[default]
    Exit,
    /// Restore the previous handles and pruned modules, then carry on.
    Rollback,
}

/// Callback run after a successful reload with the refreshed session.
#[derive(Clone)]
pub struct ReloadHook(Arc<dyn Fn(&SessionState) + Send + Sync>);

impl ReloadHook {
    pub fn new(f: impl Fn(&SessionState) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, session: &SessionState) {
        (self.0)(session)
    }
}

impl fmt::Debug for ReloadHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReloadHook(..)")
    }
}

/// Prompt icons, selected by key in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Sailboat,
    Anchor,
    Rocket,
    Sparkles,
    Zap,
    Gear,
    Package,
    Fire,
}

impl Icon {
    pub fn from_key(key: &str) -> Option<Icon> {
        match key.to_ascii_lowercase().as_str() {
            "sailboat" | "boat" => Some(Icon::Sailboat),
            "anchor" => Some(Icon::Anchor),
            "rocket" => Some(Icon::Rocket),
            "sparkles" => Some(Icon::Sparkles),
            "zap" | "lightning" => Some(Icon::Zap),
            "gear" => Some(Icon::Gear),
            "package" => Some(Icon::Package),
            "fire" => Some(Icon::Fire),
            _ => None,
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Icon::Sailboat => "⛵",
            Icon::Anchor => "⚓",
            Icon::Rocket => "🚀",
            Icon::Sparkles => "✨",
            Icon::Zap => "⚡",
            Icon::Gear => "⚙️",
            Icon::Package => "📦",
            Icon::Fire => "🔥",
        }
    }
}

fn default_hint_delay_ms() -> u64 {
    5_000
}

/// Configuration for the skiff shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Use the line editor and raw key input. Off means plain stdin lines.
    pub terminal: bool,

    /// Colorize prompt and results.
    pub colors: bool,

    /// Print nothing for `null` results.
    pub ignore_undefined: bool,

    /// Prompt text; defaults to `<project name> > `.
    pub prompt: Option<String>,

    /// Icon key shown before the prompt (see [`Icon`]).
    pub icon: Option<String>,

    /// Install `project`/`framework` and shell bindings in the global
    /// context rather than the shell's own.
    pub use_global: bool,

    /// Delay before the "press Escape" hint while awaiting a deferred value.
    #[serde(default = "default_hint_delay_ms")]
    pub hint_delay_ms: u64,

    pub reload_failure: ReloadFailurePolicy,

    #[serde(skip)]
    pub on_reload: Option<ReloadHook>,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            terminal: true,
            colors: true,
            ignore_undefined: true,
            prompt: None,
            icon: None,
            use_global: true,
            hint_delay_ms: default_hint_delay_ms(),
            reload_failure: ReloadFailurePolicy::default(),
            on_reload: None,
        }
    }
}

impl ReplConfig {
    /// Load the `[repl]` table from a manifest.
    pub fn load_from(manifest_path: &Path) -> Result<Self> {
        let manifest = Manifest::load(manifest_path)
            .with_context(|| format!("Failed to load config from {}", manifest_path.display()))?;
        Ok(manifest.repl)
    }

    /// Config for non-interactive use: no line editor, no colors.
    pub fn plain() -> Self {
        Self {
            terminal: false,
            colors: false,
            ..Self::default()
        }
    }

    pub fn with_terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_use_global(mut self, use_global: bool) -> Self {
        self.use_global = use_global;
        self
    }

    pub fn with_hint_delay_ms(mut self, ms: u64) -> Self {
        self.hint_delay_ms = ms;
        self
    }

    pub fn with_reload_failure(mut self, policy: ReloadFailurePolicy) -> Self {
        self.reload_failure = policy;
        self
    }

    pub fn with_on_reload(mut self, hook: impl Fn(&SessionState) + Send + Sync + 'static) -> Self {
        self.on_reload = Some(ReloadHook::new(hook));
        self
    }

    /// The configured icon, if the key is known.
    pub fn icon(&self) -> Option<Icon> {
        let key = self.icon.as_deref()?;
        let icon = Icon::from_key(key);
        if icon.is_none() {
            tracing::warn!("Unknown prompt icon: {}", key);
        }
        icon
    }

    /// Prompt text without colors.
    pub fn prompt_text(&self, project_name: &str) -> String {
        let base = self
            .prompt
            .clone()
            .unwrap_or_else(|| format!("{project_name} > "));
        match self.icon() {
            Some(icon) => format!("{} {}", icon.emoji(), base),
            None => base,
        }
    }
}
