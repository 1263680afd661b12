//! Where skiff looks for things.
//!
//! | Purpose | Source |
//! |---------|--------|
//! | Project root | `--root`, else `$SKIFF_ROOT`, else the working directory |
//! | Manifest | `<root>/skiff.toml` |
//! | Shell customization | `<root>/skiff-repl.toml` |
//! | History | `$XDG_DATA_HOME/skiff/history.txt` |

use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::framework::MANIFEST_FILE;

/// Environment variable overriding the project root.
pub const ROOT_ENV: &str = "SKIFF_ROOT";

/// Optional file at the project root that registers extra shell commands.
pub const CUSTOMIZATION_FILE: &str = "skiff-repl.toml";

/// Resolve the project root from an explicit flag value, the environment,
/// and the working directory, in that order.
pub fn resolve_root(flag: Option<&Path>, env: Option<&str>, cwd: &Path) -> PathBuf {
    let chosen = match (flag, env.filter(|v| !v.is_empty())) {
        (Some(flag), _) => flag.to_path_buf(),
        (None, Some(env)) => PathBuf::from(env),
        (None, None) => return cwd.to_path_buf(),
    };
    if chosen.is_absolute() {
        chosen
    } else {
        cwd.join(chosen)
    }
}

/// [`resolve_root`] against the real environment.
pub fn root_from_env(flag: Option<&Path>) -> std::io::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let env = std::env::var(ROOT_ENV).ok();
    Ok(resolve_root(flag, env.as_deref(), &cwd))
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

pub fn customization_path(root: &Path) -> PathBuf {
    root.join(CUSTOMIZATION_FILE)
}

/// Get the user's home directory.
///
/// Returns `$HOME` or falls back to `/tmp` if not set.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Get the skiff data directory for persistent state.
///
/// Uses `$XDG_DATA_HOME/skiff` or falls back to `~/.local/share/skiff`.
pub fn data_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".local").join("share"))
        .join("skiff")
}

pub fn history_path() -> PathBuf {
    data_dir().join("history.txt")
}
