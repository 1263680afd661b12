//! Project-defined shell commands.
//!
//! A `skiff-repl.toml` at the project root can register extra slash
//! commands, each evaluating a skiff expression:
//!
//! ```toml
//! [commands.deps]
//! help = "list the project's modules"
//! eval = "project.modules"
//! ```
//!
//! A missing file is normal. A broken one is reported and ignored.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use skiff_kernel::paths;

/// Names the shell already handles.
pub const BUILTIN_COMMANDS: &[&str] = &["cls", "reload", "promise", "help", "h", "?", "quit", "q", "exit"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomCommand {
    #[serde(default)]
    pub help: Option<String>,
    pub eval: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Customization {
    #[serde(default)]
    pub commands: BTreeMap<String, CustomCommand>,
}

impl Customization {
    pub fn parse(source: &str) -> Result<Self> {
        let mut custom: Customization = toml::from_str(source)?;
        custom.commands.retain(|name, _| {
            let usable = is_command_name(name) && !BUILTIN_COMMANDS.contains(&name.as_str());
            if !usable {
                tracing::warn!("Ignoring custom command /{}", name);
            }
            usable
        });
        Ok(custom)
    }

    /// Read the customization file under `root`, if there is one.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = paths::customization_path(root);
        if !path.is_file() {
            return Ok(None);
        }
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let custom = Self::parse(&source).with_context(|| format!("Invalid {}", path.display()))?;
        Ok(Some(custom))
    }

    /// [`Self::load`], with failures logged instead of returned.
    pub fn load_or_default(root: &Path) -> Self {
        match Self::load(root) {
            Ok(Some(custom)) => {
                tracing::debug!(count = custom.commands.len(), "loaded custom commands");
                custom
            }
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("{:#}", e);
                Self::default()
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&CustomCommand> {
        self.commands.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Help lines, one per command.
    pub fn help(&self) -> String {
        let width = self.commands.keys().map(|n| n.len() + 1).max().unwrap_or(0);
        self.commands
            .iter()
            .map(|(name, cmd)| {
                let label = format!("/{name}");
                match &cmd.help {
                    Some(help) => format!("  {label:<width$}  {help}"),
                    None => format!("  {label:<width$}  eval: {}", cmd.eval),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn is_command_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let custom = Customization::parse(
            r#"
[commands.answer]
help = "the answer"
eval = "40 + 2"

[commands.mods]
eval = "modules()"
"#,
        )
        .expect("parse");
        assert_eq!(custom.commands.len(), 2);
        assert_eq!(custom.get("answer").map(|c| c.eval.as_str()), Some("40 + 2"));
        let help = custom.help();
        assert!(help.contains("/answer"));
        assert!(help.contains("the answer"));
        assert!(help.contains("eval: modules()"));
    }

    #[test]
    fn test_builtin_names_are_dropped() {
        let custom = Customization::parse(
            "[commands.reload]\neval = \"1\"\n\n[commands.\"bad name\"]\neval = \"2\"\n",
        )
        .expect("parse");
        assert!(custom.is_empty());
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(Customization::load(dir.path()).expect("load").is_none());
    }

    #[test]
    fn test_load_invalid_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("skiff-repl.toml"), "[commands.x]\nhelp = 1\n").expect("write");
        assert!(Customization::load(dir.path()).is_err());
        assert!(Customization::load_or_default(dir.path()).is_empty());
    }
}
