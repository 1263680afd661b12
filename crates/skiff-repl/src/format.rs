//! Output formatting for the shell.
//!
//! Results are echoed the way an interactive shell shows them: top-level
//! strings bare, nested strings quoted, records with sorted keys. Colors are
//! applied only when the config asks for them, stdout is a terminal, and
//! neither `NO_COLOR` nor `TERM=dumb` says otherwise.

use std::fmt;
use std::io::IsTerminal;

use owo_colors::OwoColorize;

use skiff_kernel::intercept::{InternalFault, Notice};
use skiff_kernel::reload::{ReloadError, ReloadReport};
use skiff_kernel::{EvalMode, ReplConfig, Value};

/// Whether output is colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub colors: bool,
}

impl Style {
    pub fn plain() -> Self {
        Self { colors: false }
    }

    /// Style for the real stdout.
    pub fn detect(config: &ReplConfig) -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some();
        let term = std::env::var("TERM").ok();
        Self {
            colors: colors_allowed(config.colors, no_color, term.as_deref())
                && std::io::stdout().is_terminal(),
        }
    }
}

/// Config switch and environment combined.
pub fn colors_allowed(configured: bool, no_color: bool, term: Option<&str>) -> bool {
    configured && !no_color && term != Some("dumb")
}

/// Render a result value.
pub fn value(value: &Value, style: Style) -> String {
    if !style.colors {
        return value.to_string();
    }
    let mut out = String::new();
    paint(value, false, &mut out);
    out
}

fn paint(value: &Value, nested: bool, out: &mut String) {
    match value {
        Value::Null => out.push_str(&"null".bold().to_string()),
        Value::Bool(b) => out.push_str(&b.yellow().to_string()),
        Value::Int(i) => out.push_str(&i.yellow().to_string()),
        Value::Float(x) => out.push_str(&x.yellow().to_string()),
        Value::String(s) if nested => out.push_str(&format!("{s:?}").green().to_string()),
        Value::String(s) => out.push_str(s),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                paint(item, true, out);
            }
            out.push(']');
        }
        Value::Record(fields) if fields.is_empty() => out.push_str("{}"),
        Value::Record(fields) => {
            out.push_str("{ ");
            for (i, (k, v)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(k);
                out.push_str(": ");
                paint(v, true, out);
            }
            out.push_str(" }");
        }
        Value::Deferred(d) => out.push_str(&d.cyan().to_string()),
    }
}

pub fn error(error: impl fmt::Display, style: Style) -> String {
    let label = if style.colors {
        "Error:".red().bold().to_string()
    } else {
        "Error:".to_string()
    };
    format!("{label} {error}")
}

pub fn fault(fault: &InternalFault, style: Style) -> String {
    let text = fault.to_string();
    if style.colors {
        text.red().to_string()
    } else {
        text
    }
}

/// Notice text as printed under the prompt. A rejection is followed by the
/// error line, so it names only the event.
pub fn notice(notice: &Notice, style: Style) -> String {
    let text = match notice {
        Notice::Rejected(_) => "Deferred value rejected".to_string(),
        other => other.to_string(),
    };
    if style.colors {
        text.dimmed().to_string()
    } else {
        text
    }
}

pub fn mode(mode: EvalMode) -> &'static str {
    match mode {
        EvalMode::Intercept => "Deferred auto-await enabled",
        EvalMode::PassThrough => "Deferred auto-await disabled",
    }
}

/// A reload that ends the shell.
pub fn reload_failure(error: &ReloadError, style: Style) -> String {
    self::error(error, style)
}

pub fn reload_report(report: &ReloadReport) -> String {
    format!(
        "Reloaded (generation {}, {} module(s) dropped, {:.1?})",
        report.generation,
        report.pruned.len(),
        report.elapsed
    )
}

/// The prompt: the configured text verbatim, else the project name and a
/// chevron, with the icon in front.
pub fn prompt(config: &ReplConfig, project_name: &str, style: Style) -> String {
    if !style.colors || config.prompt.is_some() {
        return config.prompt_text(project_name);
    }
    let base = format!("{} {} ", project_name.magenta(), ">".bright_black());
    match config.icon() {
        Some(icon) => format!("{} {}", icon.emoji(), base),
        None => base,
    }
}
