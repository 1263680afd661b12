//! Integration tests for the skiff shell.
//!
//! Each test builds a project in a temp directory and drives the shell one
//! line at a time through `Repl::process_line`.

use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;
use tempfile::TempDir;

use skiff_kernel::{
    ExitHook, FailureReport, Key, KeyBus, Notice, ReloadFailurePolicy, ReloadState, ReplConfig,
};
use skiff_repl::{ExitRequested, Repl};

const MANIFEST: &str = "[project]\nname = \"demo\"\nversion = \"0.3.0\"\n";

fn project() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("skiff.toml"), MANIFEST).expect("write manifest");
    dir
}

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).expect("write file");
}

fn repl_with(dir: &Path, config: ReplConfig) -> Repl {
    Repl::with_config(dir, config).expect("Failed to create REPL")
}

fn repl(dir: &Path) -> Repl {
    repl_with(dir, ReplConfig::plain())
}

/// Run one line, turning errors into `ERROR: ...` text.
fn line(repl: &mut Repl, input: &str) -> Option<String> {
    match repl.process_line(input) {
        Ok(output) => output,
        Err(e) => Some(format!("ERROR: {}", e)),
    }
}

fn out(repl: &mut Repl, input: &str) -> String {
    line(repl, input).unwrap_or_else(|| panic!("no output for {input:?}"))
}

fn exit_status(repl: &mut Repl, input: &str) -> Option<u8> {
    repl.process_line(input)
        .err()
        .and_then(|e| e.downcast_ref::<ExitRequested>().map(|exit| exit.status))
}

// ============================================================================
// Expressions
// ============================================================================

#[rstest]
#[case::arithmetic("1 + 2 * 3", "7")]
#[case::string("'hello'", "hello")]
#[case::list("[1, 'a']", r#"[1, "a"]"#)]
#[case::project_name("project.name", "demo")]
#[case::project_version("project.version", "0.3.0")]
#[case::framework_name("framework.name", "skiff")]
#[case::json("json([1, true])", "[1,true]")]
fn evaluates_expressions(#[case] input: &str, #[case] expected: &str) {
    let dir = project();
    let mut repl = repl(dir.path());
    assert_eq!(out(&mut repl, input), expected);
}

#[test]
fn bindings_persist_between_lines() {
    let dir = project();
    let mut repl = repl(dir.path());
    assert_eq!(line(&mut repl, "let x = 20"), None);
    assert_eq!(out(&mut repl, "x + 22"), "42");
}

#[test]
fn null_is_hidden_unless_configured() {
    let dir = project();
    let mut hiding = repl(dir.path());
    assert_eq!(line(&mut hiding, "null"), None);

    let config = ReplConfig {
        ignore_undefined: false,
        ..ReplConfig::plain()
    };
    let mut showing = repl_with(dir.path(), config);
    assert_eq!(out(&mut showing, "null"), "null");
}

#[test]
fn evaluation_errors_are_inline() {
    let dir = project();
    let mut repl = repl(dir.path());
    assert_eq!(out(&mut repl, "fail('boom')"), "Error: boom");
    assert_eq!(out(&mut repl, "1 / 0"), "Error: division by zero");
    assert!(out(&mut repl, "nope").starts_with("Error: undefined"));
    assert!(out(&mut repl, "1 +").starts_with("Error: syntax error"));
    let chain = format!("1{}", " + 1".repeat(10_000));
    assert!(out(&mut repl, &chain).starts_with("Error: syntax error"));
    // The session survives.
    assert_eq!(out(&mut repl, "1"), "1");
}

#[test]
fn empty_lines_print_nothing() {
    let dir = project();
    let mut repl = repl(dir.path());
    assert_eq!(line(&mut repl, ""), None);
    assert_eq!(line(&mut repl, "   "), None);
}

// ============================================================================
// Deferred values
// ============================================================================

#[test]
fn deferred_values_are_awaited() {
    let dir = project();
    let mut repl = repl(dir.path());
    assert_eq!(out(&mut repl, "after(10, 42)"), "42");
    assert_eq!(out(&mut repl, "resolve('done')"), "done");
    assert_eq!(line(&mut repl, "sleep(5)"), None);
}

#[test]
fn rejections_are_evaluation_errors() {
    let dir = project();
    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = notices.clone();
    let mut repl = repl(dir.path()).with_notices(move |n: Notice| {
        sink.lock().expect("lock").push(n);
    });

    assert_eq!(out(&mut repl, "reject(5, 'nope')"), "Error: nope");
    let notices = notices.lock().expect("lock");
    assert!(matches!(notices.as_slice(), [Notice::Rejected(_)]), "{notices:?}");
}

#[test]
fn promise_toggles_pass_through() {
    let dir = project();
    let mut repl = repl(dir.path());

    assert_eq!(out(&mut repl, "/promise"), "Deferred auto-await disabled");
    assert_eq!(out(&mut repl, "after(10, 1)"), "Deferred { <pending> }");
    assert_eq!(out(&mut repl, "resolve(2)"), "Deferred { 2 }");

    assert_eq!(out(&mut repl, "/promise"), "Deferred auto-await enabled");
    assert_eq!(out(&mut repl, "after(10, 1)"), "1");
}

#[test]
fn escape_abandons_the_wait() {
    let dir = project();
    let bus = KeyBus::new();
    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = notices.clone();
    let mut repl = repl(dir.path())
        .with_keys(bus.clone())
        .with_notices(move |n: Notice| sink.lock().expect("lock").push(n));

    let presser = std::thread::spawn(move || {
        // Keep pressing until the wait has subscribed and taken a key.
        while bus.press(Key::Escape) == 0 {
            std::thread::sleep(Duration::from_millis(2));
        }
    });

    assert_eq!(out(&mut repl, "pending()"), "Deferred { <pending> }");
    presser.join().expect("presser");
    assert_eq!(notices.lock().expect("lock").as_slice(), &[Notice::Interrupted]);

    // The shell moves on to the next line.
    assert_eq!(out(&mut repl, "1 + 1"), "2");
}

#[test]
fn other_keys_do_not_cancel() {
    let dir = project();
    let bus = KeyBus::new();
    let mut repl = repl(dir.path()).with_keys(bus.clone());

    let presser = std::thread::spawn(move || {
        for _ in 0..200 {
            if bus.press(Key::Char('q')) > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    });

    assert_eq!(out(&mut repl, "after(50, 'finished')"), "finished");
    presser.join().expect("presser");
}

#[test]
fn slow_values_print_the_hint_once() {
    let dir = project();
    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = notices.clone();
    let config = ReplConfig::plain().with_hint_delay_ms(5);
    let mut repl = repl_with(dir.path(), config).with_notices(move |n: Notice| {
        sink.lock().expect("lock").push(n);
    });

    assert_eq!(out(&mut repl, "after(60, 'late')"), "late");
    assert_eq!(
        notices.lock().expect("lock").as_slice(),
        &[Notice::Hint { key: Key::Escape }]
    );
}

// ============================================================================
// Commands
// ============================================================================

#[rstest]
#[case("/quit")]
#[case("/q")]
#[case("/exit")]
fn quit_requests_exit(#[case] cmd: &str) {
    let dir = project();
    let mut repl = repl(dir.path());
    assert_eq!(exit_status(&mut repl, cmd), Some(0));
}

#[test]
fn help_lists_the_commands() {
    let dir = project();
    let mut repl = repl(dir.path());
    let help = out(&mut repl, "/help");
    for cmd in ["/cls", "/reload", "/promise", "/quit"] {
        assert!(help.contains(cmd), "missing {cmd}");
    }
    assert!(!help.contains("Project commands"));
}

#[test]
fn cls_always_succeeds() {
    let dir = project();
    let mut repl = repl(dir.path());
    assert_eq!(line(&mut repl, "/cls"), None);
}

#[test]
fn unknown_commands_are_reported() {
    let dir = project();
    let mut repl = repl(dir.path());
    assert!(out(&mut repl, "/nope").starts_with("Unknown command: /nope"));
}

#[test]
fn prompt_uses_the_project_name() {
    let dir = project();
    let repl = repl(dir.path());
    assert_eq!(repl.prompt(), "demo > ");

    let config = ReplConfig {
        prompt: Some("> ".into()),
        icon: Some("sailboat".into()),
        ..ReplConfig::plain()
    };
    let repl = repl_with(dir.path(), config);
    assert_eq!(repl.prompt(), "⛵ > ");
}

// ============================================================================
// Project commands
// ============================================================================

#[test]
fn customization_file_registers_commands() {
    let dir = project();
    write(
        dir.path(),
        "skiff-repl.toml",
        "[commands.answer]\nhelp = \"the answer\"\neval = \"40 + 2\"\n",
    );
    let mut repl = repl(dir.path());

    assert_eq!(out(&mut repl, "/answer"), "42");
    assert!(out(&mut repl, "/answer now").starts_with("Usage: /answer"));
    let help = out(&mut repl, "/help");
    assert!(help.contains("Project commands"));
    assert!(help.contains("the answer"));
}

#[test]
fn broken_customization_is_ignored() {
    let dir = project();
    write(dir.path(), "skiff-repl.toml", "[commands.answer\n");
    let mut repl = repl(dir.path());
    assert!(repl.customization().is_empty());
    assert_eq!(out(&mut repl, "1"), "1");
}

// ============================================================================
// Reload
// ============================================================================

#[test]
fn reload_picks_up_changed_modules() {
    let dir = project();
    write(dir.path(), "util.sk", "let answer = 1\n");
    let mut repl = repl(dir.path());

    assert_eq!(out(&mut repl, "require('util').answer"), "1");
    write(dir.path(), "util.sk", "let answer = 2\n");
    assert_eq!(out(&mut repl, "require('util').answer"), "1");

    let root = dir.path().display().to_string();
    assert!(out(&mut repl, "modules()").contains(&root));

    let report = out(&mut repl, "/reload");
    assert!(report.starts_with("Reloaded (generation"), "{report}");
    assert_eq!(repl.session().reload_state(), ReloadState::Reloaded);
    assert!(!out(&mut repl, "modules()").contains(&root));

    assert_eq!(out(&mut repl, "require('util').answer"), "2");
}

#[test]
fn reload_replaces_the_framework() {
    let dir = project();
    let mut repl = repl(dir.path());
    let before: i64 = out(&mut repl, "framework.generation").parse().expect("int");
    out(&mut repl, "/reload");
    let after: i64 = out(&mut repl, "framework.generation").parse().expect("int");
    assert!(after > before);
}

#[test]
fn reload_sees_manifest_changes() {
    let dir = project();
    let mut repl = repl(dir.path());
    assert_eq!(out(&mut repl, "project.name"), "demo");

    std::fs::write(dir.path().join("skiff.toml"), "[project]\nname = \"renamed\"\n").expect("write");
    assert_eq!(out(&mut repl, "project.name"), "demo");

    out(&mut repl, "/reload");
    assert_eq!(out(&mut repl, "project.name"), "renamed");
    assert_eq!(repl.prompt(), "renamed > ");
}

#[test]
fn reload_runs_the_hook() {
    let dir = project();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let config = ReplConfig::plain().with_on_reload(move |_session| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let mut repl = repl_with(dir.path(), config);

    out(&mut repl, "/reload");
    out(&mut repl, "/reload");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn failed_reload_exits() {
    let dir = project();
    let code = Arc::new(AtomicI32::new(-1));
    let seen = code.clone();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    let mut repl = repl(dir.path())
        .with_exit_hook(ExitHook::new(move |c| {
            seen.store(c, Ordering::SeqCst);
        }))
        .with_failure_report(FailureReport::new(move |e| {
            sink.lock().unwrap().push(e.to_string());
        }));

    std::fs::remove_file(dir.path().join("skiff.toml")).expect("remove manifest");
    assert_eq!(exit_status(&mut repl, "/reload"), Some(1));
    assert_eq!(code.load(Ordering::SeqCst), 1);
    assert_eq!(repl.session().reload_state(), ReloadState::Fatal);
    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1, "{reports:?}");
    assert!(reports[0].contains("skiff.toml"), "{}", reports[0]);
}

#[test]
fn failed_reload_can_roll_back() {
    let dir = project();
    let exited = Arc::new(AtomicUsize::new(0));
    let seen = exited.clone();
    let config = ReplConfig::plain().with_reload_failure(ReloadFailurePolicy::Rollback);
    let mut repl = repl_with(dir.path(), config).with_exit_hook(ExitHook::new(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    assert_eq!(out(&mut repl, "project.name"), "demo");
    std::fs::write(dir.path().join("skiff.toml"), "[project\n").expect("corrupt manifest");

    let reply = out(&mut repl, "/reload");
    assert!(reply.starts_with("Reload failed, previous session restored"), "{reply}");
    assert_eq!(exited.load(Ordering::SeqCst), 0);
    assert_eq!(repl.session().reload_state(), ReloadState::Loaded);
    assert_eq!(out(&mut repl, "project.name"), "demo");
}

// ============================================================================
// Startup
// ============================================================================

#[test]
fn missing_manifest_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Repl::with_config(dir.path(), ReplConfig::plain())
        .err()
        .expect("should fail");
    assert!(format!("{err:#}").contains("skiff.toml"));
    assert!(Repl::open(dir.path()).is_err());
}

#[test]
fn open_reads_the_repl_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(
        dir.path(),
        "skiff.toml",
        "[project]\nname = \"demo\"\n\n[repl]\nterminal = false\nprompt = \"demo$ \"\nignore_undefined = false\n",
    );
    let mut repl = Repl::open(dir.path()).expect("open");
    assert!(!repl.config().terminal);
    assert_eq!(repl.prompt(), "demo$ ");
    assert_eq!(out(&mut repl, "null"), "null");
}
