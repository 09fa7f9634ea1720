//! Script-file runner and interactive shell.
//!
//! Both drive [`evaluate_line`] one line at a time against a single
//! [`Session`].  A script stops at its first failing line; the shell reports
//! the failure and keeps reading.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::script::env::{DEFAULT_SHELL_INPUT_HEAD, PRINT_RESULT, SHELL_INPUT_HEAD};
use crate::script::interp::evaluate_line;
use crate::script::session::Session;

/// A script line that hands control to the interactive shell.
pub const SHELL_MODE_LINE: &str = "ShellMode";

// ── Script mode ───────────────────────────────────────────────────────────────

/// How a script run ended.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Lines handed to the interpreter (including the failing one).
    pub executed: usize,
    /// 1-based number of the line that failed, if any.
    pub failed_at: Option<usize>,
}

/// `true` for lines the script runner never evaluates.
pub fn is_skipped_line(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with('#') || t.starts_with("//")
}

/// Run a script file, using stdin and stdout for any `ShellMode` line.
pub fn run_script_file(path: &Path, session: &Session) -> io::Result<ScriptOutcome> {
    let source = std::fs::read_to_string(path)?;
    info!(path = %path.display(), "running script");
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_script(&source, session, &mut stdin.lock(), &mut stdout.lock())
}

/// Run every line of `source` in order.
///
/// `input` is only read when a `ShellMode` line starts the shell.
pub fn run_script<R: BufRead, W: Write>(
    source: &str,
    session: &Session,
    input: &mut R,
    out: &mut W,
) -> io::Result<ScriptOutcome> {
    let mut outcome = ScriptOutcome::default();

    for (i, line) in source.lines().enumerate() {
        if session.is_terminated() {
            debug!(line = i + 1, "session terminated; stopping script");
            break;
        }
        if is_skipped_line(line) {
            continue;
        }
        if line.trim() == SHELL_MODE_LINE {
            run_shell(session, input, out)?;
            continue;
        }

        outcome.executed += 1;
        match evaluate_line(line, session) {
            Ok(value) => session.set_last_result(value),
            Err(e) => {
                writeln!(out, "error: {}", e.trail())?;
                writeln!(out, "Interpreter Error: Failed executing line {}: {line}", i + 1)?;
                outcome.failed_at = Some(i + 1);
                break;
            }
        }
    }

    Ok(outcome)
}

// ── Shell mode ────────────────────────────────────────────────────────────────

/// Read-evaluate-print until end of input or session termination.
pub fn run_shell<R: BufRead, W: Write>(
    session: &Session,
    input: &mut R,
    out: &mut W,
) -> io::Result<()> {
    let mut buf = String::new();

    while !session.is_terminated() {
        write!(out, "{}", prompt(session))?;
        out.flush()?;

        buf.clear();
        if input.read_line(&mut buf)? == 0 {
            break;
        }
        let line = buf.trim_end_matches(['\n', '\r']);

        match evaluate_line(line, session) {
            Ok(value) => {
                if session.environment().is_enabled(PRINT_RESULT) {
                    writeln!(out, "{value}")?;
                }
                session.set_last_result(value);
            }
            Err(e) => writeln!(out, "error: {}", e.trail())?,
        }
    }

    debug!("shell finished");
    Ok(())
}

// ── Prompt ────────────────────────────────────────────────────────────────────

/// The shell prompt for the current process state.
pub fn prompt(session: &Session) -> String {
    let format = session.environment().get_or(SHELL_INPUT_HEAD, DEFAULT_SHELL_INPUT_HEAD);
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let home = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf());
    render_prompt(&format, &user, &cwd, home.as_deref())
}

/// Substitute the prompt placeholders in `format`.
///
/// `{CurrentDirectoryWithSimplifyIfHome}` becomes `~` when `cwd` is `home`.
pub fn render_prompt(format: &str, user: &str, cwd: &Path, home: Option<&Path>) -> String {
    let cwd_text = cwd.display().to_string();
    let simplified = if home == Some(cwd) { "~".to_owned() } else { cwd_text.clone() };
    format
        .replace("{Username}", user)
        .replace("{CurrentDirectoryWithSimplifyIfHome}", &simplified)
        .replace("{CurrentDirectory}", &cwd_text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
