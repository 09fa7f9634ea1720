//! Command-line argument parsing.
//!
//! Usage:
//!   kscript
//!   kscript -ScriptMode <file> [-Env <file>…]
//!   kscript -ScriptMode <file> [-LineEnv <key=value>…]
//!   kscript <command> [<arg>…]

use std::path::PathBuf;

/// One-line usage summary printed on parse errors and `--help`.
pub const USAGE: &str = "\
Usage: kscript
       kscript -ScriptMode <file> [-Env <file>...]
       kscript -ScriptMode <file> [-LineEnv <key=value>...]
       kscript <command> [<arg>...]";

// ── Public types ──────────────────────────────────────────────────────────────

/// What the binary was asked to do.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// No arguments: interactive shell.
    #[default]
    Shell,
    /// `-ScriptMode <file>`: run a script file.
    Script(ScriptArgs),
    /// Anything else: evaluate the arguments as one line.
    Line(Vec<String>),
    /// `-h` / `--help`.
    Help,
    /// `-V` / `--version`.
    Version,
}

/// Arguments of [`Mode::Script`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScriptArgs {
    /// The script to run.
    pub file: PathBuf,
    /// Environment files loaded before the script (`-Env`).
    pub env_files: Vec<PathBuf>,
    /// Inline `key=value` entries applied before the script (`-LineEnv`).
    pub line_env: Vec<String>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return a [`Mode`] or an error message.
pub fn parse_args() -> Result<Mode, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<Mode, String> {
    let Some(first) = argv.first() else {
        return Ok(Mode::Shell);
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Mode::Help),
        "-V" | "--version" => Ok(Mode::Version),
        "-ScriptMode" => parse_script_mode(&argv[1..]).map(Mode::Script),
        _ => Ok(Mode::Line(argv.to_vec())),
    }
}

/// Parse what follows `-ScriptMode`.
fn parse_script_mode(argv: &[String]) -> Result<ScriptArgs, String> {
    let Some(file) = argv.first() else {
        return Err("-ScriptMode requires a script file".to_owned());
    };
    let mut args = ScriptArgs { file: PathBuf::from(file), ..ScriptArgs::default() };

    let rest = &argv[1..];
    let Some(switch) = rest.first() else {
        return Ok(args);
    };
    match switch.as_str() {
        "-Env" => args.env_files = rest[1..].iter().map(PathBuf::from).collect(),
        "-LineEnv" => args.line_env = rest[1..].to_vec(),
        other => return Err(format!("unknown option after script file: {other}")),
    }
    Ok(args)
}

// ── Line assembly ─────────────────────────────────────────────────────────────

/// Rebuild one line of source from shell arguments.
///
/// Each argument stays one token: an argument containing whitespace is
/// quoted unless it is already a brace group.
pub fn join_line_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            let braced = arg.starts_with('{') && arg.ends_with('}');
            if arg.is_empty() || (!braced && arg.contains(char::is_whitespace)) {
                let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\"")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
