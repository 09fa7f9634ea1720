//! kscript entry point.

use std::process::ExitCode;

use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kscript::cli::{self, Mode, ScriptArgs};
use kscript::config::{ConfigError, EnvFile};
use kscript::runner;
use kscript::script::{evaluate_line, Environment, Session};

fn main() -> ExitCode {
    // RUST_LOG selects the level; warnings only by default.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let mode = match cli::parse_args() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("kscript: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::FAILURE;
        }
    };

    // Launched lines run on this runtime's blocking pool.
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .thread_name("kscript-worker")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("kscript: cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = runtime.enter();

    let session = Session::new(Environment::new());

    match mode {
        Mode::Help => {
            println!("{}", cli::USAGE);
            ExitCode::SUCCESS
        }
        Mode::Version => {
            println!("kscript {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Mode::Shell => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            match runner::run_shell(&session, &mut stdin.lock(), &mut stdout.lock()) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("kscript: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Mode::Script(args) => run_script_mode(&args, &session),
        Mode::Line(tokens) => {
            let line = cli::join_line_args(&tokens);
            match evaluate_line(&line, &session) {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("kscript: {}", e.trail());
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run_script_mode(args: &ScriptArgs, session: &Session) -> ExitCode {
    // ── Seed the environment ──────────────────────────────────────────────────
    for path in &args.env_files {
        match EnvFile::load_file(path) {
            Ok((file, errors)) => {
                report(&path.display().to_string(), &errors);
                file.apply(session.environment());
            }
            Err(e) => {
                eprintln!("kscript: environment file {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }
    if !args.line_env.is_empty() {
        let (file, errors) = EnvFile::from_pairs(&args.line_env);
        report("-LineEnv", &errors);
        file.apply(session.environment());
    }

    // ── Run ───────────────────────────────────────────────────────────────────
    match runner::run_script_file(&args.file, session) {
        Ok(outcome) if outcome.failed_at.is_some() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kscript: {}: {e}", args.file.display());
            ExitCode::FAILURE
        }
    }
}

fn report(source: &str, errors: &[ConfigError]) {
    for e in errors {
        warn!(source, "{e}");
    }
}
