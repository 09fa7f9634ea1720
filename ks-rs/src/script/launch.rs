//! Concurrent Launch.
//!
//! [`spawn_line`] evaluates one line on a blocking worker of the tokio
//! runtime against a clone of the caller's [`Session`] handle and returns a
//! [`TaskHandle`] immediately.  There is no join, cancel, or result
//! retrieval: scripts coordinate through session variables.  A failure is
//! logged and stays on the worker.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{ScriptError, ScriptResult};
use super::interp::evaluate_line;
use super::session::Session;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

// ── TaskHandle ────────────────────────────────────────────────────────────────

/// Opaque handle to a launched evaluation.
#[derive(Clone)]
pub struct TaskHandle {
    id: u64,
    join: Arc<JoinHandle<()>>,
}

impl TaskHandle {
    /// Process-unique id of the launch.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `true` once the launched line has finished (successfully or not).
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task#{}", self.id)
    }
}

// ── Runtime ───────────────────────────────────────────────────────────────────

/// The ambient runtime if there is one, else a process-wide fallback.
fn runtime_handle() -> ScriptResult<Handle> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }
    static FALLBACK: OnceLock<Result<Runtime, String>> = OnceLock::new();
    let runtime = FALLBACK.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .thread_name("kscript-launch")
            .build()
            .map_err(|e| e.to_string())
    });
    match runtime {
        Ok(rt) => Ok(rt.handle().clone()),
        Err(e) => Err(ScriptError::Invocation(format!("cannot start launch runtime: {e}"))),
    }
}

// ── Launch ────────────────────────────────────────────────────────────────────

/// Start evaluating `line` against `session` without waiting for it.
pub fn spawn_line(line: String, session: &Session) -> ScriptResult<TaskHandle> {
    let handle = runtime_handle()?;
    let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
    let session = session.clone();
    debug!(task = id, line = %line, "launch");
    let join = handle.spawn_blocking(move || {
        if let Err(e) = evaluate_line(&line, &session) {
            warn!(task = id, error = %e.trail(), "launched line failed");
        }
    });
    Ok(TaskHandle { id, join: Arc::new(join) })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
