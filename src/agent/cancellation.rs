//! Graceful-then-force agent cancellation, grounded in
//! `original_source/services/agent_cancellation_service.py`'s
//! `AgentCancellationService`: phase 1 cooperatively cancels the running
//! chat-loop task and waits up to `GRACEFUL_TIMEOUT`; phase 2 escalates to a
//! subprocess kill (SIGTERM then SIGKILL, mirroring
//! `ferrex-server/src/stream/transcoding/worker.rs`'s `kill_process`) if the
//! loop spawned one and didn't stop in time; phase 3 reports failure.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);
const FORCE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationPhase {
    Initiated,
    Graceful,
    Forcing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct CancellationEvent {
    pub session_id: String,
    pub event_type: &'static str,
    pub message: String,
    pub phase: CancellationPhase,
}

pub type NotifyFn = Box<dyn Fn(CancellationEvent) + Send + Sync>;

#[derive(Default)]
pub struct CancellationRegistry {
    active: Mutex<HashMap<String, CancellationPhase>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelling(&self, session_id: &str) -> bool {
        self.active.lock().unwrap().contains_key(session_id)
    }

    /// Cancels `task`, escalating to `subprocess_pid` if phase 1 times out.
    /// Returns `false` (without doing any work) if a cancellation for this
    /// session is already in progress.
    pub async fn cancel(
        &self,
        session_id: &str,
        task: JoinHandle<()>,
        subprocess_pid: Option<u32>,
        notify: Option<&NotifyFn>,
    ) -> bool {
        {
            let mut active = self.active.lock().unwrap();
            if active.contains_key(session_id) {
                return false;
            }
            active.insert(session_id.to_string(), CancellationPhase::Initiated);
        }

        let result = self.run_cancellation(session_id, task, subprocess_pid, notify).await;
        self.active.lock().unwrap().remove(session_id);
        result
    }

    async fn run_cancellation(
        &self,
        session_id: &str,
        task: JoinHandle<()>,
        subprocess_pid: Option<u32>,
        notify: Option<&NotifyFn>,
    ) -> bool {
        self.set_phase(session_id, CancellationPhase::Graceful);
        emit(notify, session_id, "cancelling", "Stopping agent gracefully...", CancellationPhase::Graceful);

        task.abort();
        if tokio::time::timeout(GRACEFUL_TIMEOUT, task).await.is_ok() {
            self.set_phase(session_id, CancellationPhase::Completed);
            emit(notify, session_id, "cancelled", "Agent stopped", CancellationPhase::Completed);
            return true;
        }

        let Some(pid) = subprocess_pid else {
            self.set_phase(session_id, CancellationPhase::Failed);
            emit(notify, session_id, "error", "Failed to stop agent", CancellationPhase::Failed);
            return false;
        };

        self.set_phase(session_id, CancellationPhase::Forcing);
        emit(notify, session_id, "cancelling", "Agent didn't respond, forcing stop...", CancellationPhase::Forcing);

        if force_kill(pid).await {
            self.set_phase(session_id, CancellationPhase::Completed);
            emit(notify, session_id, "cancelled", "Agent force stopped", CancellationPhase::Completed);
            true
        } else {
            self.set_phase(session_id, CancellationPhase::Failed);
            emit(notify, session_id, "error", "Failed to stop agent", CancellationPhase::Failed);
            false
        }
    }

    fn set_phase(&self, session_id: &str, phase: CancellationPhase) {
        self.active.lock().unwrap().insert(session_id.to_string(), phase);
    }
}

fn emit(notify: Option<&NotifyFn>, session_id: &str, event_type: &'static str, message: &str, phase: CancellationPhase) {
    if let Some(notify) = notify {
        notify(CancellationEvent {
            session_id: session_id.to_string(),
            event_type,
            message: message.to_string(),
            phase,
        });
    }
}

/// SIGTERM, wait up to `FORCE_TIMEOUT`, then SIGKILL. On non-Unix targets
/// this is a no-op that reports failure, since this crate only spawns
/// subprocesses (via tool execution) on Unix-style shells.
async fn force_kill(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let target = Pid::from_raw(pid as i32);
        if kill(target, Signal::SIGTERM).is_err() {
            return false;
        }
        tokio::time::sleep(FORCE_TIMEOUT).await;
        if process_alive(pid) {
            let _ = kill(target, Signal::SIGKILL);
        }
        true
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_quickly_completing_task_cancels_gracefully() {
        let registry = CancellationRegistry::new();
        let task = tokio::spawn(async {});
        tokio::time::sleep(Duration::from_millis(10)).await;
        let ok = registry.cancel("s1", task, None, None).await;
        assert!(ok);
        assert!(!registry.is_cancelling("s1"));
    }

    #[tokio::test]
    async fn duplicate_cancellations_for_the_same_session_are_rejected() {
        let registry = CancellationRegistry::new();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        let registry = std::sync::Arc::new(registry);
        let r2 = registry.clone();
        let first = tokio::spawn(async move { r2.cancel("s1", task, None, None).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let dummy = tokio::spawn(async {});
        let second = registry.cancel("s1", dummy, None, None).await;
        assert!(!second);
        first.abort();
    }
}
