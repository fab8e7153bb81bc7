//! Per-connection heartbeat probing
//!
//! Each session gets one prober task that periodically sends PING and
//! expects a PONG within the configured timeout. The probe runs beside the
//! session's read loop, never inside it: a single timer tick checks a
//! monotonic deadline and a pending-pong flag, so no CPU is spent spinning.
//! A missed deadline wakes the session through a shared `Notify`, which
//! funnels the connection into the same cleanup path as an explicit QUIT.

use crate::registry::OutboundSender;
use log::{debug, warn};
use shared::{Message, Verb, PONG_TIMEOUT_SECS, PROBE_INTERVAL_SECS};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Probe cadence for one connection
#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    /// How often a PING is sent while the connection is idle
    pub interval: Duration,
    /// How long an unanswered PING may stay outstanding
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(PROBE_INTERVAL_SECS),
            timeout: Duration::from_secs(PONG_TIMEOUT_SECS),
        }
    }
}

/// Liveness state machine: Idle -> AwaitingPong -> (Idle | TimedOut)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    Idle,
    AwaitingPong,
    TimedOut,
}

#[derive(Debug)]
struct ProbeState {
    phase: ProbePhase,
    deadline: Instant,
}

/// Handle to one connection's prober task
pub struct LivenessProbe {
    state: Arc<Mutex<ProbeState>>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// What the prober decided to do on one tick
enum Tick {
    SendPing,
    Wait,
    TimedOut,
}

/// Spawns the prober task for one connection.
///
/// `label` identifies the connection in log lines (peer address).
pub fn spawn(sender: OutboundSender, label: String, config: ProbeConfig) -> LivenessProbe {
    let state = Arc::new(Mutex::new(ProbeState {
        phase: ProbePhase::Idle,
        deadline: Instant::now() + config.timeout,
    }));
    let shutdown = Arc::new(Notify::new());

    let task_state = Arc::clone(&state);
    let task_shutdown = Arc::clone(&shutdown);
    let handle = tokio::spawn(async move {
        let mut ticker = interval(config.interval);
        // The first tick fires immediately; skip it so the client gets a
        // grace period after connecting.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let action = {
                let mut st = task_state.lock().unwrap_or_else(|e| e.into_inner());
                match st.phase {
                    ProbePhase::Idle => {
                        st.phase = ProbePhase::AwaitingPong;
                        st.deadline = Instant::now() + config.timeout;
                        Tick::SendPing
                    }
                    ProbePhase::AwaitingPong if Instant::now() >= st.deadline => {
                        st.phase = ProbePhase::TimedOut;
                        Tick::TimedOut
                    }
                    ProbePhase::AwaitingPong => Tick::Wait,
                    ProbePhase::TimedOut => return,
                }
            };

            match action {
                Tick::SendPing => {
                    debug!("Probing {}", label);
                    if sender.send(Message::bare(Verb::Ping).encode()).is_err() {
                        // Writer gone, the session is already shutting down
                        return;
                    }
                }
                Tick::Wait => {}
                Tick::TimedOut => {
                    warn!("Connection {} missed its pong deadline", label);
                    task_shutdown.notify_one();
                    return;
                }
            }
        }
    });

    LivenessProbe {
        state,
        shutdown,
        handle,
    }
}

impl LivenessProbe {
    /// Records a PONG: an outstanding probe resets to Idle.
    pub fn pong(&self) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if st.phase == ProbePhase::AwaitingPong {
            st.phase = ProbePhase::Idle;
        }
    }

    pub fn phase(&self) -> ProbePhase {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).phase
    }

    /// The notification the session selects on to learn about a timeout
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Stops the prober task; called when the session closes for any reason
    pub fn abort(&self) {
        self.handle.abort();
    }
}
