use std::{
    future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info};

pub const TAPS_REQUIRED: u32 = 5;
pub const TAP_RESET: Duration = Duration::from_millis(1_000);
pub const WAIT_DURATION: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureConfig {
    pub taps_required: u32,
    /// Maximum gap between consecutive taps before the count resets.
    pub tap_reset: Duration,
    /// Delay between the final tap and the unlock signal.
    pub wait_duration: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            taps_required: TAPS_REQUIRED,
            tap_reset: TAP_RESET,
            wait_duration: WAIT_DURATION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Accumulating { count: u32, reset_at: Instant },
    Cooldown { unlock_at: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// The tap landed during cooldown and changed nothing.
    Ignored,
    Counted { count: u32 },
    /// The final tap was counted; the unlock fires at `unlock_at`.
    Armed { unlock_at: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    GapReset,
    Unlock,
}

/// Timer-free tap state machine. Callers supply the clock, which keeps the
/// debounce and cooldown rules testable without a runtime.
#[derive(Debug, Clone)]
pub struct TapSequence {
    config: GestureConfig,
    phase: GesturePhase,
}

impl TapSequence {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config: GestureConfig {
                taps_required: config.taps_required.max(1),
                ..config
            },
            phase: GesturePhase::Idle,
        }
    }

    pub fn config(&self) -> GestureConfig {
        self.config
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn count(&self) -> u32 {
        match self.phase {
            GesturePhase::Idle => 0,
            GesturePhase::Accumulating { count, .. } => count,
            GesturePhase::Cooldown { .. } => self.config.taps_required,
        }
    }

    pub fn is_cooling_down(&self) -> bool {
        matches!(self.phase, GesturePhase::Cooldown { .. })
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            GesturePhase::Idle => None,
            GesturePhase::Accumulating { reset_at, .. } => Some(reset_at),
            GesturePhase::Cooldown { unlock_at } => Some(unlock_at),
        }
    }

    pub fn tap(&mut self, now: Instant) -> TapOutcome {
        let previous = match self.phase {
            GesturePhase::Cooldown { .. } => return TapOutcome::Ignored,
            GesturePhase::Idle => 0,
            // A gap of exactly `tap_reset` counts as too slow.
            GesturePhase::Accumulating { count, reset_at } if now < reset_at => count,
            GesturePhase::Accumulating { .. } => 0,
        };

        let count = previous + 1;
        if count >= self.config.taps_required {
            let unlock_at = now + self.config.wait_duration;
            self.phase = GesturePhase::Cooldown { unlock_at };
            TapOutcome::Armed { unlock_at }
        } else {
            self.phase = GesturePhase::Accumulating {
                count,
                reset_at: now + self.config.tap_reset,
            };
            TapOutcome::Counted { count }
        }
    }

    /// Applies whichever deadline has passed at `now`.
    pub fn expire(&mut self, now: Instant) -> Option<Expiry> {
        match self.phase {
            GesturePhase::Accumulating { reset_at, .. } if now >= reset_at => {
                self.phase = GesturePhase::Idle;
                Some(Expiry::GapReset)
            }
            GesturePhase::Cooldown { unlock_at } if now >= unlock_at => {
                self.phase = GesturePhase::Idle;
                Some(Expiry::Unlock)
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.phase = GesturePhase::Idle;
    }
}

#[derive(Debug)]
enum Command {
    Tap(Instant),
    Reset,
}

/// Runs a [`TapSequence`] on its own task and invokes `on_unlock` once per
/// completed gesture. Dropping the detector cancels any pending timer.
pub struct GestureDetector {
    commands: mpsc::UnboundedSender<Command>,
    disposed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl GestureDetector {
    pub fn spawn<F>(config: GestureConfig, on_unlock: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let disposed = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_detector(
            TapSequence::new(config),
            receiver,
            Arc::clone(&disposed),
            on_unlock,
        ));
        Self {
            commands,
            disposed,
            task,
        }
    }

    pub fn on_tap(&self) {
        if self.is_disposed() {
            return;
        }
        let _ = self.commands.send(Command::Tap(Instant::now()));
    }

    pub fn reset(&self) {
        let _ = self.commands.send(Command::Reset);
    }

    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!("gesture detector disposed");
        }
        self.task.abort();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for GestureDetector {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run_detector<F>(
    mut sequence: TapSequence,
    mut commands: mpsc::UnboundedReceiver<Command>,
    disposed: Arc<AtomicBool>,
    on_unlock: F,
) where
    F: Fn() + Send + Sync + 'static,
{
    let fire = |expiry: Expiry| match expiry {
        Expiry::GapReset => debug!("tap sequence reset after gap"),
        Expiry::Unlock => {
            if disposed.load(Ordering::SeqCst) {
                return;
            }
            info!("admin gesture completed");
            on_unlock();
        }
    };

    loop {
        let deadline = sequence.next_deadline();
        tokio::select! {
            biased;
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command::Tap(at) => {
                        // A tap on the cooldown boundary unlocks first, then starts a new sequence.
                        if let Some(expiry) = sequence.expire(at) {
                            fire(expiry);
                        }
                        match sequence.tap(at) {
                            TapOutcome::Ignored => debug!("tap ignored during cooldown"),
                            TapOutcome::Counted { count } => debug!(count, "tap counted"),
                            TapOutcome::Armed { .. } => debug!(
                                wait_ms = sequence.config().wait_duration.as_millis() as u64,
                                "tap sequence armed"
                            ),
                        }
                    }
                    Command::Reset => sequence.reset(),
                }
            }
            _ = wait_until(deadline) => {
                if let Some(expiry) = sequence.expire(Instant::now()) {
                    fire(expiry);
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
