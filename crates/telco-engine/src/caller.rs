//! Simulated callers that drive traffic through the towers.
//!
//! Each caller runs on its own task with its own mailbox and repeats one
//! cycle until shutdown:
//!
//! 1. Pick a random spot on the map and ask every tower for a signal report.
//! 2. Rank the towers that answered by received power.
//! 3. Send `Hello` to the strongest one. `Fail` and silence are treated the
//!    same way: move on to the next-ranked tower with `reconnect` set.
//! 4. Once connected, hold the call, then send `Disconnect`.
//! 5. Idle, then start over.
//!
//! Replies that arrive for an earlier attempt are discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use rand::rngs::SmallRng;
use telco_tower::{EntityRef, Mailbox, Message, TowerHandle};
use telco_types::{CallerId, Cdr, CdrState, TowerId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CallersConfig;

/// Running totals across every caller.
#[derive(Debug, Default)]
pub struct CallStats {
    attempts: AtomicU64,
    connected: AtomicU64,
    rejected: AtomicU64,
    unanswered: AtomicU64,
    completed: AtomicU64,
    abandoned: AtomicU64,
    no_coverage: AtomicU64,
}

/// Point-in-time copy of [`CallStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStatsSnapshot {
    /// `Hello` messages sent.
    pub attempts: u64,
    /// `Connect` replies received.
    pub connected: u64,
    /// `Fail` replies received.
    pub rejected: u64,
    /// Attempts that timed out without a reply, or whose tower had stopped.
    pub unanswered: u64,
    /// Calls that ended with a `Disconnect`.
    pub completed: u64,
    /// Calls given up after running out of towers or attempts.
    pub abandoned: u64,
    /// Surveys where no tower answered at all.
    pub no_coverage: u64,
}

impl CallStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> CallStatsSnapshot {
        CallStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            connected: self.connected.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unanswered: self.unanswered.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            no_coverage: self.no_coverage.load(Ordering::Relaxed),
        }
    }
}

/// A tower that answered a signal survey.
#[derive(Debug, Clone)]
struct Candidate {
    tower_id: TowerId,
    tower_ref: EntityRef,
    power: f64,
}

/// How one admission attempt ended.
#[derive(Debug)]
enum Reply {
    Connected(EntityRef),
    Rejected,
    Silent,
}

/// A mobile handset.
pub struct Caller {
    id: CallerId,
    mailbox: Mailbox,
    towers: Arc<[TowerHandle]>,
    config: CallersConfig,
    area: (f64, f64),
    rng: SmallRng,
    stats: Arc<CallStats>,
}

impl Caller {
    /// Create a caller that roams a `width` x `height` meter map.
    pub fn new(
        towers: Arc<[TowerHandle]>,
        config: CallersConfig,
        area: (f64, f64),
        rng: SmallRng,
        stats: Arc<CallStats>,
    ) -> Self {
        Self {
            id: CallerId::new(),
            mailbox: Mailbox::new(),
            towers,
            config,
            area,
            rng,
            stats,
        }
    }

    /// Run the caller on its own task until `shutdown` flips to `true`.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        debug!(caller_id = %self.id, "caller started");
        while !*shutdown.borrow() {
            self.place_call(&mut shutdown).await;

            let idle = self.random_ms(self.config.min_idle_ms, self.config.max_idle_ms);
            tokio::select! {
                () = tokio::time::sleep(idle) => {}
                _ = shutdown.changed() => {}
            }
        }
        debug!(caller_id = %self.id, "caller stopped");
    }

    async fn place_call(&mut self, shutdown: &mut watch::Receiver<bool>) {
        let (width, height) = self.area;
        let x = self.rng.random_range(0.0..width);
        let y = self.rng.random_range(0.0..height);

        let candidates = self.survey(x, y).await;
        if candidates.is_empty() {
            debug!(caller_id = %self.id, x = x, y = y, "no tower in range");
            CallStats::bump(&self.stats.no_coverage);
            return;
        }

        let mut cdr = Cdr::new(self.id, Utc::now());
        let attempts = usize::try_from(self.config.max_attempts).unwrap_or(usize::MAX);
        for (attempt, candidate) in candidates.iter().take(attempts).enumerate() {
            let reconnect = attempt > 0;
            cdr = cdr.with_tower(candidate.tower_id.clone());
            if let Reply::Connected(tower_ref) = self.attempt(candidate, &cdr, reconnect).await {
                let state = if reconnect {
                    CdrState::Reconnect
                } else {
                    CdrState::Connect
                };
                self.hold_and_hang_up(cdr.with_state(state), &tower_ref, shutdown)
                    .await;
                return;
            }
        }

        info!(caller_id = %self.id, "call abandoned");
        CallStats::bump(&self.stats.abandoned);
    }

    /// Send one `Hello` and count how it ended.
    ///
    /// Every attempt lands in exactly one of `connected`, `rejected` or
    /// `unanswered`. A tower that stopped since the survey counts as
    /// unanswered.
    async fn attempt(&mut self, candidate: &Candidate, cdr: &Cdr, reconnect: bool) -> Reply {
        CallStats::bump(&self.stats.attempts);
        let hello = Message::Hello {
            caller: self.mailbox.address(),
            cdr: cdr.clone(),
            reconnect,
        };
        let reply = if candidate.tower_ref.tell(hello) {
            self.await_reply(&candidate.tower_id).await
        } else {
            debug!(caller_id = %self.id, tower_id = %candidate.tower_id, "tower gone");
            Reply::Silent
        };
        match &reply {
            Reply::Connected(_) => CallStats::bump(&self.stats.connected),
            Reply::Rejected => CallStats::bump(&self.stats.rejected),
            Reply::Silent => CallStats::bump(&self.stats.unanswered),
        }
        reply
    }

    /// Ask every tower about `(x, y)` and rank the answers, strongest first.
    async fn survey(&mut self, x: f64, y: f64) -> Vec<Candidate> {
        let stale = self.mailbox.drain();
        if stale > 0 {
            debug!(caller_id = %self.id, stale = stale, "discarded stale messages");
        }

        for tower in self.towers.iter() {
            let _ = tower.tell(Message::SignalReportRequest {
                x,
                y,
                source: self.mailbox.address(),
            });
        }

        let deadline = Instant::now()
            .checked_add(Duration::from_millis(self.config.report_window_ms))
            .unwrap_or_else(Instant::now);
        let mut candidates = Vec::new();
        while candidates.len() < self.towers.len() {
            match tokio::time::timeout_at(deadline, self.mailbox.recv()).await {
                Ok(Some(Message::SignalReport {
                    power,
                    tower_id,
                    tower_ref,
                    ..
                })) => candidates.push(Candidate {
                    tower_id,
                    tower_ref,
                    power,
                }),
                Ok(Some(other)) => {
                    debug!(caller_id = %self.id, kind = other.kind(), "ignoring message during survey");
                }
                Ok(None) | Err(_) => break,
            }
        }

        rank(&mut candidates);
        candidates
    }

    /// Wait for `Connect` or `Fail` from `tower`, up to the reply timeout.
    async fn await_reply(&mut self, tower: &TowerId) -> Reply {
        let deadline = Instant::now()
            .checked_add(Duration::from_millis(self.config.reply_timeout_ms))
            .unwrap_or_else(Instant::now);
        loop {
            match tokio::time::timeout_at(deadline, self.mailbox.recv()).await {
                Ok(Some(Message::Connect {
                    tower_id,
                    tower_ref,
                })) if &tower_id == tower => return Reply::Connected(tower_ref),
                Ok(Some(Message::Fail { tower_id })) if &tower_id == tower => {
                    return Reply::Rejected;
                }
                Ok(Some(other)) => {
                    debug!(caller_id = %self.id, kind = other.kind(), "ignoring stale reply");
                }
                Ok(None) | Err(_) => return Reply::Silent,
            }
        }
    }

    async fn hold_and_hang_up(
        &mut self,
        cdr: Cdr,
        tower_ref: &EntityRef,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let duration = self.random_ms(self.config.min_call_ms, self.config.max_call_ms);
        debug!(caller_id = %self.id, duration_ms = duration.as_millis(), "call in progress");
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            _ = shutdown.changed() => {}
        }

        let cdr = cdr.finished(Utc::now());
        let disconnect = Message::Disconnect {
            caller_id: self.id,
            cdr,
        };
        if tower_ref.tell(disconnect) {
            CallStats::bump(&self.stats.completed);
        } else {
            warn!(caller_id = %self.id, "tower gone before disconnect");
        }
    }

    fn random_ms(&mut self, min: u64, max: u64) -> Duration {
        Duration::from_millis(self.rng.random_range(min..=max.max(min)))
    }
}

/// Sort candidates by received power, strongest first.
fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.power.total_cmp(&a.power));
}
