//! World assembly and teardown.
//!
//! [`Universe::build`] connects the event stream, places the towers and
//! starts the callers. [`Universe::shutdown`] stops everything in reverse
//! order and flushes the stream before returning, so every CDR snapshot a
//! tower enqueued has reached the transport by the time the process exits.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use telco_tower::{
    EventPublisher, InMemoryPublisher, Message, NatsPublisher, StreamPublisher, Tower,
    TowerHandle,
};
use telco_types::Position;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::caller::{CallStats, CallStatsSnapshot, Caller};
use crate::config::SimulationConfig;
use crate::error::EngineError;

/// Summary produced by [`Universe::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Towers that were running.
    pub towers: usize,
    /// Callers that were running.
    pub callers: usize,
    /// Call outcome totals.
    pub calls: CallStatsSnapshot,
    /// Whether the final stream flush succeeded.
    pub flushed: bool,
}

/// Every running entity of one simulation.
pub struct Universe {
    publisher: StreamPublisher,
    publisher_worker: Option<JoinHandle<()>>,
    towers: Arc<[TowerHandle]>,
    tower_tasks: Vec<JoinHandle<()>>,
    callers: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    stats: Arc<CallStats>,
}

impl Universe {
    /// Connect the stream, spawn the towers and start the callers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Tower`] if the stream cannot be reached or a
    /// tower rejects its settings. Nothing is left running in that case.
    pub async fn build(config: &SimulationConfig) -> Result<Self, EngineError> {
        let (publisher, publisher_worker) = match &config.stream.nats_url {
            Some(url) => {
                let (nats, worker) =
                    NatsPublisher::connect(url, config.stream.flush_each_publish).await?;
                (StreamPublisher::Nats(nats), Some(worker))
            }
            None => {
                info!(
                    capacity = config.stream.memory_capacity,
                    "no NATS URL configured, keeping the newest CDRs in memory"
                );
                let memory = InMemoryPublisher::bounded(config.stream.memory_capacity);
                (StreamPublisher::Memory(memory), None)
            }
        };

        let mut world_rng = match config.world.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };

        let (width, height) = (config.world.width_m, config.world.height_m);
        let mut handles = Vec::new();
        let mut tower_tasks = Vec::new();
        for _ in 0..config.towers.count {
            let position = Position {
                x: world_rng.random_range(0.0..width),
                y: world_rng.random_range(0.0..height),
            };
            let tower = Tower::new(
                &config.towers.settings,
                position,
                publisher.clone(),
                SmallRng::from_rng(&mut world_rng),
            )?;
            let (handle, task) = tower.spawn();
            let _ = handle.tell(Message::Setup);
            handles.push(handle);
            tower_tasks.push(task);
        }
        let towers: Arc<[TowerHandle]> = handles.into();
        info!(count = towers.len(), "towers online");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(CallStats::default());
        let callers = (0..config.callers.count)
            .map(|_| {
                Caller::new(
                    Arc::clone(&towers),
                    config.callers.clone(),
                    (width, height),
                    SmallRng::from_rng(&mut world_rng),
                    Arc::clone(&stats),
                )
                .spawn(shutdown_rx.clone())
            })
            .collect::<Vec<_>>();
        info!(count = callers.len(), "callers started");

        Ok(Self {
            publisher,
            publisher_worker,
            towers,
            tower_tasks,
            callers,
            shutdown,
            stats,
        })
    }

    /// The publisher every tower appends to.
    pub const fn publisher(&self) -> &StreamPublisher {
        &self.publisher
    }

    /// Stop callers, then towers, then drain the stream.
    pub async fn shutdown(self) -> RunSummary {
        let Self {
            publisher,
            publisher_worker,
            towers,
            tower_tasks,
            callers,
            shutdown,
            stats,
        } = self;

        let _ = shutdown.send(true);
        let caller_count = callers.len();
        for caller in callers {
            if let Err(e) = caller.await {
                warn!(error = %e, "caller task failed");
            }
        }
        debug!("callers stopped");

        // Callers held clones of the tower list; this is the last one.
        let tower_count = towers.len();
        drop(towers);
        for task in tower_tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "tower task failed");
            }
        }
        debug!("towers stopped");

        let flushed = match publisher.flush().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "final stream flush failed");
                false
            }
        };
        drop(publisher);
        if let Some(worker) = publisher_worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "publisher worker failed");
            }
        }

        RunSummary {
            towers: tower_count,
            callers: caller_count,
            calls: stats.snapshot(),
            flushed,
        }
    }
}
