//! Background triggers for sync cycles: a periodic tick and network changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::config::MIN_SYNC_INTERVAL;
use super::orchestrator::SyncOrchestrator;
use crate::remote::RemoteApi;

/// Shared online/offline flag
#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    /// Record the current network state. Returns true if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// What drives scheduled cycles
#[derive(Debug)]
pub enum TickSource {
    /// Fire every period, starting one period from now
    Interval(Duration),
    /// Fire on every message; stops when the sender is dropped
    Channel(mpsc::Receiver<()>),
}

enum Ticker {
    Interval(Interval),
    Channel(mpsc::Receiver<()>),
}

impl Ticker {
    fn new(source: TickSource) -> Self {
        match source {
            TickSource::Interval(period) => {
                let period = period.max(MIN_SYNC_INTERVAL);
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Self::Interval(interval)
            }
            TickSource::Channel(rx) => Self::Channel(rx),
        }
    }

    /// Wait for the next tick. Returns false once the source is exhausted.
    async fn tick(&mut self) -> bool {
        match self {
            Self::Interval(interval) => {
                interval.tick().await;
                true
            }
            Self::Channel(rx) => rx.recv().await.is_some(),
        }
    }
}

/// Run the scheduler loop until the tick source or the network monitor goes
/// away.
///
/// Ticks are skipped while offline. An offline to online transition triggers
/// a cycle right away. Going offline never interrupts a running cycle.
pub async fn run_scheduler<R: RemoteApi>(
    orchestrator: Arc<SyncOrchestrator<R>>,
    mut network: watch::Receiver<bool>,
    ticks: TickSource,
) {
    let mut ticker = Ticker::new(ticks);
    let mut was_online = *network.borrow_and_update();
    tracing::debug!("Sync scheduler started (online: {})", was_online);

    loop {
        tokio::select! {
            ticked = ticker.tick() => {
                if !ticked {
                    break;
                }
                if !*network.borrow() {
                    tracing::debug!("Offline; skipping scheduled sync");
                    continue;
                }
                orchestrator.sync_now().await;
            }
            changed = network.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *network.borrow_and_update();
                if online && !was_online {
                    tracing::info!("Network restored; starting sync");
                    orchestrator.sync_now().await;
                } else if !online && was_online {
                    tracing::info!("Network lost; pausing scheduled sync");
                }
                was_online = online;
            }
        }
    }

    tracing::debug!("Sync scheduler stopped");
}

/// Spawn [`run_scheduler`] on the current runtime.
pub fn spawn_scheduler<R: RemoteApi + 'static>(
    orchestrator: Arc<SyncOrchestrator<R>>,
    network: watch::Receiver<bool>,
    ticks: TickSource,
) -> JoinHandle<()> {
    tokio::spawn(run_scheduler(orchestrator, network, ticks))
}
