//! Per-user ordered delivery
//!
//! Updates from one user are handled strictly in arrival order by a
//! dedicated task; different users run concurrently. Submitting never
//! waits on a lane: a user whose queue is full loses the overflow, so one
//! flooding user cannot hold up the shared pump. A lane shuts itself down
//! after sitting idle. A lane started while its predecessor is still
//! draining waits for the predecessor to finish first.

use super::traits::UpdateHandler;
use crate::messenger::{Update, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const LANE_CAPACITY: usize = 32;

struct Lane {
    generation: u64,
    tx: mpsc::Sender<Update>,
    task: JoinHandle<()>,
}

type LaneMap = Arc<Mutex<HashMap<UserId, Lane>>>;

/// Routes each update to its user's lane
pub struct LaneManager<H: UpdateHandler + 'static> {
    handler: Arc<H>,
    lanes: LaneMap,
    idle: Duration,
    next_generation: AtomicU64,
}

impl<H: UpdateHandler + 'static> LaneManager<H> {
    pub fn new(handler: Arc<H>, idle: Duration) -> Self {
        Self {
            handler,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            idle,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Queue `update` on its user's lane, starting one if needed
    pub async fn submit(&self, update: Update) {
        let user_id = update.user_id;
        let mut update = update;

        loop {
            let tx = {
                let mut lanes = self.lanes.lock().await;
                let open = lanes
                    .get(&user_id)
                    .filter(|lane| !lane.tx.is_closed())
                    .map(|lane| lane.tx.clone());
                match open {
                    Some(tx) => tx,
                    None => {
                        let previous = lanes.remove(&user_id).map(|lane| lane.task);
                        let lane = self.spawn_lane(user_id, previous);
                        let tx = lane.tx.clone();
                        lanes.insert(user_id, lane);
                        tx
                    }
                }
            };

            // A lane that closed between lookup and send hands the update back
            match tx.try_send(update) {
                Ok(()) => return,
                Err(TrySendError::Closed(returned)) => update = returned,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(user_id = %user_id, "Lane full, dropping update");
                    return;
                }
            }
        }
    }

    /// Number of lanes currently running
    pub async fn active_lanes(&self) -> usize {
        self.lanes.lock().await.len()
    }

    fn spawn_lane(&self, user_id: UserId, previous: Option<JoinHandle<()>>) -> Lane {
        let generation = self
            .next_generation
            .fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(LANE_CAPACITY);
        let task = tokio::spawn(run_lane(
            self.handler.clone(),
            self.lanes.clone(),
            user_id,
            generation,
            rx,
            self.idle,
            previous,
        ));
        tracing::debug!(user_id = %user_id, generation, "Lane started");
        Lane {
            generation,
            tx,
            task,
        }
    }
}

async fn run_lane<H: UpdateHandler>(
    handler: Arc<H>,
    lanes: LaneMap,
    user_id: UserId,
    generation: u64,
    mut rx: mpsc::Receiver<Update>,
    idle: Duration,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            tracing::warn!(user_id = %user_id, error = %e, "Previous lane ended abnormally");
        }
    }

    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(update)) => handler.handle(update).await,
            Ok(None) => break,
            Err(_) => {
                // Refuse new work, then finish what was already queued
                rx.close();
                while let Some(update) = rx.recv().await {
                    handler.handle(update).await;
                }
                break;
            }
        }
    }

    let mut lanes = lanes.lock().await;
    if lanes.get(&user_id).is_some_and(|lane| lane.generation == generation) {
        lanes.remove(&user_id);
    }
    tracing::debug!(user_id = %user_id, generation, "Lane stopped");
}
