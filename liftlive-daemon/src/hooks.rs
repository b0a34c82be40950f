//! Set lifecycle hooks
//!
//! Reacts to gateway lifecycle events: records finished sets in the
//! history store and pushes rest-period cues. Failures here are logged
//! and never reach the gateway.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use liftlive_gateway::{GatewayEvent, LiveGateway};
use liftlive_metrics::{HistoryStore, MusicAction, SetContext, SetEnd};

use crate::shorts::ShortsCurator;

/// Options taken from the daemon config
#[derive(Debug, Clone, Copy)]
pub struct HookOptions {
    pub rest_cues: bool,
    pub rest_queue_size: usize,
}

pub struct SetHooks {
    gateway: Arc<LiveGateway>,
    history: Arc<HistoryStore>,
    shorts: Arc<ShortsCurator>,
    options: HookOptions,
}

impl SetHooks {
    pub fn new(
        gateway: Arc<LiveGateway>,
        history: Arc<HistoryStore>,
        shorts: Arc<ShortsCurator>,
        options: HookOptions,
    ) -> Self {
        Self {
            gateway,
            history,
            shorts,
            options,
        }
    }

    /// Subscribe to the gateway and handle events until it goes away.
    pub fn spawn(self) -> JoinHandle<()> {
        let events = self.gateway.subscribe();
        tokio::spawn(self.run(events))
    }

    async fn run(self, mut events: broadcast::Receiver<GatewayEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Set hooks lagged; skipped {} lifecycle events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Set hooks stopped");
    }

    pub async fn handle(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::SetStarted { .. } => {
                if self.options.rest_cues {
                    self.gateway.broadcast_music_cue(MusicAction::Restore).await;
                }
            }
            GatewayEvent::SetEnded {
                set_end,
                context,
                was_active,
            } => {
                if !was_active {
                    debug!("Ignoring setEnd with no active set");
                    return;
                }
                if set_end.summary.reps > 0 {
                    self.record(&set_end, &context);
                } else {
                    debug!("Empty set not recorded");
                }
                if self.options.rest_cues {
                    self.start_rest().await;
                }
            }
            GatewayEvent::SetExpired { discarded_reps } => {
                info!("Expired set not recorded ({} reps discarded)", discarded_reps);
            }
        }
    }

    fn record(&self, set_end: &SetEnd, context: &SetContext) {
        match self.history.record_set(set_end, context, Utc::now()) {
            Ok(id) => debug!("Recorded set {} ({} reps)", id, set_end.summary.reps),
            Err(e) => warn!("Failed to record set in history: {:#}", e),
        }
    }

    async fn start_rest(&self) {
        match self.shorts.queue(self.options.rest_queue_size).await {
            Ok(queue) => self.gateway.broadcast_shorts_queue(queue).await,
            Err(e) => warn!("No rest-period shorts: {:#}", e),
        }
        self.gateway.broadcast_music_cue(MusicAction::Duck).await;
    }
}
