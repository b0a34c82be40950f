use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use liftlive_metrics::{
    parse_reps, set_update, summarize, MusicAction, RepEvent, SetContext, SetEnd, SetState,
    SetUpdate,
};

use crate::client::{ClientManager, SessionId};
use crate::error::Result;
use crate::events::{ClientCommand, GatewayEvent, ServerEvent};

/// Gateway tuning
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Force an active set back to idle after this long without activity
    pub idle_timeout: Option<Duration>,
    /// Derive and broadcast a `setUpdate` after every rep
    pub live_set_updates: bool,
    /// Capacity of the in-process lifecycle channel
    pub lifecycle_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(600)),
            live_set_updates: true,
            lifecycle_capacity: 64,
        }
    }
}

/// Gateway-global set state; one shared training session for all clients
struct SetTracker {
    state: SetState,
    context: SetContext,
    reps: Vec<RepEvent>,
    started_by: Option<SessionId>,
    last_activity: Instant,
}

impl SetTracker {
    fn idle() -> Self {
        Self {
            state: SetState::Idle,
            context: SetContext::default(),
            reps: Vec::new(),
            started_by: None,
            last_activity: Instant::now(),
        }
    }

    fn reset(&mut self) {
        self.state = SetState::Idle;
        self.context = SetContext::default();
        self.reps.clear();
        self.started_by = None;
    }
}

/// Real-time hub for set lifecycle and live metrics.
///
/// Set state and the session registry sit behind separate locks, always
/// taken in that order. Broadcasts are queued while the set lock is held,
/// so every session sees a set's `setEnd` after all of its `rep` and
/// `setUpdate` events.
pub struct LiveGateway {
    config: GatewayConfig,
    clients: ClientManager,
    tracker: Mutex<SetTracker>,
    lifecycle_tx: broadcast::Sender<GatewayEvent>,
}

impl LiveGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let (lifecycle_tx, _) = broadcast::channel(config.lifecycle_capacity.max(1));

        Self {
            config,
            clients: ClientManager::new(),
            tracker: Mutex::new(SetTracker::idle()),
            lifecycle_tx,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register a new session and send it the acknowledgment plus, during
    /// an active set, a catch-up snapshot.
    pub async fn connect(&self) -> (SessionId, UnboundedReceiver<ServerEvent>) {
        let tracker = self.tracker.lock().await;
        let (id, rx) = self.clients.register().await;

        let ack = ServerEvent::ConnectionAck {
            status: "connected".to_string(),
            sid: id.to_string(),
        };
        if let Err(e) = self.clients.send_to(id, ack).await {
            warn!("Failed to acknowledge client {}: {}", id, e);
        }

        if tracker.state == SetState::Active {
            let snapshot = set_update(&tracker.reps, now_millis());
            if let Err(e) = self.clients.send_to(id, ServerEvent::SetUpdate(snapshot)).await {
                warn!("Failed to send catch-up to client {}: {}", id, e);
            }
        }

        (id, rx)
    }

    /// Drop a session. An active set keeps running.
    pub async fn disconnect(&self, id: SessionId) {
        self.clients.unregister(id).await;
    }

    /// Idle → Active. Restarting an active set discards its buffer.
    pub async fn start_set(&self, session: Option<SessionId>, context: SetContext) {
        let mut tracker = self.tracker.lock().await;

        if tracker.state == SetState::Active {
            warn!(
                "Set restarted before it ended; discarding {} buffered reps",
                tracker.reps.len()
            );
        }

        tracker.state = SetState::Active;
        tracker.reps.clear();
        tracker.context = context.clone();
        tracker.started_by = session;
        tracker.last_activity = Instant::now();

        match session {
            Some(id) => info!("▶️ Set started by {} ({:?})", id, context.exercise_id),
            None => info!("▶️ Set started ({:?})", context.exercise_id),
        }

        let _ = self.lifecycle_tx.send(GatewayEvent::SetStarted {
            context,
            started_by: session,
        });
    }

    /// Buffer a rep from the ingestion path and broadcast it.
    ///
    /// Returns false (rep dropped) when no set is active.
    pub async fn record_rep(&self, rep: RepEvent) -> bool {
        let mut tracker = self.tracker.lock().await;

        if tracker.state != SetState::Active {
            warn!("Dropping rep {} received while idle", rep.id);
            return false;
        }

        tracker.reps.push(rep.clone());
        tracker.last_activity = Instant::now();
        debug!("Rep {} buffered ({} in set)", rep.id, tracker.reps.len());

        self.clients.broadcast(&ServerEvent::Rep(rep)).await;

        if self.config.live_set_updates {
            let update = set_update(&tracker.reps, now_millis());
            self.clients.broadcast(&ServerEvent::SetUpdate(update)).await;
        }

        true
    }

    /// Broadcast a snapshot from an external live aggregator. Active only.
    pub async fn publish_set_update(&self, update: SetUpdate) -> bool {
        let mut tracker = self.tracker.lock().await;

        if tracker.state != SetState::Active {
            debug!("Ignoring setUpdate while idle");
            return false;
        }

        tracker.last_activity = Instant::now();
        self.clients.broadcast(&ServerEvent::SetUpdate(update)).await;
        true
    }

    /// Summarize the set, broadcast `setEnd` and return to idle.
    ///
    /// `reps` is the client's list when it sent one; otherwise the
    /// gateway's own buffer is used.
    pub async fn end_set(&self, session: Option<SessionId>, reps: Option<Vec<RepEvent>>) -> SetEnd {
        let mut tracker = self.tracker.lock().await;

        let was_active = tracker.state == SetState::Active;
        if !was_active {
            warn!("endSet received while idle; summarizing anyway");
        }
        if let (Some(owner), Some(caller)) = (tracker.started_by, session) {
            if owner != caller {
                debug!("Set started by {} ended by {}", owner, caller);
            }
        }

        let buffered = std::mem::take(&mut tracker.reps);
        let reps = reps.unwrap_or(buffered);
        let set_end = summarize(&reps);

        let delivered = self
            .clients
            .broadcast(&ServerEvent::SetEnd(set_end.clone()))
            .await;

        let context = std::mem::take(&mut tracker.context);
        tracker.reset();

        info!(
            "🏁 Set ended: {} reps, VL {:.1}%, ROM {:.1}% (sent to {} clients)",
            set_end.summary.reps, set_end.summary.vl, set_end.summary.rom_hit_rate, delivered
        );

        let _ = self.lifecycle_tx.send(GatewayEvent::SetEnded {
            set_end: set_end.clone(),
            context,
            was_active,
        });

        set_end
    }

    pub async fn broadcast_music_cue(&self, action: MusicAction) {
        self.clients.broadcast(&ServerEvent::MusicCue { action }).await;
    }

    pub async fn broadcast_shorts_queue(&self, queue: Vec<String>) {
        self.clients.broadcast(&ServerEvent::Shorts { queue }).await;
    }

    /// Apply one client text frame.
    ///
    /// A malformed frame is logged, answered with `processing_error` to
    /// the sender alone, and otherwise ignored.
    pub async fn handle_frame(&self, session: SessionId, text: &str) -> Result<()> {
        match ClientCommand::parse(text) {
            Ok(ClientCommand::StartSet(context)) => {
                self.start_set(Some(session), context).await;
                Ok(())
            }
            Ok(ClientCommand::EndSet { reps }) => {
                let reps = reps.map(|values| {
                    let parsed = parse_reps(&values);
                    if !parsed.rejected.is_empty() {
                        warn!(
                            "endSet from {}: excluded {} of {} reps",
                            session,
                            parsed.rejected.len(),
                            values.len()
                        );
                    }
                    parsed.reps
                });
                self.end_set(Some(session), reps).await;
                Ok(())
            }
            Ok(ClientCommand::Rep(rep)) => {
                self.record_rep(rep).await;
                Ok(())
            }
            Err(e) => {
                warn!("Ignoring frame from {}: {}", session, e);
                let reply = ServerEvent::ProcessingError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                };
                if let Err(send_err) = self.clients.send_to(session, reply).await {
                    debug!("Could not report error to {}: {}", session, send_err);
                }
                Err(e)
            }
        }
    }

    /// Drop an active set that has been quiet for longer than the idle
    /// timeout. No `setEnd` is sent for it.
    pub async fn expire_stale_set(&self, now: Instant) -> bool {
        let Some(timeout) = self.config.idle_timeout else {
            return false;
        };

        let mut tracker = self.tracker.lock().await;
        if tracker.state != SetState::Active
            || now.saturating_duration_since(tracker.last_activity) < timeout
        {
            return false;
        }

        let discarded_reps = tracker.reps.len();
        tracker.reset();
        warn!(
            "⏱️ Active set idle for over {}s; discarded {} reps",
            timeout.as_secs(),
            discarded_reps
        );

        let _ = self
            .lifecycle_tx
            .send(GatewayEvent::SetExpired { discarded_reps });
        true
    }

    /// Run [`expire_stale_set`](Self::expire_stale_set) periodically.
    /// `None` when no idle timeout is configured.
    pub fn spawn_watchdog(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let timeout = self.config.idle_timeout?;
        let period = (timeout / 4).clamp(Duration::from_millis(10), Duration::from_secs(30));
        let gateway = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                gateway.expire_stale_set(Instant::now()).await;
            }
        }))
    }

    /// In-process lifecycle notifications
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.lifecycle_tx.subscribe()
    }

    pub async fn state(&self) -> SetState {
        self.tracker.lock().await.state
    }

    pub async fn buffered_reps(&self) -> usize {
        self.tracker.lock().await.reps.len()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.client_count().await
    }
}

impl Default for LiveGateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
