//! Sync Engine
//!
//! Owns the versioned store and the send queue, and drives the three loops of
//! a node: receive, send, and missing-version reconciliation.
//!
//! Store and queue live behind one mutex. Gap computation in `save` and the
//! check-and-insert of the queue must not interleave with other updates, so
//! they are never split into separately locked fields.

use crate::domain::ports::{Datagram, EventSink, Transport, TransportError};
use crate::infrastructure::shutdown::ShutdownController;
use crate::replication::codec::Codec;
use crate::replication::config::{ConfigError, EchoMode, SyncConfig};
use crate::replication::queue::SendQueue;
use crate::replication::store::VersionedStore;
use crate::replication::types::{Event, Message};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Most versions one `GetVersions` request lists, so that it always fits in
/// a datagram.
const MAX_REQUESTED_VERSIONS: usize = 2048;

/// Lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodePhase {
    /// Created, loops not running
    Joining = 0,
    /// `GetAll` requested, backlog arriving
    Syncing = 1,
    /// Serving events and reconciling periodically
    Steady = 2,
    /// Stop requested
    ShuttingDown = 3,
}

impl NodePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => NodePhase::Joining,
            1 => NodePhase::Syncing,
            2 => NodePhase::Steady,
            _ => NodePhase::ShuttingDown,
        }
    }
}

#[derive(Debug, Default)]
struct SyncState {
    store: VersionedStore,
    queue: SendQueue,
}

impl SyncState {
    fn enqueue(&mut self, msg: Message) -> bool {
        if let Some(version) = msg.version() {
            self.store.observe_version(version);
        }
        self.queue.push(msg)
    }
}

/// Synchronization engine of one board node.
pub struct SyncEngine {
    config: SyncConfig,
    codec: Codec,
    state: Mutex<SyncState>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    last_area_version: AtomicU64,
    phase: AtomicU8,
    shutdown: ShutdownController,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            codec: Codec::new(config.wire_format),
            config,
            state: Mutex::new(SyncState::default()),
            transport,
            sink,
            last_area_version: AtomicU64::new(0),
            phase: AtomicU8::new(NodePhase::Joining as u8),
            shutdown: ShutdownController::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn phase(&self) -> NodePhase {
        NodePhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Check if the loops are running.
    pub fn is_running(&self) -> bool {
        matches!(self.phase(), NodePhase::Syncing | NodePhase::Steady)
    }

    /// Handle to the stop flag shared by every loop.
    pub fn shutdown_handle(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Queue a message for transmission.
    ///
    /// Versioned messages raise the highest known version right away, so the
    /// next `next_version()` does not mint the same number again before our
    /// own echo is stored. Returns false if an identical message is already
    /// waiting, or if an event does not fit in one datagram.
    pub fn send_message(&self, msg: Message) -> bool {
        if msg.version().is_some() {
            if let Err(e) = self.codec.encode(&msg) {
                tracing::warn!(
                    "node {} refusing to originate {}: {}",
                    self.config.node_id,
                    msg.kind_name(),
                    e
                );
                return false;
            }
        }
        self.state.lock().enqueue(msg)
    }

    /// Check if a message fits in one datagram in this node's wire format.
    pub fn fits_datagram(&self, msg: &Message) -> bool {
        self.codec.encode(msg).is_ok()
    }

    /// Version to stamp on the next originated event.
    pub fn next_version(&self) -> u64 {
        self.state.lock().store.next_version()
    }

    pub fn highest_version(&self) -> u64 {
        self.state.lock().store.highest_version()
    }

    pub fn missing_versions(&self) -> Vec<u64> {
        self.state.lock().store.missing_versions()
    }

    pub fn stored_versions(&self) -> Vec<u64> {
        self.state.lock().store.versions()
    }

    pub fn stored_len(&self) -> usize {
        self.state.lock().store.len()
    }

    pub fn events_at(&self, version: u64) -> Vec<Event> {
        self.state.lock().store.events_at(version)
    }

    /// Every stored event in ascending version order.
    pub fn stored_events(&self) -> Vec<Event> {
        self.state.lock().store.events()
    }

    /// Messages waiting to be sent, oldest first.
    pub fn queued(&self) -> Vec<Message> {
        self.state.lock().queue.to_vec()
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Highest version of an area move seen or originated so far.
    pub fn last_area_version(&self) -> u64 {
        self.last_area_version.load(Ordering::SeqCst)
    }

    /// Record an area move originated locally.
    pub fn note_area_version(&self, version: u64) {
        self.last_area_version.fetch_max(version, Ordering::SeqCst);
    }

    /// Apply one decoded message.
    ///
    /// Batches are expanded through an explicit worklist so nesting depth is
    /// bounded by `max_batch_depth` instead of the call stack. Returns the
    /// number of events that were new to the store.
    pub fn handle_message(&self, msg: Message) -> usize {
        let mut work = vec![(msg, 0usize)];
        let mut applied = 0;

        while let Some((msg, depth)) = work.pop() {
            tracing::trace!("node {} --> {:?}", self.config.node_id, msg);

            let mut state = self.state.lock();

            if let Message::Event(event) = &msg {
                let gap = state.store.gap_before(event.version);
                if gap > self.config.max_version_gap {
                    drop(state);
                    tracing::warn!(
                        "node {} dropping {} v{}: would open a gap of {} versions (limit {})",
                        self.config.node_id,
                        event.kind.name(),
                        event.version,
                        gap,
                        self.config.max_version_gap
                    );
                    continue;
                }
                if !state.store.save(event.clone()) {
                    continue;
                }
            }

            // Seeing the message on the wire satisfies our own intent to send it.
            state.queue.remove(&msg);

            match msg {
                Message::Event(event) => {
                    drop(state);
                    self.apply_event(&event);
                    applied += 1;
                }
                Message::Batch { messages } => {
                    if depth >= self.config.max_batch_depth {
                        tracing::warn!(
                            "node {} dropping batch of {} nested {} levels deep",
                            self.config.node_id,
                            messages.len(),
                            depth
                        );
                        continue;
                    }
                    work.extend(messages.into_iter().rev().map(|m| (m, depth + 1)));
                }
                Message::GetVersions { versions } => {
                    let mut resent = 0;
                    for version in &versions {
                        for event in state.store.events_at(*version) {
                            state.enqueue(Message::Event(event));
                            resent += 1;
                        }
                    }
                    tracing::debug!(
                        "node {} asked for {} versions, resending {} events",
                        self.config.node_id,
                        versions.len(),
                        resent
                    );
                }
                Message::GetAll => {
                    let events = state.store.events();
                    tracing::debug!(
                        "node {} asked for everything, resending {} events",
                        self.config.node_id,
                        events.len()
                    );
                    for event in events {
                        state.enqueue(Message::Event(event));
                    }
                }
            }
        }

        applied
    }

    fn apply_event(&self, event: &Event) {
        tracing::debug!(
            "node {} applied {} v{}",
            self.config.node_id,
            event.kind.name(),
            event.version
        );
        self.sink.on_event(event);
        if event.is_area_move() {
            self.last_area_version.fetch_max(event.version, Ordering::SeqCst);
        }
    }

    /// Decode and apply one received datagram.
    ///
    /// Malformed datagrams are logged and dropped. With local echo, datagrams
    /// we sent ourselves were already applied by the send path and are
    /// skipped.
    pub fn process_datagram(&self, datagram: &Datagram) -> usize {
        if datagram.from_self && self.config.echo_mode == EchoMode::Local {
            tracing::trace!("node {} skipping own datagram", self.config.node_id);
            return 0;
        }

        match self.codec.decode(&datagram.payload) {
            Ok(msg) => self.handle_message(msg),
            Err(e) => {
                tracing::warn!(
                    "node {} dropping undecodable datagram ({} bytes): {}",
                    self.config.node_id,
                    datagram.payload.len(),
                    e
                );
                0
            }
        }
    }

    /// Wait for one datagram and apply it.
    pub async fn receive_next(&self) -> Result<usize, TransportError> {
        let datagram = self.transport.recv().await?;
        Ok(self.process_datagram(&datagram))
    }

    /// Transmit the oldest queued message, if any.
    ///
    /// Returns false when the queue was empty.
    pub async fn send_next(&self) -> bool {
        let next = self.state.lock().queue.pop_front();
        let Some(msg) = next else {
            return false;
        };

        match self.codec.encode(&msg) {
            Ok(data) => {
                tracing::trace!(
                    "node {} <-- {} ({} bytes)",
                    self.config.node_id,
                    msg.kind_name(),
                    data.len()
                );
                if let Err(e) = self.transport.send(&data).await {
                    tracing::warn!(
                        "node {} failed to send {}: {}",
                        self.config.node_id,
                        msg.kind_name(),
                        e
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    "node {} dropping unencodable {}: {}",
                    self.config.node_id,
                    msg.kind_name(),
                    e
                );
                return true;
            }
        }

        if self.config.echo_mode == EchoMode::Local {
            self.handle_message(msg);
        }
        true
    }

    /// One reconciliation tick: request every missing version.
    ///
    /// The first tick after `start()` also marks the node steady.
    pub fn reconcile(&self) -> Option<Message> {
        if self
            .phase
            .compare_exchange(
                NodePhase::Syncing as u8,
                NodePhase::Steady as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            tracing::info!("node {} is steady", self.config.node_id);
        }

        let mut state = self.state.lock();
        if !state.store.has_missing() {
            return None;
        }

        let mut missing = state.store.missing_versions();
        tracing::debug!(
            "node {} requesting {} missing versions",
            self.config.node_id,
            missing.len()
        );
        // Lowest first; the rest follow on later ticks.
        missing.truncate(MAX_REQUESTED_VERSIONS);
        let request = Message::get_versions(missing);
        state.enqueue(request.clone());
        Some(request)
    }

    /// Request the backlog and spawn the receive, send and reconcile loops.
    ///
    /// Must be called from within a tokio runtime. Returns false if the
    /// engine was already started.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .phase
            .compare_exchange(
                NodePhase::Joining as u8,
                NodePhase::Syncing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            tracing::warn!("node {} already started", self.config.node_id);
            return false;
        }

        tracing::info!(
            "starting sync engine node_id={} echo={:?} wire={:?}",
            self.config.node_id,
            self.config.echo_mode,
            self.config.wire_format
        );

        self.send_message(Message::GetAll);

        let handles = vec![
            tokio::spawn(self.clone().receive_loop()),
            tokio::spawn(self.clone().send_loop()),
            tokio::spawn(self.clone().reconcile_loop()),
        ];
        self.tasks.lock().extend(handles);
        true
    }

    /// Signal every loop to stop at its next iteration boundary.
    pub fn stop(&self) {
        self.phase.store(NodePhase::ShuttingDown as u8, Ordering::SeqCst);
        if self.shutdown.shutdown() {
            tracing::info!("stopping sync engine node_id={}", self.config.node_id);
        }
    }

    /// Wait for every spawned loop to finish.
    pub async fn wait(&self) {
        let handles = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("node {} loop task failed: {}", self.config.node_id, e);
            }
        }
    }

    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn receive_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if self.shutdown.is_shutdown() {
                break;
            }

            tokio::select! {
                result = self.receive_next() => {
                    if let Err(e) = result {
                        tracing::warn!("node {} receive error: {}", self.config.node_id, e);
                        tokio::time::sleep(self.config.send_interval).await;
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        tracing::debug!("node {} receive loop stopped", self.config.node_id);
    }

    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn send_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if self.shutdown.is_shutdown() {
                break;
            }

            self.send_next().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.send_interval) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        tracing::debug!("node {} send loop stopped", self.config.node_id);
    }

    #[cfg_attr(coverage_nightly, coverage(off))]
    async fn reconcile_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.reconcile_interval) => {}
                _ = shutdown_rx.recv() => break,
            }

            if self.shutdown.is_shutdown() {
                break;
            }

            self.reconcile();
        }

        tracing::debug!("node {} reconcile loop stopped", self.config.node_id);
    }
}
