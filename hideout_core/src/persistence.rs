//! Debounced, coalescing persistence of progress.
//!
//! On-hand counts and station levels are buffered per key and written in one
//! batch once the debounce timer expires; every buffered edit restarts the
//! timer. Exclusion toggles and resets bypass the buffer. All storage I/O runs
//! on a [`StorageWriter`] thread that applies commands strictly in send order.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bevy::prelude::*;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use hideout_schema::{ItemId, StationId};

use crate::store::{load_persisted_progress, KeyValueStore, KeyWrite, Keyspace, StoredValue};
use crate::user_state::{PersistedProgress, StateChanged, UserAction, UserState};

/// Host visibility changes. Hiding and teardown force a flush.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Hidden,
    Visible,
    Teardown,
}

#[derive(Debug)]
enum WriteCommand {
    Apply {
        keyspace: Keyspace,
        writes: Vec<KeyWrite>,
    },
    Clear(Keyspace),
    Barrier(Sender<()>),
    Shutdown,
}

/// Outcome counters shared with the writer thread.
#[derive(Debug, Default)]
pub struct WriteCounters {
    applied: AtomicU64,
    failed: AtomicU64,
}

impl WriteCounters {
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Handle to the background thread that owns every storage write.
#[derive(Debug)]
pub struct StorageWriter {
    sender: Sender<WriteCommand>,
    counters: Arc<WriteCounters>,
    handle: Option<JoinHandle<()>>,
}

impl StorageWriter {
    pub fn spawn(store: Arc<dyn KeyValueStore>) -> Self {
        let (sender, receiver) = unbounded::<WriteCommand>();
        let counters = Arc::new(WriteCounters::default());
        let worker_counters = Arc::clone(&counters);
        let handle = thread::Builder::new()
            .name("hideout-storage-writer".to_string())
            .spawn(move || run_writer(store, receiver, worker_counters));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(
                    target: "hideout::persistence",
                    error = %err,
                    "persistence.writer_spawn_failed"
                );
                None
            }
        };

        Self {
            sender,
            counters,
            handle,
        }
    }

    pub fn counters(&self) -> Arc<WriteCounters> {
        Arc::clone(&self.counters)
    }

    /// Blocks until every command sent so far has been applied, or `timeout`
    /// elapses. Returns `false` on timeout or when the writer is gone.
    pub fn sync(&self, timeout: Duration) -> bool {
        let (ack, done) = bounded(1);
        if !self.send(WriteCommand::Barrier(ack)) {
            return false;
        }
        done.recv_timeout(timeout).is_ok()
    }

    fn apply(&self, keyspace: Keyspace, writes: Vec<KeyWrite>) {
        let count = writes.len() as u64;
        if !self.send(WriteCommand::Apply { keyspace, writes }) {
            self.counters.failed.fetch_add(count, Ordering::Relaxed);
        }
    }

    fn clear(&self, keyspace: Keyspace) {
        if !self.send(WriteCommand::Clear(keyspace)) {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn send(&self, command: WriteCommand) -> bool {
        if self.handle.is_none() || self.sender.send(command).is_err() {
            tracing::warn!(
                target: "hideout::persistence",
                "persistence.writer_unavailable"
            );
            return false;
        }
        true
    }
}

impl Drop for StorageWriter {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.sender.send(WriteCommand::Shutdown);
        if handle.join().is_err() {
            tracing::error!(
                target: "hideout::persistence",
                "persistence.writer_panicked"
            );
        }
    }
}

fn run_writer(
    store: Arc<dyn KeyValueStore>,
    receiver: Receiver<WriteCommand>,
    counters: Arc<WriteCounters>,
) {
    for command in receiver.iter() {
        match command {
            WriteCommand::Apply { keyspace, writes } => {
                let count = writes.len() as u64;
                match store.apply_writes(keyspace, &writes) {
                    Ok(()) => {
                        counters.applied.fetch_add(count, Ordering::Relaxed);
                    }
                    Err(err) => {
                        counters.failed.fetch_add(count, Ordering::Relaxed);
                        tracing::warn!(
                            target: "hideout::persistence",
                            keyspace = keyspace.as_str(),
                            writes = count,
                            error = %err,
                            "persistence.flush_failed"
                        );
                    }
                }
            }
            WriteCommand::Clear(keyspace) => match store.clear(keyspace) {
                Ok(()) => {
                    counters.applied.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        target: "hideout::persistence",
                        keyspace = keyspace.as_str(),
                        error = %err,
                        "persistence.clear_failed"
                    );
                }
            },
            WriteCommand::Barrier(ack) => {
                let _ = ack.send(());
            }
            WriteCommand::Shutdown => break,
        }
    }
}

fn sorted_writes(pending: HashMap<String, u32>) -> Vec<KeyWrite> {
    let mut writes: Vec<KeyWrite> = pending
        .into_iter()
        .map(|(key, value)| {
            let value = (value > 0).then_some(StoredValue::Count(value));
            (key, value)
        })
        .collect();
    writes.sort_by(|a, b| a.0.cmp(&b.0));
    writes
}

/// Pending write buffers plus the debounce timer that drains them.
#[derive(Resource, Debug)]
pub struct PersistenceLayer {
    pending_on_hand: HashMap<ItemId, u32>,
    pending_station_levels: HashMap<StationId, u32>,
    debounce: Duration,
    timer: Option<Timer>,
    flushes: u64,
    writer: StorageWriter,
}

impl PersistenceLayer {
    pub fn new(writer: StorageWriter, debounce: Duration) -> Self {
        Self {
            pending_on_hand: HashMap::new(),
            pending_station_levels: HashMap::new(),
            debounce,
            timer: None,
            flushes: 0,
            writer,
        }
    }

    pub fn writer(&self) -> &StorageWriter {
        &self.writer
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn pending_on_hand(&self) -> usize {
        self.pending_on_hand.len()
    }

    pub fn pending_station_levels(&self) -> usize {
        self.pending_station_levels.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_on_hand.is_empty() || !self.pending_station_levels.is_empty()
    }

    pub fn is_scheduled(&self) -> bool {
        self.timer.is_some()
    }

    pub fn enqueue_on_hand(&mut self, item_id: &str, value: u32) {
        self.pending_on_hand.insert(item_id.to_string(), value);
        self.schedule();
    }

    pub fn enqueue_station_level(&mut self, station_id: &str, value: u32) {
        self.pending_station_levels
            .insert(station_id.to_string(), value);
        self.schedule();
    }

    /// Written straight through; exclusions are never buffered.
    pub fn write_exclusion(&mut self, station_id: &str, excluded: bool) {
        let value = excluded.then_some(StoredValue::Flag(true));
        self.writer.apply(
            Keyspace::ExcludedStations,
            vec![(station_id.to_string(), value)],
        );
    }

    pub fn reset_on_hand(&mut self) {
        self.pending_on_hand.clear();
        self.cancel_if_idle();
        self.writer.clear(Keyspace::OnHand);
    }

    pub fn reset_station_levels(&mut self) {
        self.pending_station_levels.clear();
        self.cancel_if_idle();
        self.writer.clear(Keyspace::StationLevels);
        self.writer.clear(Keyspace::ExcludedStations);
    }

    /// Advances the debounce timer; flushes and returns `true` once it expires.
    pub fn tick(&mut self, delta: Duration) -> bool {
        let Some(timer) = self.timer.as_mut() else {
            return false;
        };
        if !timer.tick(delta).finished() {
            return false;
        }
        self.flush();
        true
    }

    /// Drains both buffers and hands their contents to the writer. The buffers
    /// are empty again before any write is sent.
    pub fn flush(&mut self) {
        self.timer = None;
        let on_hand = mem::take(&mut self.pending_on_hand);
        let station_levels = mem::take(&mut self.pending_station_levels);
        if on_hand.is_empty() && station_levels.is_empty() {
            return;
        }

        self.flushes += 1;
        tracing::debug!(
            target: "hideout::persistence",
            on_hand = on_hand.len(),
            station_levels = station_levels.len(),
            "persistence.flush"
        );
        if !on_hand.is_empty() {
            self.writer.apply(Keyspace::OnHand, sorted_writes(on_hand));
        }
        if !station_levels.is_empty() {
            self.writer
                .apply(Keyspace::StationLevels, sorted_writes(station_levels));
        }
    }

    /// Routes one applied action to the matching write path, reading the
    /// resulting values from `state`.
    pub fn record(&mut self, action: &UserAction, state: &UserState) {
        match action {
            UserAction::Hydrate(_) => {}
            UserAction::SetOnHand { item_id, .. } | UserAction::AdjustOnHand { item_id, .. } => {
                self.enqueue_on_hand(item_id, state.on_hand(item_id));
            }
            UserAction::SetStationLevel { station_id, .. } => {
                self.enqueue_station_level(station_id, state.station_level(station_id));
            }
            UserAction::UpgradeStation {
                station_id,
                consume,
                ..
            } => {
                self.enqueue_station_level(station_id, state.station_level(station_id));
                for line in consume {
                    self.enqueue_on_hand(&line.item_id, state.on_hand(&line.item_id));
                }
            }
            UserAction::ToggleStationExclusion { station_id } => {
                self.write_exclusion(station_id, state.is_excluded(station_id));
            }
            UserAction::ResetStationLevels => self.reset_station_levels(),
            UserAction::ResetOnHand => self.reset_on_hand(),
        }
    }

    fn schedule(&mut self) {
        self.timer = Some(Timer::new(self.debounce, TimerMode::Once));
    }

    fn cancel_if_idle(&mut self) {
        if !self.has_pending() {
            self.timer = None;
        }
    }
}

/// Receives the startup read from the loader thread.
#[derive(Resource, Debug)]
pub struct PendingHydration(Receiver<PersistedProgress>);

/// Reads persisted progress off the frame loop.
pub fn spawn_progress_loader(store: Arc<dyn KeyValueStore>) -> PendingHydration {
    let (sender, receiver) = bounded(1);
    let spawned = thread::Builder::new()
        .name("hideout-storage-loader".to_string())
        .spawn(move || {
            let progress = load_persisted_progress(store.as_ref());
            let _ = sender.send(progress);
        });
    if let Err(err) = spawned {
        tracing::warn!(
            target: "hideout::persistence",
            error = %err,
            "persistence.loader_spawn_failed"
        );
    }
    PendingHydration(receiver)
}

/// Dispatches `Hydrate` once the loader answers, then retires the receiver.
pub fn poll_hydration(
    mut commands: Commands,
    pending: Option<Res<PendingHydration>>,
    mut actions: EventWriter<UserAction>,
) {
    let Some(pending) = pending else {
        return;
    };
    let progress = match pending.0.try_recv() {
        Ok(progress) => progress,
        Err(TryRecvError::Empty) => return,
        Err(TryRecvError::Disconnected) => {
            tracing::warn!(
                target: "hideout::persistence",
                reason = "loader_disconnected",
                "persistence.load_failed"
            );
            PersistedProgress::default()
        }
    };
    tracing::info!(
        target: "hideout::persistence",
        on_hand = progress.on_hand.len(),
        station_levels = progress.station_levels.len(),
        excluded = progress.excluded.len(),
        "persistence.hydrate"
    );
    actions.send(UserAction::Hydrate(progress));
    commands.remove_resource::<PendingHydration>();
}

pub fn persist_state_changes(
    mut changes: EventReader<StateChanged>,
    state: Res<UserState>,
    mut layer: ResMut<PersistenceLayer>,
) {
    for changed in changes.read() {
        layer.record(&changed.action, &state);
    }
}

pub fn tick_persistence(time: Res<Time<Real>>, mut layer: ResMut<PersistenceLayer>) {
    layer.tick(time.delta());
}

pub fn flush_on_lifecycle(
    mut events: EventReader<LifecycleEvent>,
    mut layer: ResMut<PersistenceLayer>,
) {
    for event in events.read() {
        match event {
            LifecycleEvent::Hidden | LifecycleEvent::Teardown => {
                tracing::debug!(
                    target: "hideout::persistence",
                    event = ?event,
                    "persistence.forced_flush"
                );
                layer.flush();
            }
            LifecycleEvent::Visible => {}
        }
    }
}
