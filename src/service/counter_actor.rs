use crate::error::NexusError;
use crate::service::counter_ops::CounterOps;
use crate::types::{ChangeEvent, ChangeFilter, ChangeKind, CountSource, CounterPhase, CounterSnapshot};

use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Public messages handled by the counter actor.
#[derive(Debug)]
pub enum CounterActorMessage {
    /// Current snapshot of the held count.
    Get(RpcReplyPort<CounterSnapshot>),
    /// Optimistic `+1`; replies with the new value before the remote write lands.
    Increment(RpcReplyPort<u64>),
    /// Set the count to zero locally and remotely.
    Reset(RpcReplyPort<u64>),
    /// Re-read the remote value and adopt it unconditionally.
    Refresh(RpcReplyPort<u64>),

    // Internal messages (sent by the actor's own tasks)
    /// A row change arrived on the counter table.
    Pushed(ChangeEvent),
    /// Result of the re-fetch triggered by a push without a usable count.
    Refetched(u64),
    /// The remote writer finished its attempt for `count`.
    RemoteWriteComplete { count: u64, written: bool },
}

/// Handle for interacting with the counter actor.
#[derive(Clone)]
pub struct CounterHandle {
    actor: ActorRef<CounterActorMessage>,
    snapshots: watch::Receiver<CounterSnapshot>,
}

impl CounterHandle {
    pub async fn snapshot(&self) -> Result<CounterSnapshot, NexusError> {
        ractor::call!(self.actor, CounterActorMessage::Get)
            .map_err(|e| NexusError::RactorError(format!("Get RPC failed: {e}")))
    }

    pub async fn increment(&self) -> Result<u64, NexusError> {
        ractor::call!(self.actor, CounterActorMessage::Increment)
            .map_err(|e| NexusError::RactorError(format!("Increment RPC failed: {e}")))
    }

    pub async fn reset(&self) -> Result<u64, NexusError> {
        ractor::call!(self.actor, CounterActorMessage::Reset)
            .map_err(|e| NexusError::RactorError(format!("Reset RPC failed: {e}")))
    }

    pub async fn refresh(&self) -> Result<u64, NexusError> {
        ractor::call!(self.actor, CounterActorMessage::Refresh)
            .map_err(|e| NexusError::RactorError(format!("Refresh RPC failed: {e}")))
    }

    /// Watch every published snapshot, starting with the latest one.
    pub fn subscribe(&self) -> watch::Receiver<CounterSnapshot> {
        self.snapshots.clone()
    }

    /// Stop the actor; its change subscription and writer are torn down with it.
    pub fn stop(&self) {
        self.actor.stop(None);
    }
}

/// Coalescing remote writer: only the latest desired count is ever written,
/// and never one that is already below the held count.
struct RemoteWriter {
    desired: watch::Sender<Option<u64>>,
    task: JoinHandle<()>,
}

impl RemoteWriter {
    /// `on_done(count, written)` runs after each attempt; returning `false` ends the task.
    fn spawn<F>(ops: CounterOps, held: watch::Receiver<CounterSnapshot>, on_done: F) -> Self
    where
        F: Fn(u64, bool) -> bool + Send + 'static,
    {
        let (desired, mut rx) = watch::channel(None::<u64>);
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(count) = *rx.borrow_and_update() else {
                    continue;
                };
                let held_count = held.borrow().count;
                if count < held_count {
                    debug!(count, held = held_count, "skipping superseded remote write");
                    continue;
                }
                let written = ops.write_remote(count).await;
                if !on_done(count, written) {
                    break;
                }
            }
        });
        Self { desired, task }
    }
}

/// Internal state held by the ractor-driven counter actor
struct CounterActorState {
    ops: CounterOps,
    count: u64,
    phase: CounterPhase,
    source: CountSource,
    snapshots: watch::Sender<CounterSnapshot>,
    writer: Option<RemoteWriter>,
    feed_task: Option<JoinHandle<()>>,
}

impl CounterActorState {
    fn publish(&self) {
        self.snapshots.send_replace(CounterSnapshot {
            count: self.count,
            phase: self.phase,
            source: self.source,
            updated_at: Utc::now(),
        });
    }

    fn set(&mut self, count: u64, source: CountSource, phase: CounterPhase) {
        self.count = count;
        self.source = source;
        self.phase = phase;
        self.publish();
    }

    /// Phase after an optimistic change: `Updating` only while a write can follow.
    fn pending_phase(&self) -> CounterPhase {
        if self.writer.is_some() {
            CounterPhase::Updating
        } else {
            CounterPhase::Synced
        }
    }
}

struct CounterArgs {
    ops: CounterOps,
    snapshots: watch::Sender<CounterSnapshot>,
}

/// ractor-based counter actor
struct CounterActor;

#[ractor::async_trait]
impl Actor for CounterActor {
    type Msg = CounterActorMessage;
    type State = CounterActorState;
    type Arguments = CounterArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let state = CounterActorState {
            ops: args.ops,
            count: 0,
            phase: CounterPhase::Loading,
            source: CountSource::Local,
            snapshots: args.snapshots,
            writer: None,
            feed_task: None,
        };
        state.publish();
        Ok(state)
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let (count, source) = state.ops.fetch_motivation_count().await;
        state.set(count, source, CounterPhase::Synced);
        info!(count, source = ?source, remote = state.ops.remote().is_some(), "CounterActor loaded");

        let Some(remote) = state.ops.remote() else {
            return Ok(());
        };

        let filter = ChangeFilter::new(remote.layout().stats_table.clone(), ChangeKind::Update);
        let mut sub = remote.feed.subscribe(filter);
        let me = myself.clone();
        state.feed_task = Some(tokio::spawn(async move {
            while let Some(ev) = sub.recv().await {
                if me.cast(CounterActorMessage::Pushed(ev)).is_err() {
                    break;
                }
            }
            debug!("counter change subscription closed");
        }));

        let me = myself.clone();
        state.writer = Some(RemoteWriter::spawn(
            state.ops.clone(),
            state.snapshots.subscribe(),
            move |count, written| {
                me.cast(CounterActorMessage::RemoteWriteComplete { count, written })
                    .is_ok()
            },
        ));
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(task) = state.feed_task.take() {
            task.abort();
        }
        if let Some(writer) = state.writer.take() {
            writer.task.abort();
        }
        info!(count = state.count, "CounterActor stopped");
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            CounterActorMessage::Get(rp) => {
                let _ = rp.send(*state.snapshots.borrow());
            }
            CounterActorMessage::Increment(rp) => {
                let next = state.count.saturating_add(1);
                self.apply_local_change(state, next).await;
                let _ = rp.send(next);
                self.schedule_write(state, next);
            }
            // Other instances keep their higher count until they refresh, and
            // their next increment overwrites the reset remotely.
            CounterActorMessage::Reset(rp) => {
                info!(previous = state.count, "resetting motivation count");
                self.apply_local_change(state, 0).await;
                let _ = rp.send(0);
                self.schedule_write(state, 0);
            }
            CounterActorMessage::Refresh(rp) => {
                match state.ops.fetch_remote_count().await {
                    Ok(count) => state.set(count, CountSource::Remote, CounterPhase::Synced),
                    Err(NexusError::NotConfigured) => {
                        if let Some(count) = state.ops.read_local().await {
                            state.set(count, CountSource::Local, CounterPhase::Synced);
                        }
                    }
                    Err(e) => warn!(error = %e, "refresh failed; keeping held count"),
                }
                let _ = rp.send(state.count);
            }
            CounterActorMessage::Pushed(ev) => match ev.count() {
                Some(count) => self.adopt_if_greater(state, count, CountSource::Push).await,
                None => {
                    debug!(record = %ev.record, "push without numeric count; re-fetching");
                    let ops = state.ops.clone();
                    tokio::spawn(async move {
                        match ops.fetch_remote_count().await {
                            Ok(count) => {
                                let _ = myself.cast(CounterActorMessage::Refetched(count));
                            }
                            Err(e) => warn!(error = %e, "re-fetch after push failed"),
                        }
                    });
                }
            },
            CounterActorMessage::Refetched(count) => {
                self.adopt_if_greater(state, count, CountSource::Remote)
                    .await;
            }
            CounterActorMessage::RemoteWriteComplete { count, written } => {
                if count != state.count || state.phase != CounterPhase::Updating {
                    return Ok(());
                }
                let source = if written {
                    CountSource::Remote
                } else {
                    state.source
                };
                state.set(count, source, CounterPhase::Synced);
            }
        }
        Ok(())
    }
}

impl CounterActor {
    async fn apply_local_change(&self, state: &mut CounterActorState, count: u64) {
        let phase = state.pending_phase();
        state.set(count, CountSource::Optimistic, phase);
        state.ops.store_local(count).await;
    }

    fn schedule_write(&self, state: &CounterActorState, count: u64) {
        if let Some(writer) = state.writer.as_ref() {
            writer.desired.send_replace(Some(count));
        }
    }

    async fn adopt_if_greater(&self, state: &mut CounterActorState, count: u64, source: CountSource) {
        if count <= state.count {
            debug!(held = state.count, incoming = count, "ignoring stale counter value");
            return;
        }
        debug!(held = state.count, incoming = count, source = ?source, "adopting newer counter value");
        state.set(count, source, CounterPhase::Synced);
        if let Some(writer) = state.writer.as_ref() {
            writer.desired.send_replace(None);
        }
        state.ops.store_local(count).await;
    }
}

/// Async spawn of the counter actor; returns once the actor is registered.
/// The initial load runs before any queued message is handled.
pub async fn spawn(ops: CounterOps) -> Result<CounterHandle, NexusError> {
    let (tx, snapshots) = watch::channel(CounterSnapshot::loading());
    let args = CounterArgs { ops, snapshots: tx };
    let (actor, _jh) = Actor::spawn(None, CounterActor, args)
        .await
        .map_err(|e| NexusError::RactorError(format!("failed to spawn CounterActor: {e}")))?;
    Ok(CounterHandle { actor, snapshots })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MemoryStore, Remote};
    use crate::db::LocalStorage;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    async fn temp_storage(tag: &str) -> LocalStorage {
        let path = std::env::temp_dir().join(format!(
            "quote-nexus-actor-{tag}-{}.db",
            rand::random::<u64>()
        ));
        LocalStorage::connect(&format!("sqlite://{}", path.display()))
            .await
            .expect("sqlite")
    }

    async fn wait_for(handle: &CounterHandle, expected: u64) -> CounterSnapshot {
        let mut rx = handle.subscribe();
        let snap = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.count == expected && s.phase == CounterPhase::Synced),
        )
        .await
        .expect("timed out")
        .expect("actor gone");
        *snap
    }

    #[tokio::test]
    async fn writer_skips_counts_below_held_value() {
        let store = Arc::new(MemoryStore::default().with_counter(5));
        let ops = CounterOps::new(temp_storage("writer").await, Some(Remote::in_memory(store.clone())));
        let mut held_snapshot = CounterSnapshot::loading();
        held_snapshot.count = 10;
        let (held, held_rx) = watch::channel(held_snapshot);
        let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
        let writer = RemoteWriter::spawn(ops, held_rx, move |count, written| {
            done_tx.send((count, written)).is_ok()
        });

        writer.desired.send_replace(Some(6));
        tokio::task::yield_now().await;
        held_snapshot.count = 11;
        held.send_replace(held_snapshot);
        writer.desired.send_replace(Some(11));

        let done = tokio::time::timeout(Duration::from_secs(2), done_rx.recv())
            .await
            .expect("timed out")
            .expect("writer gone");
        assert_eq!(done, (11, true));
        assert_eq!(store.counter(), Some(11));
        // Existence check and update for 11 only.
        assert_eq!(store.calls(), 2);
        writer.task.abort();
    }

    #[tokio::test]
    async fn reset_writes_zero_everywhere() {
        let store = Arc::new(MemoryStore::default().with_counter(9));
        let ops = CounterOps::new(temp_storage("reset").await, Some(Remote::in_memory(store.clone())));
        let handle = spawn(ops.clone()).await.unwrap();

        assert_eq!(handle.snapshot().await.unwrap().count, 9);
        assert_eq!(handle.reset().await.unwrap(), 0);
        wait_for(&handle, 0).await;
        assert_eq!(store.counter(), Some(0));
        assert_eq!(ops.read_local().await, Some(0));
        handle.stop();
    }

    #[tokio::test]
    async fn push_without_count_triggers_refetch() {
        let store = Arc::new(MemoryStore::default().with_counter(2));
        let ops = CounterOps::new(temp_storage("refetch").await, Some(Remote::in_memory(store.clone())));
        let handle = spawn(ops).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().count, 2);

        store.set_counter(7);
        store.emit(ChangeEvent {
            table: "motivation_stats".to_string(),
            kind: ChangeKind::Update,
            record: json!({ "id": 1 }),
            old_record: json!({}),
        });

        let snap = wait_for(&handle, 7).await;
        assert_eq!(snap.source, CountSource::Remote);
        handle.stop();
    }

    #[tokio::test]
    async fn refresh_adopts_lower_remote_value() {
        let store = Arc::new(MemoryStore::default().with_counter(10));
        let ops = CounterOps::new(temp_storage("refresh").await, Some(Remote::in_memory(store.clone())));
        let handle = spawn(ops).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().count, 10);

        store.set_failing(true);
        assert_eq!(handle.refresh().await.unwrap(), 10);

        store.set_failing(false);
        store.set_counter(3);
        assert_eq!(handle.refresh().await.unwrap(), 3);
        handle.stop();
    }
}
