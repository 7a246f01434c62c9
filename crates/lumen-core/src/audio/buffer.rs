//! Broadcast audio buffer
//!
//! Every subscriber gets its own bounded FIFO and sees every chunk in
//! production order, so a probe connection and the real playback connection
//! never steal data from each other. A full FIFO drops its oldest chunk; the
//! producer is never blocked.

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Immutable chunk of interleaved PCM bytes
pub type AudioChunk = Arc<[u8]>;

/// Identifier of one subscriber's view of the stream
pub type SubscriptionId = u64;

/// Per-subscriber capacity: 1200 chunks of 4096 bytes, about 28 s of audio
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1200;

struct QueueState {
    chunks: VecDeque<AudioChunk>,
    alive: bool,
}

struct SubscriberQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                chunks: VecDeque::with_capacity(capacity.min(64)),
                alive: true,
            }),
            ready: Condvar::new(),
        }
    }
}

/// Thread-safe fan-out buffer for audio chunks
pub struct BroadcastBuffer {
    subscribers: RwLock<HashMap<SubscriptionId, Arc<SubscriberQueue>>>,
    /// Serializes producers so every subscriber observes the same order
    put_lock: Mutex<()>,
    next_id: AtomicU64,
    capacity: usize,
    evicted: AtomicU64,
}

impl Default for BroadcastBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl BroadcastBuffer {
    /// Create a buffer whose subscribers each hold at most `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            put_lock: Mutex::new(()),
            next_id: AtomicU64::new(0),
            capacity: capacity.max(1),
            evicted: AtomicU64::new(0),
        }
    }

    /// Per-subscriber capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a new subscriber. Ids are never reused.
    pub fn subscribe(&self) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .insert(id, Arc::new(SubscriberQueue::new(self.capacity)));
        debug!("AudioBuffer: subscriber {} registered", id);
        id
    }

    /// Register a subscriber wrapped in a guard that unsubscribes on drop
    pub fn subscription(self: &Arc<Self>) -> Subscription {
        Subscription {
            id: self.subscribe(),
            buffer: Arc::clone(self),
        }
    }

    /// Remove a subscriber. Pending `get` calls on it return `None`.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.subscribers.write().remove(&id);
        if let Some(queue) = removed {
            let mut state = queue.state.lock();
            state.alive = false;
            state.chunks.clear();
            queue.ready.notify_all();
            debug!("AudioBuffer: subscriber {} removed", id);
        }
    }

    /// Append a chunk to every live subscriber, evicting the oldest chunk of
    /// any subscriber that is full.
    pub fn put(&self, chunk: AudioChunk) {
        let _order = self.put_lock.lock();
        let subscribers = self.subscribers.read();
        for queue in subscribers.values() {
            let mut state = queue.state.lock();
            if state.chunks.len() >= self.capacity {
                state.chunks.pop_front();
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            state.chunks.push_back(Arc::clone(&chunk));
            queue.ready.notify_all();
        }
    }

    /// Wait up to `timeout` for the next chunk of subscriber `id`.
    ///
    /// A zero timeout polls without blocking. Unknown or removed ids and
    /// timeouts all yield `None`.
    pub fn get(&self, id: SubscriptionId, timeout: Duration) -> Option<AudioChunk> {
        let queue = self.subscribers.read().get(&id).cloned()?;

        let mut state = queue.state.lock();
        if timeout.is_zero() {
            return state.chunks.pop_front();
        }

        let deadline = Instant::now() + timeout;
        while state.chunks.is_empty() && state.alive {
            if queue.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if !state.alive {
            return None;
        }
        state.chunks.pop_front()
    }

    /// Drop all queued chunks of every subscriber
    pub fn clear(&self) {
        for queue in self.subscribers.read().values() {
            queue.state.lock().chunks.clear();
        }
    }

    /// Number of chunks queued for subscriber `id`
    pub fn pending(&self, id: SubscriptionId) -> usize {
        self.subscribers
            .read()
            .get(&id)
            .map(|queue| queue.state.lock().chunks.len())
            .unwrap_or(0)
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Total chunks evicted from full subscriber queues
    pub fn evicted_chunks(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

/// A live subscription that releases itself when dropped
pub struct Subscription {
    id: SubscriptionId,
    buffer: Arc<BroadcastBuffer>,
}

impl Subscription {
    /// Subscription id
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait up to `timeout` for the next chunk
    pub fn recv(&self, timeout: Duration) -> Option<AudioChunk> {
        self.buffer.get(self.id, timeout)
    }

    /// Take the next chunk if one is already queued
    pub fn try_recv(&self) -> Option<AudioChunk> {
        self.buffer.get(self.id, Duration::ZERO)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.buffer.unsubscribe(self.id);
    }
}
