//! Single-producer / single-consumer byte queue between acquisition and disk.
//!
//! The queue is split into a [`ByteProducer`] (held by the acquisition loop)
//! and a [`ByteConsumer`] (held by the persistence worker). Neither half is
//! `Clone`, so there is exactly one of each.
//!
//! Capacity `0` means unbounded: `push` never waits and memory grows while the
//! disk falls behind. A non-zero capacity makes `push` wait for space instead.
//! Data is never dropped in either mode.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{GrabberError, Result};

/// Capacity value selecting the unbounded policy.
pub const UNBOUNDED: usize = 0;

struct QueueState {
    bytes: VecDeque<u8>,
    /// No further pushes will happen.
    closed: bool,
    /// The consumer half was dropped; pushes would never be drained.
    consumer_gone: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

impl Shared {
    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.readable.notify_all();
    }
}

/// Producer half, held by the acquisition side.
pub struct ByteProducer {
    shared: Arc<Shared>,
}

/// Consumer half, held by the persistence worker.
pub struct ByteConsumer {
    shared: Arc<Shared>,
}

/// Create a matched producer/consumer pair.
///
/// `capacity` is in bytes; [`UNBOUNDED`] (`0`) disables the bound.
pub fn create_byte_queue(capacity: usize) -> (ByteProducer, ByteConsumer) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            bytes: VecDeque::new(),
            closed: false,
            consumer_gone: false,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
        capacity,
    });
    (
        ByteProducer {
            shared: Arc::clone(&shared),
        },
        ByteConsumer { shared },
    )
}

impl ByteProducer {
    /// Append `bytes` in order.
    ///
    /// With a bounded queue this waits for the consumer to make room, possibly
    /// several times for a slice larger than the capacity.
    ///
    /// # Errors
    /// `GrabberError::QueueDisconnected` if the consumer has been dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let shared = &*self.shared;
        let mut state = shared.state.lock();

        if shared.capacity == UNBOUNDED {
            if state.consumer_gone {
                return Err(GrabberError::QueueDisconnected);
            }
            state.bytes.extend(bytes);
            drop(state);
            shared.readable.notify_one();
            return Ok(());
        }

        let mut remaining = bytes;
        while !remaining.is_empty() {
            while state.bytes.len() >= shared.capacity && !state.consumer_gone {
                shared.writable.wait(&mut state);
            }
            if state.consumer_gone {
                return Err(GrabberError::QueueDisconnected);
            }
            let room = shared.capacity - state.bytes.len();
            let (now, later) = remaining.split_at(room.min(remaining.len()));
            state.bytes.extend(now);
            remaining = later;
            shared.readable.notify_one();
        }
        Ok(())
    }

    /// Signal end-of-stream. Equivalent to dropping the producer.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for ByteProducer {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl ByteConsumer {
    /// Pop up to `buf.len()` bytes into `buf`.
    ///
    /// Blocks until at least one byte is available, then returns without
    /// waiting for more. Returns `0` only once the producer has closed and
    /// every queued byte has been handed out (or when `buf` is empty).
    pub fn pop(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }

        let shared = &*self.shared;
        let mut state = shared.state.lock();
        while state.bytes.is_empty() {
            if state.closed {
                return 0;
            }
            shared.readable.wait(&mut state);
        }

        let n = buf.len().min(state.bytes.len());
        for (dst, src) in buf.iter_mut().zip(state.bytes.drain(..n)) {
            *dst = src;
        }
        drop(state);

        if shared.capacity != UNBOUNDED {
            shared.writable.notify_one();
        }
        n
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.shared.state.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the producer has closed. Buffered bytes may still remain.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl Drop for ByteConsumer {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.consumer_gone = true;
        state.bytes.clear();
        drop(state);
        self.shared.writable.notify_all();
    }
}
