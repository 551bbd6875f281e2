/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! A single-producer/single-consumer in-memory byte pipe.
//!
//! Generalizes `aws-smithy-async`'s `future::rendezvous` channel (a
//! `Semaphore`-gated `tokio::sync::mpsc` pair used elsewhere in the same
//! workspace for item-at-a-time backpressure) from one item per permit to one
//! byte per permit, and adds the close/cancel semantics a raw `mpsc` pair
//! doesn't have.

use crate::concurrency::InFlightGuard;
use crate::error::{CancelCause, ChunkedSignerError};
use bytes::{Buf, Bytes};
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// The result of a non-failing read: either some bytes, or end-of-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the destination.
    Read(usize),
    /// The channel is closed for read and has no more buffered bytes.
    Eos,
}

impl ReadOutcome {
    /// The number of bytes read, or 0 at end-of-stream.
    pub fn len(self) -> usize {
        match self {
            ReadOutcome::Read(n) => n,
            ReadOutcome::Eos => 0,
        }
    }

    /// True if this outcome is `Eos`.
    pub fn is_eos(self) -> bool {
        matches!(self, ReadOutcome::Eos)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Phase {
    Open,
    ClosedForWrite,
    ClosedForRead,
}

struct Shared {
    queue: Mutex<VecDeque<Bytes>>,
    queued_bytes: Mutex<usize>,
    capacity: Option<usize>,
    phase: Mutex<Phase>,
    cancelled: Mutex<Option<CancelCause>>,
    // Woken when bytes are pushed, or the channel is closed/cancelled.
    readable: Notify,
    // Woken when bytes are drained, or the channel is closed/cancelled.
    writable: Notify,
    reader_in_flight: AtomicBool,
    writer_in_flight: AtomicBool,
}

impl Shared {
    fn cancel_cause(&self) -> Option<CancelCause> {
        self.cancelled.lock().unwrap().clone()
    }

    fn queued_len(&self) -> usize {
        *self.queued_bytes.lock().unwrap()
    }
}

/// Creates a new byte channel.
///
/// `capacity` bounds the number of unread bytes the sender may have
/// outstanding at once; `None` makes the channel unbounded.
pub fn byte_channel(capacity: Option<usize>) -> (ByteSender, ByteReceiver) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::new()),
        queued_bytes: Mutex::new(0),
        capacity,
        phase: Mutex::new(Phase::Open),
        cancelled: Mutex::new(None),
        readable: Notify::new(),
        writable: Notify::new(),
        reader_in_flight: AtomicBool::new(false),
        writer_in_flight: AtomicBool::new(false),
    });
    (
        ByteSender {
            shared: shared.clone(),
        },
        ByteReceiver { shared },
    )
}

/// The write half of a [`byte_channel`].
pub struct ByteSender {
    shared: Arc<Shared>,
}

impl ByteSender {
    /// Appends `src` to the channel, suspending while capacity is
    /// insufficient to hold it.
    pub async fn write(&self, src: &[u8]) -> Result<(), ChunkedSignerError> {
        let _guard = InFlightGuard::acquire(&self.shared.writer_in_flight, "writer")?;
        loop {
            if let Some(cause) = self.shared.cancel_cause() {
                return Err(ChunkedSignerError::cancelled(cause));
            }
            if *self.shared.phase.lock().unwrap() != Phase::Open {
                return Err(ChunkedSignerError::invalid_argument(
                    "write called after the channel was closed",
                ));
            }
            let room = match self.shared.capacity {
                None => usize::MAX,
                Some(cap) => cap.saturating_sub(self.shared.queued_len()),
            };
            if room >= src.len() {
                if !src.is_empty() {
                    self.shared
                        .queue
                        .lock()
                        .unwrap()
                        .push_back(Bytes::copy_from_slice(src));
                    *self.shared.queued_bytes.lock().unwrap() += src.len();
                }
                self.shared.readable.notify_one();
                return Ok(());
            }
            let notified = self.shared.writable.notified();
            // Re-check state under the notify registration to avoid missing
            // a wakeup that raced ahead of us.
            if self.shared.cancel_cause().is_some()
                || *self.shared.phase.lock().unwrap() != Phase::Open
            {
                continue;
            }
            notified.await;
        }
    }

    /// Marks the write end complete. A suspended reader observes
    /// end-of-stream once the buffer drains.
    pub fn close(&self) {
        let mut phase = self.shared.phase.lock().unwrap();
        if *phase == Phase::Open {
            *phase = Phase::ClosedForWrite;
        }
        drop(phase);
        self.shared.readable.notify_one();
    }

    /// Terminates the channel in both directions; pending and subsequent
    /// operations fail with `cause`.
    pub fn cancel(&self, cause: impl std::error::Error + Send + Sync + 'static) {
        let mut cancelled = self.shared.cancelled.lock().unwrap();
        if cancelled.is_none() {
            *cancelled = Some(CancelCause::new(cause));
        }
        drop(cancelled);
        self.shared.readable.notify_waiters();
        self.shared.writable.notify_waiters();
    }

    /// True once this half has been closed (not cancelled).
    ///
    /// `Cancelled` is its own terminal state, orthogonal to the
    /// `Open`/`ClosedForWrite`/`ClosedForRead` phase (§4.1): a cancelled
    /// channel that was never explicitly closed stays `Phase::Open`. Folding
    /// cancellation in here would make this disagree with
    /// [`ByteReceiver::is_closed_for_write`], which checks phase alone; both
    /// ends use `write`/`read`'s own cancellation check (`cancel_cause()`)
    /// to detect cancellation instead.
    pub fn is_closed_for_write(&self) -> bool {
        self.shared.cancel_cause().is_none()
            && *self.shared.phase.lock().unwrap() != Phase::Open
    }
}

/// The read half of a [`byte_channel`].
pub struct ByteReceiver {
    shared: Arc<Shared>,
}

impl ByteReceiver {
    fn drain_into(&self, dst: &mut [u8]) -> usize {
        let mut queue = self.shared.queue.lock().unwrap();
        let mut written = 0;
        while written < dst.len() {
            let Some(front) = queue.front_mut() else {
                break;
            };
            let n = std::cmp::min(dst.len() - written, front.len());
            front.copy_to_slice(&mut dst[written..written + n]);
            written += n;
            if front.is_empty() {
                queue.pop_front();
            }
        }
        drop(queue);
        if written > 0 {
            *self.shared.queued_bytes.lock().unwrap() -= written;
            self.shared.writable.notify_one();
        }
        written
    }

    /// Promotes `ClosedForWrite` to `ClosedForRead` once the buffer has been
    /// observed empty. Called from every drain path (`read` and
    /// `read_available`) so `is_closed_for_read` doesn't depend on which one
    /// a given consumer happens to use.
    fn promote_closed_for_read_if_drained(&self) {
        let mut phase = self.shared.phase.lock().unwrap();
        if *phase == Phase::ClosedForWrite {
            *phase = Phase::ClosedForRead;
        }
    }

    /// Copies up to `dst.len()` bytes, suspending only when the buffer is
    /// empty and the write end is still open.
    pub async fn read(&self, dst: &mut [u8]) -> Result<ReadOutcome, ChunkedSignerError> {
        let _guard = InFlightGuard::acquire(&self.shared.reader_in_flight, "reader")?;
        loop {
            if let Some(cause) = self.shared.cancel_cause() {
                return Err(ChunkedSignerError::cancelled(cause));
            }
            let n = self.drain_into(dst);
            if n > 0 {
                return Ok(ReadOutcome::Read(n));
            }
            if *self.shared.phase.lock().unwrap() != Phase::Open {
                self.promote_closed_for_read_if_drained();
                return Ok(ReadOutcome::Eos);
            }
            if dst.is_empty() {
                return Ok(ReadOutcome::Read(0));
            }
            let notified = self.shared.readable.notified();
            if self.shared.cancel_cause().is_some()
                || self.shared.queued_len() > 0
                || *self.shared.phase.lock().unwrap() != Phase::Open
            {
                continue;
            }
            notified.await;
        }
    }

    /// Reads exactly `dst.len()` bytes, failing with
    /// `UnexpectedEndOfStream` if the channel closes first.
    pub async fn read_fully(&self, dst: &mut [u8]) -> Result<(), ChunkedSignerError> {
        let mut filled = 0;
        while filled < dst.len() {
            match self.read(&mut dst[filled..]).await? {
                ReadOutcome::Read(n) => filled += n,
                ReadOutcome::Eos => return Err(ChunkedSignerError::unexpected_end_of_stream()),
            }
        }
        Ok(())
    }

    /// Non-suspending best-effort copy: returns `Read(0)` if nothing is
    /// immediately available and the channel is open, `Eos` once closed and
    /// drained.
    pub fn read_available(&self, dst: &mut [u8]) -> Result<ReadOutcome, ChunkedSignerError> {
        if let Some(cause) = self.shared.cancel_cause() {
            return Err(ChunkedSignerError::cancelled(cause));
        }
        let n = self.drain_into(dst);
        if n > 0 {
            return Ok(ReadOutcome::Read(n));
        }
        if *self.shared.phase.lock().unwrap() != Phase::Open {
            self.promote_closed_for_read_if_drained();
            return Ok(ReadOutcome::Eos);
        }
        Ok(ReadOutcome::Read(0))
    }

    /// True once the write end is closed (normally, not cancelled).
    pub fn is_closed_for_write(&self) -> bool {
        self.shared.cancel_cause().is_none()
            && *self.shared.phase.lock().unwrap() != Phase::Open
    }

    /// True once every byte has been delivered and the write end is closed.
    pub fn is_closed_for_read(&self) -> bool {
        self.shared.cancel_cause().is_none()
            && *self.shared.phase.lock().unwrap() == Phase::ClosedForRead
            && self.shared.queued_len() == 0
    }

    /// Bytes presently buffered and ready to read without suspending.
    pub fn available_for_read(&self) -> usize {
        self.shared.queued_len()
    }
}
