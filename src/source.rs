/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The capability the chunk reader pulls from: "give me up to `limit` more
//! bytes, or tell me you're done."
//!
//! Per the Design Notes' "Channel as sum type vs. interface": two upstream
//! shapes exist (a push-style [`ByteReceiver`](crate::byte_channel::ByteReceiver)
//! and a pull-style source with its own `read`). Both are modeled behind this
//! one trait so [`ChunkReader`](crate::chunk_reader::ChunkReader) and
//! [`ChunkedEncoder`](crate::encoder::ChunkedEncoder) never need to know
//! which they were given.

use crate::byte_channel::ByteReceiver;
use crate::error::ChunkedSignerError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

/// A source of bytes the chunk reader can pull from, one call at a time.
#[async_trait]
pub trait ByteSource: Send {
    /// Returns up to `limit` bytes, or `None` iff the source is exhausted
    /// before producing any byte for this call.
    async fn next_bytes(&mut self, limit: usize) -> Result<Option<Bytes>, ChunkedSignerError>;
}

/// Adapts a [`ByteReceiver`] (C1) into a [`ByteSource`].
pub struct ChannelSource {
    receiver: ByteReceiver,
}

impl ChannelSource {
    /// Wrap `receiver` as a [`ByteSource`].
    pub fn new(receiver: ByteReceiver) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl ByteSource for ChannelSource {
    async fn next_bytes(&mut self, limit: usize) -> Result<Option<Bytes>, ChunkedSignerError> {
        if limit == 0 {
            return Ok(Some(Bytes::new()));
        }
        let mut buf = vec![0u8; limit];
        match self.receiver.read(&mut buf).await? {
            crate::byte_channel::ReadOutcome::Eos => Ok(None),
            crate::byte_channel::ReadOutcome::Read(n) => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
        }
    }
}

/// A pull-style upstream: anything that can hand back up to `limit` bytes
/// per call, or report end-of-stream. This is the non-channel half of the
/// sum type described in the Design Notes — e.g. a file reader or an
/// in-memory cursor that the caller owns directly rather than through a
/// [`ByteSender`](crate::byte_channel::ByteSender)/[`ByteReceiver`] pair.
#[async_trait]
pub trait PullRead: Send {
    /// Reads up to `limit` bytes, returning `None` at end-of-stream.
    async fn read(&mut self, limit: usize) -> Result<Option<Bytes>, ChunkedSignerError>;
}

/// Adapts a [`PullRead`] implementor into a [`ByteSource`].
pub struct PullSource<R> {
    reader: R,
}

impl<R: PullRead> PullSource<R> {
    /// Wrap `reader` as a [`ByteSource`].
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl<R: PullRead> ByteSource for PullSource<R> {
    async fn next_bytes(&mut self, limit: usize) -> Result<Option<Bytes>, ChunkedSignerError> {
        self.reader.read(limit).await
    }
}

/// A [`ByteSource`] over an in-memory buffer, handed out in at-most-`limit`
/// sized slices. Primarily useful for tests and for small, fully-buffered
/// bodies.
pub struct InMemorySource {
    remaining: BytesMut,
}

impl InMemorySource {
    /// Build a source that will yield all of `data`, then end-of-stream.
    pub fn new(data: impl Into<BytesMut>) -> Self {
        Self {
            remaining: data.into(),
        }
    }
}

#[async_trait]
impl ByteSource for InMemorySource {
    async fn next_bytes(&mut self, limit: usize) -> Result<Option<Bytes>, ChunkedSignerError> {
        if limit == 0 {
            return Ok(Some(Bytes::new()));
        }
        if self.remaining.is_empty() {
            return Ok(None);
        }
        let n = std::cmp::min(limit, self.remaining.len());
        Ok(Some(self.remaining.split_to(n).freeze()))
    }
}
