/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Error types shared by the byte channel, chunk reader, and chunked encoder.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A boxed, cloneable error source.
///
/// `Arc` rather than `Box` so an encoder that has transitioned into its
/// terminal `Failed` state can hand the same error back out of every
/// subsequent read call, as required by the "subsequent reads surface the
/// same error" rule.
type Source = Arc<dyn StdError + Send + Sync + 'static>;

/// The cause a channel was cancelled with.
///
/// Cloneable for the same reason as [`Source`]: cancellation must be
/// replayable to every operation that observes it after the fact.
#[derive(Clone)]
pub struct CancelCause(Source);

impl CancelCause {
    /// Wrap `cause` as a cancellation cause.
    pub fn new(cause: impl StdError + Send + Sync + 'static) -> Self {
        Self(Arc::new(cause))
    }
}

impl fmt::Debug for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for CancelCause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}

/// The kind of failure a [`ChunkedSignerError`] carries.
///
/// Mirrors §7 of the specification exactly: five kinds, one of which
/// (`InvalidArgument`) never changes encoder/channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Offset/length violation on `read_fully`/`read_available`, or a
    /// concurrent-reader/writer precondition violation.
    InvalidArgument,
    /// `read_fully` could not satisfy its request because the stream is
    /// closed for read.
    UnexpectedEndOfStream,
    /// Failure from the wrapped byte stream or channel.
    UnderlyingStream,
    /// Failure from the signer.
    Signer,
    /// The driving task was cancelled.
    Cancelled,
}

/// Error produced by the byte channel, chunk reader, or chunked encoder.
///
/// `InvalidArgument` never mutates the state of the thing that produced it;
/// every other kind transitions the producer into a terminal state and is
/// replayed verbatim to subsequent calls (hence the `Arc`-backed, cloneable
/// source below, instead of `Box` as the teacher's one-shot
/// `AwsChunkedBodyError` uses).
#[derive(Clone)]
pub struct ChunkedSignerError {
    kind: ErrorKind,
    message: Arc<str>,
    source: Option<Source>,
}

impl ChunkedSignerError {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Build an `InvalidArgument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidArgument,
            message: message.into().into(),
            source: None,
        }
    }

    /// Build an `UnexpectedEndOfStream` error.
    pub fn unexpected_end_of_stream() -> Self {
        Self {
            kind: ErrorKind::UnexpectedEndOfStream,
            message: "read_fully could not be satisfied before the stream closed".into(),
            source: None,
        }
    }

    /// Wrap a failure surfaced by the underlying byte stream or channel.
    pub fn underlying_stream(source: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            kind: ErrorKind::UnderlyingStream,
            message: "the underlying stream failed".into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Wrap a failure surfaced by the signer.
    pub fn signer(source: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            kind: ErrorKind::Signer,
            message: "the signer failed".into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Build a `Cancelled` error from a [`CancelCause`].
    pub fn cancelled(cause: CancelCause) -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            message: "the driving task was cancelled".into(),
            source: Some(cause.0),
        }
    }
}

impl fmt::Debug for ChunkedSignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedSignerError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for ChunkedSignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {source}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl StdError for ChunkedSignerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|s| s.as_ref() as &(dyn StdError + 'static))
    }
}
