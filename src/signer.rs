/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The signer contract the chunked encoder drives (C3).
//!
//! Generalizes the teacher's `pub(crate) trait SignChunk` in two ways: it
//! takes `&self` instead of `&mut self` (the running signature is threaded
//! explicitly through every call instead of being tracked internally, per
//! §3/§4.3 of the spec), and its methods are `async` (a signer may need to
//! bridge to a blocking crypto library or a network-backed signer).

use async_trait::async_trait;
use bytes::Bytes;
use std::error::Error as StdError;
use std::fmt;

/// An opaque, already-textual signature. Stored and written verbatim; this
/// crate never parses or validates its contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Bytes);

impl Signature {
    /// Wrap raw signature bytes (the textual form, e.g. 64 lowercase hex
    /// characters for SigV4).
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// The seed signature supplied by a caller who has nothing prior to
    /// chain from — an empty byte sequence, per the end-to-end scenarios in
    /// §8 of the spec.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    /// The raw bytes of this signature.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Signature({s:?})"),
            Err(_) => write!(f, "Signature({:?})", self.0.as_ref()),
        }
    }
}

/// Failure returned by a [`ChunkSigner`] implementation.
#[derive(Debug)]
pub struct SignerError(Box<dyn StdError + Send + Sync>);

impl SignerError {
    /// Wrap an arbitrary signing failure.
    pub fn new(source: impl StdError + Send + Sync + 'static) -> Self {
        Self(Box::new(source))
    }

    /// The error returned by the default `sign` implementation for signers
    /// that only implement chunk/trailer signing.
    pub fn unsupported() -> Self {
        Self::new(UnsupportedOperation)
    }
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for SignerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.0.as_ref())
    }
}

#[derive(Debug)]
struct UnsupportedOperation;

impl fmt::Display for UnsupportedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "this signer does not implement outer-request signing")
    }
}

impl StdError for UnsupportedOperation {}

/// Placeholder for the outer HTTP request, which this core never builds or
/// inspects. `sign` is specified alongside `sign_chunk`/`sign_chunk_trailer`
/// only because the interface lives together in the source system; it is
/// otherwise unused by this core.
pub trait Request {}

/// The consumed signer contract (C3).
///
/// Implementations must be pure with respect to their inputs (no hidden
/// dependence on wall-clock time within a single stream), deterministic
/// given the same inputs, and must return signatures of a fixed textual
/// length across all calls for a given stream.
#[async_trait]
pub trait ChunkSigner<Cfg: Sync>: Send + Sync {
    /// Sign a data chunk's body, chained from `previous_signature`.
    async fn sign_chunk(
        &self,
        body: &[u8],
        previous_signature: &Signature,
        cfg: &Cfg,
    ) -> Result<Signature, SignerError>;

    /// Sign the trailer block's bytes (not including the trailer-signature
    /// line or the closing CRLF), chained from `previous_signature`.
    async fn sign_chunk_trailer(
        &self,
        trailer_bytes: &[u8],
        previous_signature: &Signature,
        cfg: &Cfg,
    ) -> Result<Signature, SignerError>;

    /// Sign the outer HTTP request. Unused by the chunked encoder; provided
    /// with a default so implementations that only ever sign chunks are not
    /// forced to implement it.
    async fn sign(&self, _request: &dyn Request, _cfg: &Cfg) -> Result<Signature, SignerError> {
        Err(SignerError::unsupported())
    }
}
