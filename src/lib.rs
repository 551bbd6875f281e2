/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

#![warn(
    missing_docs,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

//! A streaming signer core for the `aws-chunked` content encoding.
//!
//! This crate implements exactly the data-plane pipeline that turns a raw
//! byte stream into its chain-signed, `aws-chunked`-framed wire form:
//!
//! - [`byte_channel`] — a single-producer/single-consumer byte pipe with
//!   backpressure, close, and cancellation (C1).
//! - [`chunk_reader`] (internal) — pulls fixed-size chunks out of a
//!   [`source::ByteSource`] (C2).
//! - [`signer`] — the contract a caller's signing implementation must
//!   satisfy: sign a chunk, sign the trailer block (C3).
//! - [`encoder`] — drives C2 and C3 to produce the encoded frames, exposed
//!   as a pull-style reader (C4).
//! - [`trailers`] — the optional trailing-header block appended after the
//!   terminal chunk.
//! - [`source`] — adapters from a [`byte_channel::ByteReceiver`] or any
//!   other pull-style reader into the [`source::ByteSource`] the chunk
//!   reader consumes.
//! - [`error`] — the shared error and cancellation types.
//!
//! Everything outside that pipeline — negotiating the outer HTTP request,
//! producing the seed signature, acquiring credentials, TLS, connection
//! pooling, endpoint resolution, retries, and decoding on the receive side —
//! is out of scope; see the module-level docs for the boundary each piece
//! assumes.

mod concurrency;

pub mod byte_channel;
pub(crate) mod chunk_reader;
pub mod encoder;
pub mod error;
pub mod signer;
pub mod source;
pub mod trailers;

pub use byte_channel::{byte_channel, ByteReceiver, ByteSender, ReadOutcome};
pub use encoder::{ChunkedEncoder, CHUNK_SIZE};
pub use error::{ChunkedSignerError, ErrorKind};
pub use signer::{ChunkSigner, Signature, SignerError};
pub use source::{ByteSource, ChannelSource, InMemorySource, PullRead, PullSource};
pub use trailers::TrailingHeaders;
