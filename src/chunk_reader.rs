/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Pulls fixed-size chunks out of a [`ByteSource`], generalizing the
//! teacher's `buffer_next_chunk` + `ChunkBuf` looping policy: a single
//! underlying read may legitimately return fewer bytes than requested
//! without the stream being exhausted, so this keeps pulling until either
//! `chunk_size` bytes have accumulated or the source reports end-of-stream.

use crate::error::ChunkedSignerError;
use crate::source::ByteSource;
use bytes::{Bytes, BytesMut};

pub(crate) struct ChunkReader<S> {
    source: S,
    chunk_size: usize,
}

impl<S: ByteSource> ChunkReader<S> {
    pub(crate) fn new(source: S, chunk_size: usize) -> Self {
        Self { source, chunk_size }
    }

    /// Returns `Some(bytes)` with `1 ≤ bytes.len() ≤ chunk_size`, a short
    /// final `Some` at most once, or `None` iff the source was already
    /// exhausted before this call produced a single byte.
    pub(crate) async fn read_next_chunk(&mut self) -> Result<Option<Bytes>, ChunkedSignerError> {
        let mut buf = BytesMut::with_capacity(self.chunk_size);
        loop {
            let remaining = self.chunk_size - buf.len();
            if remaining == 0 {
                break;
            }
            match self.source.next_bytes(remaining).await? {
                Some(bytes) if bytes.is_empty() => continue,
                Some(bytes) => buf.extend_from_slice(&bytes),
                None => break,
            }
        }
        if buf.is_empty() {
            Ok(None)
        } else {
            Ok(Some(buf.freeze()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;

    #[tokio::test]
    async fn collects_up_to_chunk_size() {
        let mut reader = ChunkReader::new(InMemorySource::new(vec![7u8; 10]), 4);
        assert_eq!(reader.read_next_chunk().await.unwrap().unwrap().len(), 4);
        assert_eq!(reader.read_next_chunk().await.unwrap().unwrap().len(), 4);
        assert_eq!(reader.read_next_chunk().await.unwrap().unwrap().len(), 2);
        assert!(reader.read_next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_source_yields_none_immediately() {
        let mut reader = ChunkReader::new(InMemorySource::new(Vec::<u8>::new()), 64);
        assert!(reader.read_next_chunk().await.unwrap().is_none());
    }

    struct Sputtering {
        parts: std::vec::IntoIter<Option<Bytes>>,
    }

    #[async_trait::async_trait]
    impl ByteSource for Sputtering {
        async fn next_bytes(
            &mut self,
            _limit: usize,
        ) -> Result<Option<Bytes>, ChunkedSignerError> {
            match self.parts.next() {
                Some(Some(b)) => Ok(Some(b)),
                Some(None) => Ok(Some(Bytes::new())),
                None => Ok(None),
            }
        }
    }

    #[tokio::test]
    async fn tolerates_short_underlying_reads() {
        let parts = vec![
            Some(Bytes::from_static(b"ab")),
            None,
            Some(Bytes::from_static(b"cd")),
            Some(Bytes::from_static(b"ef")),
        ];
        let mut reader = ChunkReader::new(
            Sputtering {
                parts: parts.into_iter(),
            },
            6,
        );
        let chunk = reader.read_next_chunk().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"abcdef");
    }
}
