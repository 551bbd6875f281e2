/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The trailing-headers frame: an insertion-ordered multimap plus the wire
//! serialization rules from §3/§6 of the spec.
//!
//! Generalizes the teacher's `http_1x_utils::trailers_as_aws_chunked_bytes` /
//! `total_rendered_length_of_trailers` pair away from `http::HeaderMap`: this
//! core has no dependency on an HTTP crate, since the outer request (and its
//! headers) is entirely out of scope.

use crate::signer::Signature;
use bytes::{BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";
const TRAILER_SIGNATURE_NAME: &[u8] = b"x-amz-trailer-signature:";

/// An ordered multimap of trailing-header name to its values, preserving the
/// insertion order of the provided collection.
#[derive(Debug, Clone, Default)]
pub struct TrailingHeaders {
    entries: Vec<(String, Vec<String>)>,
}

impl TrailingHeaders {
    /// An empty trailer set — emits no trailer frame at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value for `name`, creating the entry if this is the first
    /// value seen for it.
    pub fn push(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if let Some((_, values)) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            values.push(value);
        } else {
            self.entries.push((name, vec![value]));
        }
        self
    }

    /// True iff no trailer frame should be emitted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(name, joined_values)` pairs in insertion order. Multiple
    /// values for one name are joined with a single comma, no surrounding
    /// whitespace.
    pub fn iter(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.join(",")))
    }

    /// Serializes `<name>":"<joined-values>CRLF` lines in emission order,
    /// with no trailer-signature line and no closing CRLF. This is exactly
    /// the `trailer_bytes` the signer signs over.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.estimated_len());
        for (name, joined) in self.iter() {
            buf.put_slice(name.as_bytes());
            buf.put_u8(b':');
            buf.put_slice(joined.as_bytes());
            buf.put_slice(CRLF);
        }
        buf.freeze()
    }

    /// The full trailer block: the serialized lines, the trailer-signature
    /// line, and the closing CRLF that ends the body.
    pub fn render(&self, signature: &Signature) -> Bytes {
        let mut buf = BytesMut::from(&self.serialize()[..]);
        buf.put_slice(TRAILER_SIGNATURE_NAME);
        buf.put_slice(signature.as_bytes());
        buf.put_slice(CRLF);
        buf.put_slice(CRLF);
        buf.freeze()
    }

    fn estimated_len(&self) -> usize {
        self.entries
            .iter()
            .map(|(name, values)| name.len() + 1 + values.iter().map(|v| v.len()).sum::<usize>() + 2)
            .sum()
    }
}
