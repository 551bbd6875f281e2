/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! A single-slot "operation in flight" guard shared by the byte channel and
//! the chunked encoder, both of which are specified as single-reader/
//! single-writer: a second concurrent caller is a precondition violation,
//! not something to queue behind.

use crate::error::ChunkedSignerError;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool, what: &str) -> Result<Self, ChunkedSignerError> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(ChunkedSignerError::invalid_argument(format!(
                "only one {what} may be in flight at a time"
            )));
        }
        Ok(Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
