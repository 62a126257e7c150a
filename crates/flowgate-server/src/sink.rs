//! Response sink that stages rejection output for an async connection.
//!
//! Admission decisions are synchronous while socket writes are not, so the
//! rejection policy writes into a [`PendingResponse`] and the connection task
//! flushes it afterwards.

use bytes::{Bytes, BytesMut};
use flowgate_admission::ResponseSink;
use std::io;

/// Buffered output of one rejected request.
#[derive(Debug, Default)]
pub struct PendingResponse {
    payload: BytesMut,
    close: bool,
}

impl PendingResponse {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the staged payload, if anything was written.
    pub fn take_payload(&mut self) -> Option<Bytes> {
        if self.payload.is_empty() {
            None
        } else {
            Some(self.payload.split().freeze())
        }
    }

    /// Returns true if the policy asked for the connection to be closed.
    pub fn should_close(&self) -> bool {
        self.close
    }
}

impl ResponseSink for PendingResponse {
    fn write_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        if self.close {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "response already closed",
            ));
        }
        self.payload.extend_from_slice(payload);
        Ok(())
    }

    fn close(&mut self) {
        self.close = true;
    }
}
