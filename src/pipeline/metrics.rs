//! Egress statistics of one delivery pipeline

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the drain loop and egress tasks
#[derive(Debug, Default)]
pub struct EgressMetrics {
    /// Data contexts accepted into the ingress queue
    pub received: AtomicU64,

    /// Payloads handed to the egress queue
    pub submitted: AtomicU64,

    /// Payloads refused because the egress queue was full
    pub rejected: AtomicU64,

    /// Payloads the transport confirmed
    pub succeeded: AtomicU64,

    /// Payloads the transport failed to send
    pub failed: AtomicU64,

    /// Bytes confirmed by the transport
    pub bytes_sent: AtomicU64,

    /// Empty chunks dropped by the chunker
    pub empty_chunks: AtomicU64,
}

impl EgressMetrics {
    pub const fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            empty_chunks: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn context_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn payload_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn payload_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn payload_sent(&self, bytes: u64) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn payload_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn empty_chunk(&self) {
        self.empty_chunks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> EgressSnapshot {
        EgressSnapshot {
            received: self.received.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            empty_chunks: self.empty_chunks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EgressMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EgressSnapshot {
    pub received: u64,
    pub submitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub bytes_sent: u64,
    pub empty_chunks: u64,
}

impl EgressSnapshot {
    /// Payloads submitted but not yet confirmed or failed
    pub fn pending(&self) -> u64 {
        self.submitted.saturating_sub(self.succeeded + self.failed)
    }
}
