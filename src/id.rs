//! ID generation utilities for Restlane
//!
//! Provides timestamps and process-unique identifiers for request records.

use std::sync::atomic::{AtomicU64, Ordering};

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a unique request ID
///
/// Format: `req-{timestamp_ms}-{sequence_hex}`
/// Example: `req-1738300800123-002a`
pub fn generate_request_id() -> String {
    let seq = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("req-{}-{:04x}", now_ms(), seq)
}
