// SPDX-License-Identifier: GPL-3.0-only

//! Opt-in retry for callers that expect transient contention.
//!
//! Only [`ErrorKind::Busy`] is retried. Every other kind, retryable `Lock`
//! included, is returned on the first failure.

use std::thread;
use std::time::Duration;

use crate::backend::Backend;
use crate::error::{ErrorKind, Result};
use crate::lv::LogicalVolume;

/// Delay the CLI waits between deactivation attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Deactivate `lv`, trying again up to `retries` more times while it is busy
pub fn deactivate_with_retry<B: Backend>(
    lv: &LogicalVolume<B>,
    retries: u32,
    delay: Duration,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        match lv.deactivate() {
            Err(err) if err.kind() == ErrorKind::Busy && attempt < retries => {
                attempt += 1;
                tracing::warn!("{err}; retrying ({attempt}/{retries})");
                thread::sleep(delay);
            }
            other => return other,
        }
    }
}
