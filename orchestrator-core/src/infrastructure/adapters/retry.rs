// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Exponential backoff for `RuntimeError::Transient` results from a
//! `RuntimeDriver` call: initial 200 ms, factor 2, max 5 attempts. Only
//! `Transient` is retried; `NotFound`/`Busy`/`Refused` are returned to the
//! caller immediately.

use runner_orchestrator_domain::ports::RuntimeError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const BACKOFF_FACTOR: u32 = 2;
const MAX_ATTEMPTS: u32 = 5;

/// Retries `op` while it returns `RuntimeError::Transient`, backing off
/// exponentially between attempts. Returns the last error once
/// `MAX_ATTEMPTS` is reached.
pub async fn retry_transient<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, RuntimeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RuntimeError>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(RuntimeError::Transient(reason)) if attempt < MAX_ATTEMPTS => {
                debug!(op_name, attempt, ?backoff, reason, "retrying after transient failure");
                tokio::time::sleep(backoff).await;
                backoff *= BACKOFF_FACTOR;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_after_transient_retries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = retry_transient("apply_limits", move || {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(RuntimeError::Transient("not ready".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: Result<(), RuntimeError> =
            retry_transient("create_slot", || async { Err(RuntimeError::Transient("still down".into())) }).await;

        assert!(matches!(result, Err(RuntimeError::Transient(_))));
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), RuntimeError> = retry_transient("stop", move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(RuntimeError::NotFound)
            }
        })
        .await;

        assert!(matches!(result, Err(RuntimeError::NotFound)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
