//! The AOAI connection supervisor: keeps one session's AOAI link alive for
//! as long as the call lasts, reconnecting with exponential backoff on
//! failure. A failure here is never surfaced to the telephony side - the
//! ACS call stays up regardless of AOAI's availability.

use std::sync::Arc;

use crate::aoai::AoaiClient;
use crate::session::{pump, Session};

/// Runs until the session is closed. Spawned once, the first time audio
/// metadata latches the call's audio contract.
pub async fn run(session: Arc<Session>) {
    let mut backoff = session.config.supervisor_backoff_base();
    let multiplier = session.config.supervisor_backoff_multiplier();
    let cap = session.config.supervisor_backoff_cap();

    loop {
        if session.is_closed() {
            return;
        }

        session.aoai.mark_not_ready();
        let target_rate = session.config.resample.target_rate;
        match AoaiClient::connect(&session.config.aoai, target_rate).await {
            Ok(client) => {
                *session.aoai.client.lock().await = Some(client);
                session.aoai.mark_ready();
                backoff = session.config.supervisor_backoff_base();

                log::info!(
                    "call {}: aoai connection established",
                    session.call_connection_id
                );

                tokio::select! {
                    _ = pump::run(session.clone()) => {}
                    _ = session.closed.cancelled() => {}
                }

                session.aoai.mark_not_ready();
                if let Some(mut client) = session.aoai.client.lock().await.take() {
                    client.close().await;
                }
                pump::shutdown(&session).await;

                if session.is_closed() {
                    return;
                }
                log::info!(
                    "call {}: aoai connection ended, reconnecting",
                    session.call_connection_id
                );
            }
            Err(e) => {
                log::warn!(
                    "call {}: aoai connect failed: {e}, retrying in {:?}",
                    session.call_connection_id,
                    backoff
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = session.closed.cancelled() => return,
                }
                let next = (backoff.as_millis() as f64) * multiplier;
                backoff = std::time::Duration::from_millis(next as u64).min(cap);
            }
        }
    }
}

#[allow(dead_code)]
fn backoff_is_monotonic(base_ms: u64, multiplier: f64, cap_ms: u64, steps: usize) -> bool {
    let mut backoff = base_ms as f64;
    let mut prev = backoff;
    for _ in 0..steps {
        backoff = (backoff * multiplier).min(cap_ms as f64);
        if backoff < prev && prev < cap_ms as f64 {
            return false;
        }
        prev = backoff;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_decreases_until_capped() {
        assert!(backoff_is_monotonic(500, 1.8, 8000, 20));
    }

    #[test]
    fn backoff_reaches_and_stays_at_cap() {
        let mut backoff = 500f64;
        for _ in 0..30 {
            backoff = (backoff * 1.8).min(8000.0);
        }
        assert_eq!(backoff, 8000.0);
    }
}
