use tracing::{debug, warn};

use super::Simulator;
use crate::error::{ErrorCode, SimResult};
use crate::surface::{DelayKind, SimEvent, Surface};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub payload: String,
    /// Samples taken, including the ready one.
    pub samples: u32,
}

impl Simulator {
    pub async fn poll(&mut self, surface: &dyn Surface) -> SimResult<PollOutcome> {
        let (max_attempts, interval_ms) = (
            self.config.polling.max_attempts,
            self.config.polling.interval_ms,
        );
        self.poll_with(surface, max_attempts, interval_ms).await
    }

    /// Sample the surface up to `max_attempts` times, `interval_ms` (jittered)
    /// apart, until it reports a finished response.
    pub async fn poll_with(
        &mut self,
        surface: &dyn Surface,
        max_attempts: u32,
        interval_ms: u64,
    ) -> SimResult<PollOutcome> {
        let polling = self.config.polling.clone();

        for attempt in 1..=max_attempts {
            let wait = self
                .timing
                .jittered(interval_ms, polling.jitter_ratio, &mut self.rng);
            self.pause(wait, DelayKind::Poll).await?;

            self.state.samples_taken += 1;
            let snapshot = match surface.sample().await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(attempt, "surface sample failed: {err:#}");
                    self.emit(&SimEvent::Sample {
                        attempt,
                        ready: false,
                    });
                    continue;
                }
            };

            let ready = snapshot.is_ready();
            self.emit(&SimEvent::Sample { attempt, ready });
            if !ready {
                debug!(attempt, in_progress = snapshot.in_progress, "not ready");
                continue;
            }

            let payload = snapshot.content.unwrap_or_default();
            let reading = (payload.chars().count() as u64)
                .saturating_mul(polling.read_ms_per_char)
                .min(polling.read_cap_ms);
            self.pause(reading, DelayKind::Reading).await?;
            debug!(attempt, chars = payload.chars().count(), "response ready");
            return Ok(PollOutcome {
                payload,
                samples: attempt,
            });
        }

        Err(self
            .reporter
            .raise(
                surface,
                "poll",
                ErrorCode::MaxAttemptsReached,
                format!("no ready response after {max_attempts} samples"),
                None,
            )
            .await)
    }
}
