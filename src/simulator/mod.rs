//! Human-input primitives over a [`Surface`].
//!
//! A [`Simulator`] owns the per-run mutable state (pointer position, typing
//! session, random sequence) and is the only writer of it. Every primitive
//! awaits its own delays, so at most one simulated step is in flight.

mod commit;
mod interact;
mod keystroke;
mod pointer;
mod poller;

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, RngCore};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SimulationConfig;
use crate::error::{ErrorCode, Reporter, SimError, SimResult};
use crate::model::{Element, KeyEvent, Point, PointerEvent};
use crate::surface::{DelayKind, SimEvent, SimObserver, Surface};
use crate::timing::{Lcg, TimingModel};

pub use interact::{impact_point, ClickOptions};
pub use keystroke::TypeReport;
pub use pointer::{base_step_count, plan_move, plan_segment, scaled_step_count, PathStep};
pub use poller::PollOutcome;

const IDLE_JITTER_PX: f64 = 2.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatorState {
    /// Position of the most recently dispatched pointer event.
    pub last_position: Point,
    /// Pointer speed estimate in px/ms from the last motion step.
    pub speed: f64,
    pub typing_active: bool,
    pub last_char: Option<char>,
    pub seed: Option<u32>,
    /// Surface samples taken by the poller during this run.
    pub samples_taken: u32,
}

pub struct Simulator {
    config: SimulationConfig,
    timing: TimingModel,
    state: SimulatorState,
    rng: Box<dyn RngCore + Send>,
    observers: Vec<Arc<dyn SimObserver>>,
    cancel: CancellationToken,
    reporter: Reporter,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Simulator {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => Lcg::new(seed),
            None => Lcg::from_entropy(),
        };
        let state = SimulatorState {
            seed: Some(rng.seed()),
            ..Default::default()
        };
        Self {
            timing: TimingModel::new(&config.pause),
            reporter: Reporter::new(config.logging_enabled),
            config,
            state,
            rng: Box::new(rng),
            observers: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the random sequence, e.g. with a scripted one in tests.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self.state.seed = None;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SimObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_start_position(mut self, at: Point) -> Self {
        self.state.last_position = at;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn state(&self) -> &SimulatorState {
        &self.state
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Forget everything learned during a run; keeps config, RNG and observers.
    pub fn reset(&mut self) {
        self.state = SimulatorState {
            seed: self.state.seed,
            ..Default::default()
        };
    }

    pub fn emit(&self, event: &SimEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }

    /// Map a failed section check to `InvalidConfig`.
    fn checked(&self, operation: &'static str, section: anyhow::Result<()>) -> SimResult<()> {
        section.map_err(|err| {
            let err = SimError::bare(operation, ErrorCode::InvalidConfig, format!("{err:#}"));
            self.reporter.log(&err);
            err
        })
    }

    fn sample_ms(&mut self, min: u64, max: u64) -> u64 {
        self.timing.sample(min, max, &mut self.rng)
    }

    /// Await `ms`, or fail with `Cancelled` as soon as the token fires.
    pub(crate) async fn pause(&mut self, ms: u64, kind: DelayKind) -> SimResult<()> {
        self.emit(&SimEvent::Delay { ms, kind });
        if !sleep_cancellable(&self.cancel, ms).await {
            return Err(SimError::cancelled("pause"));
        }
        Ok(())
    }

    /// Short random pause between unrelated actions.
    pub async fn think(&mut self) -> SimResult<()> {
        let (min, max) = (self.config.timing.min_delay_ms, self.config.timing.max_delay_ms);
        let ms = self.sample_ms(min, max);
        self.pause(ms, DelayKind::Think).await
    }

    pub(crate) async fn dispatch_pointer(
        &mut self,
        surface: &dyn Surface,
        event: PointerEvent,
    ) -> SimResult<()> {
        if let Err(err) = surface.dispatch_pointer(&event).await {
            return Err(self
                .reporter
                .raise(
                    surface,
                    "dispatch_pointer",
                    ErrorCode::DispatchFailed,
                    format!("{event:?} rejected: {err:#}"),
                    None,
                )
                .await);
        }
        self.state.last_position = event.position();
        self.emit(&SimEvent::Pointer(event));
        Ok(())
    }

    pub(crate) async fn dispatch_key(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
        event: KeyEvent,
    ) -> SimResult<()> {
        if let Err(err) = surface.dispatch_key(element, &event).await {
            return Err(self
                .reporter
                .raise(
                    surface,
                    "dispatch_key",
                    ErrorCode::DispatchFailed,
                    format!("{event:?} rejected: {err:#}"),
                    Some(&element.selector),
                )
                .await);
        }
        self.emit(&SimEvent::Key(event));
        Ok(())
    }

    pub(crate) async fn notify_input(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
    ) -> SimResult<()> {
        if let Err(err) = surface.notify_input(element).await {
            return Err(self
                .reporter
                .raise(
                    surface,
                    "notify_input",
                    ErrorCode::DispatchFailed,
                    format!("input notification rejected: {err:#}"),
                    Some(&element.selector),
                )
                .await);
        }
        Ok(())
    }

    /// Maybe take a "thinking" wait. While it lasts, a ticker nudges the
    /// pointer a pixel or two around where it rests; the ticker is dropped
    /// the moment the wait ends. Returns whether a wait happened.
    pub async fn idle(&mut self, surface: &dyn Surface) -> SimResult<bool> {
        let timing = self.config.timing.clone();
        self.checked("idle", timing.validate())?;
        if timing.idle_probability <= 0.0 || !self.rng.gen_bool(timing.idle_probability) {
            return Ok(false);
        }

        let ms = self
            .timing
            .idle_sample(timing.idle_timeout_ms, &mut self.rng);
        self.emit(&SimEvent::Delay {
            ms,
            kind: DelayKind::Idle,
        });

        let deadline = Instant::now() + Duration::from_millis(ms);
        let mut ticker =
            tokio::time::interval(Duration::from_millis(timing.idle_jitter_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.reset();

        let anchor = self.state.last_position;
        let cancel = self.cancel.clone();
        let mut jitter = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SimError::cancelled("idle")),
                _ = tokio::time::sleep_until(deadline) => break,
                _ = ticker.tick(), if jitter => {
                    let at = anchor.offset(
                        self.rng.gen_range(-IDLE_JITTER_PX..=IDLE_JITTER_PX),
                        self.rng.gen_range(-IDLE_JITTER_PX..=IDLE_JITTER_PX),
                    );
                    let event = PointerEvent::Move { at };
                    match surface.dispatch_pointer(&event).await {
                        Ok(()) => {
                            self.state.last_position = at;
                            self.emit(&SimEvent::Pointer(event));
                        }
                        Err(err) => {
                            debug!("idle jitter stopped: {err:#}");
                            jitter = false;
                        }
                    }
                }
            }
        }

        Ok(true)
    }
}

/// Sleep for `ms`, returning `false` if `cancel` fired first.
pub(crate) async fn sleep_cancellable(cancel: &CancellationToken, ms: u64) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if ms == 0 {
        return true;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(Duration::from_millis(ms)) => true,
    }
}
