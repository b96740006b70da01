//! The workflow state machine.
//!
//! `Verifying → Resetting → Injecting → Submitting → Polling → Capturing →
//! Completed`, with a one-shot `FallbackInjecting → FallbackSubmitting →
//! Capturing` detour when the primary poll runs out of attempts. Any error
//! ends the run in `Failed` carrying the originating code.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::error::{ErrorCode, Reporter, SimError, SimResult};
use crate::model::{
    Element, ElementRole, ModeFlags, WorkflowMessage, WorkflowResult, WorkflowState,
};
use crate::simulator::{ClickOptions, Simulator};
use crate::surface::{SimEvent, SimObserver, Surface};

// Longest legal path is 9 states; anything past this is a bug.
const MAX_TRANSITIONS: usize = 16;

#[derive(Debug, Default)]
struct Run {
    states: Vec<WorkflowState>,
    payload: Option<String>,
    used_fallback: bool,
}

pub struct Orchestrator {
    surface: Arc<dyn Surface>,
    config: SimulationConfig,
    observers: Vec<Arc<dyn SimObserver>>,
    cancel: CancellationToken,
    reporter: Reporter,
}

impl Orchestrator {
    pub fn new(surface: Arc<dyn Surface>, config: SimulationConfig) -> Self {
        Self {
            reporter: Reporter::new(config.logging_enabled),
            surface,
            config,
            observers: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SimObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Cancelling this token fails the current and every later run with
    /// `Cancelled`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A fresh simulator wired to this orchestrator's observers and token.
    pub fn simulator(&self) -> Simulator {
        self.observers.iter().fold(
            Simulator::new(self.config.clone()).with_cancellation(self.cancel.clone()),
            |sim, observer| sim.with_observer(observer.clone()),
        )
    }

    pub async fn run(&self, message: WorkflowMessage) -> WorkflowResult {
        self.run_with(self.simulator(), message).await
    }

    /// Drive one run with a caller-built simulator (e.g. a scripted RNG).
    pub async fn run_with(&self, mut sim: Simulator, message: WorkflowMessage) -> WorkflowResult {
        sim.reset();
        let mut run = Run::default();
        let mut state = WorkflowState::Verifying;

        let outcome = loop {
            self.enter(&sim, &mut run, state);
            if run.states.len() > MAX_TRANSITIONS {
                break Err(SimError::bare(
                    "workflow",
                    ErrorCode::Unknown,
                    format!("state machine did not settle: {:?}", run.states),
                ));
            }
            match self.step(&mut sim, state, &message, &mut run).await {
                Ok(WorkflowState::Completed) => break Ok(()),
                Ok(next) => state = next,
                Err(err) => break Err(err),
            }
        };

        let poll_samples = sim.state().samples_taken;
        match outcome {
            Ok(()) => {
                self.enter(&sim, &mut run, WorkflowState::Completed);
                WorkflowResult {
                    success: true,
                    payload: run.payload,
                    error_code: None,
                    states: run.states,
                    used_fallback: run.used_fallback,
                    poll_samples,
                }
            }
            Err(err) => {
                warn!(code = err.code.code(), state = ?state, "workflow failed: {err}");
                self.enter(&sim, &mut run, WorkflowState::Failed);
                WorkflowResult {
                    success: false,
                    payload: None,
                    error_code: Some(err.code),
                    states: run.states,
                    used_fallback: run.used_fallback,
                    poll_samples,
                }
            }
        }
    }

    fn enter(&self, sim: &Simulator, run: &mut Run, state: WorkflowState) {
        info!(state = ?state, "workflow state");
        run.states.push(state);
        sim.emit(&SimEvent::State { state });
    }

    async fn step(
        &self,
        sim: &mut Simulator,
        state: WorkflowState,
        message: &WorkflowMessage,
        run: &mut Run,
    ) -> SimResult<WorkflowState> {
        let flags = message.mode_flags;
        match state {
            WorkflowState::Verifying => {
                self.verify(message).await?;
                Ok(WorkflowState::Resetting)
            }
            WorkflowState::Resetting => {
                if !flags.skip_reset {
                    self.reset_session(sim).await?;
                }
                Ok(WorkflowState::Injecting)
            }
            WorkflowState::Injecting => {
                self.inject(sim, &message.content, flags).await?;
                Ok(WorkflowState::Submitting)
            }
            WorkflowState::Submitting => {
                self.submit(sim, flags).await?;
                Ok(WorkflowState::Polling)
            }
            WorkflowState::Polling => match sim.poll(self.surface.as_ref()).await {
                Ok(outcome) => {
                    run.payload = Some(outcome.payload);
                    Ok(WorkflowState::Capturing)
                }
                Err(err)
                    if err.code == ErrorCode::MaxAttemptsReached
                        && message.fallback_content.is_some()
                        && !run.used_fallback =>
                {
                    info!("primary response timed out, submitting fallback");
                    Ok(WorkflowState::FallbackInjecting)
                }
                Err(err) => Err(err),
            },
            WorkflowState::FallbackInjecting => {
                run.used_fallback = true;
                let fallback = message.fallback_content.as_deref().unwrap_or_default();
                if fallback.trim().is_empty() {
                    return Err(self
                        .reporter
                        .raise(
                            self.surface.as_ref(),
                            "fallback",
                            ErrorCode::FallbackFailed,
                            "fallback content is empty",
                            None,
                        )
                        .await);
                }
                self.inject(sim, fallback, flags).await?;
                Ok(WorkflowState::FallbackSubmitting)
            }
            WorkflowState::FallbackSubmitting => {
                self.submit(sim, flags).await?;
                Ok(WorkflowState::Capturing)
            }
            WorkflowState::Capturing => {
                let payload = match run.payload.take() {
                    Some(payload) => payload,
                    None => sim.poll(self.surface.as_ref()).await?.payload,
                };
                if payload.trim().is_empty() {
                    return Err(self
                        .reporter
                        .raise(
                            self.surface.as_ref(),
                            "capture",
                            ErrorCode::CaptureFailed,
                            "captured payload is empty",
                            None,
                        )
                        .await);
                }
                run.payload = Some(payload);
                Ok(WorkflowState::Completed)
            }
            WorkflowState::Completed | WorkflowState::Failed => Ok(state),
        }
    }

    /// Read-only precondition gate; must not touch the surface's state.
    async fn verify(&self, message: &WorkflowMessage) -> SimResult<()> {
        if let Err(err) = self.config.validate() {
            return Err(SimError::bare(
                "verify",
                ErrorCode::InvalidConfig,
                format!("{err:#}"),
            ));
        }
        if message.content.trim().is_empty() {
            return Err(self
                .reporter
                .raise(
                    self.surface.as_ref(),
                    "verify",
                    ErrorCode::InvalidMessage,
                    "message content is empty",
                    None,
                )
                .await);
        }
        for role in ElementRole::MANDATORY {
            if role == ElementRole::NewSession && message.mode_flags.skip_reset {
                continue;
            }
            self.require(role).await?;
        }
        Ok(())
    }

    async fn require(&self, role: ElementRole) -> SimResult<Element> {
        match self.surface.locate(role).await {
            Some(el) => Ok(el),
            None => Err(self
                .reporter
                .raise(
                    self.surface.as_ref(),
                    "locate",
                    ErrorCode::missing(role),
                    format!("{role} control not found"),
                    None,
                )
                .await),
        }
    }

    async fn reset_session(&self, sim: &mut Simulator) -> SimResult<()> {
        let surface = self.surface.as_ref();
        let new_session = self.require(ElementRole::NewSession).await?;
        sim.move_to(surface, &new_session).await?;
        sim.click(surface, &new_session, ClickOptions::default())
            .await?;

        let input = self.require(ElementRole::Input).await?;
        let leftover = match surface.read_value(&input).await {
            Ok(value) => value,
            Err(err) => {
                return Err(self
                    .reporter
                    .raise(
                        surface,
                        "reset",
                        ErrorCode::ResetFailed,
                        format!("input unreadable after reset: {err:#}"),
                        Some(&input.selector),
                    )
                    .await)
            }
        };
        if !leftover.is_empty() {
            return Err(self
                .reporter
                .raise(
                    surface,
                    "reset",
                    ErrorCode::ResetFailed,
                    format!("input still holds {} chars after reset", leftover.chars().count()),
                    Some(&input.selector),
                )
                .await);
        }
        Ok(())
    }

    async fn inject(&self, sim: &mut Simulator, content: &str, flags: ModeFlags) -> SimResult<()> {
        let surface = self.surface.as_ref();
        let input = self.require(ElementRole::Input).await?;
        sim.move_to(surface, &input).await?;
        sim.click(surface, &input, ClickOptions::default()).await?;

        let bulk = flags.force_bulk || content.chars().count() > sim.config().keystroke.bulk_threshold;
        if bulk {
            let strategy = sim.commit_text(surface, &input, content).await?;
            info!(?strategy, "payload committed in bulk");
        } else {
            sim.select_existing(surface, &input).await?;
            let report = sim.type_text(surface, &input, content).await?;
            info!(chars = report.chars, typos = report.typos, "payload typed");
        }

        let value = match surface.read_value(&input).await {
            Ok(value) => value,
            Err(err) => {
                return Err(self
                    .reporter
                    .raise(
                        surface,
                        "inject",
                        ErrorCode::InjectionFailed,
                        format!("could not read back input: {err:#}"),
                        Some(&input.selector),
                    )
                    .await)
            }
        };
        if value != content {
            return Err(self
                .reporter
                .raise(
                    surface,
                    "inject",
                    ErrorCode::InjectionFailed,
                    format!(
                        "input holds {} chars, expected {}",
                        value.chars().count(),
                        content.chars().count()
                    ),
                    Some(&input.selector),
                )
                .await);
        }
        Ok(())
    }

    async fn submit(&self, sim: &mut Simulator, flags: ModeFlags) -> SimResult<()> {
        let surface = self.surface.as_ref();
        let submit = self.require(ElementRole::Submit).await?;
        sim.move_to(surface, &submit).await?;
        if flags.think_before_submit {
            sim.idle(surface).await?;
        }
        sim.click(surface, &submit, ClickOptions::default()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RecordingObserver, ResponseScript, SimSurface};

    fn config() -> SimulationConfig {
        let mut cfg = SimulationConfig {
            seed: Some(31),
            logging_enabled: false,
            ..Default::default()
        };
        cfg.typo.error_rate = 0.0;
        cfg.polling.max_attempts = 4;
        cfg.polling.interval_ms = 200;
        cfg
    }

    #[tokio::test(start_paused = true)]
    async fn state_events_mirror_the_result_trail() {
        let surface = Arc::new(SimSurface::new().respond_with(ResponseScript::ready_on(2, "ok")));
        let recorder = Arc::new(RecordingObserver::default());
        let orch = Orchestrator::new(surface, config()).with_observer(recorder.clone());

        let result = orch.run(WorkflowMessage::new("hi")).await;
        assert!(result.success, "{result:?}");
        assert_eq!(recorder.states(), result.states);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_fails_before_touching_the_surface() {
        let surface = Arc::new(SimSurface::new());
        let mut cfg = config();
        cfg.keystroke.min_ms = 900;
        cfg.keystroke.max_ms = 1;
        let orch = Orchestrator::new(surface.clone(), cfg);

        let result = orch.run(WorkflowMessage::new("hi")).await;
        assert_eq!(result.error_code, Some(ErrorCode::InvalidConfig));
        assert!(surface.pointer_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_response_never_counts_as_ready() {
        let surface = Arc::new(SimSurface::new().respond_with(ResponseScript::ready_on(1, "  ")));
        let orch = Orchestrator::new(surface.clone(), config());
        let result = orch.run(WorkflowMessage::new("hi")).await;
        assert_eq!(result.error_code, Some(ErrorCode::MaxAttemptsReached));
        assert_eq!(result.poll_samples, 4);
        assert_eq!(surface.samples(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_reset_leaves_session_alone() {
        let surface = Arc::new(
            SimSurface::new()
                .without(ElementRole::NewSession)
                .respond_with(ResponseScript::ready_on(1, "done")),
        );
        let orch = Orchestrator::new(surface.clone(), config());
        let message = WorkflowMessage::new("hi").with_mode_flags(ModeFlags {
            skip_reset: true,
            ..ModeFlags::default()
        });

        let result = orch.run(message).await;
        assert!(result.success, "{result:?}");
        assert_eq!(surface.sessions(), 0);
    }
}
