use rand::Rng;
use tracing::debug;

use super::Simulator;
use crate::config::{KeystrokeConfig, TypoConfig};
use crate::error::{ErrorCode, SimResult};
use crate::keyboard::qwerty_adjacent_char;
use crate::model::{Element, Key, KeyEvent, KeyState};
use crate::surface::{DelayKind, Surface};

/// What happened while typing one string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeReport {
    /// Intended characters committed.
    pub chars: usize,
    /// Wrong-neighbour keys that were typed and then erased.
    pub typos: usize,
}

impl Simulator {
    /// Type `text` into `element` one key at a time using the run's config.
    pub async fn type_text(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
        text: &str,
    ) -> SimResult<TypeReport> {
        let keystroke = self.config.keystroke.clone();
        let typo = self.config.typo.clone();
        self.type_text_with(surface, element, text, &keystroke, &typo)
            .await
    }

    pub async fn type_text_with(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
        text: &str,
        keystroke: &KeystrokeConfig,
        typo: &TypoConfig,
    ) -> SimResult<TypeReport> {
        self.checked("type", keystroke.validate())?;
        self.checked("type", typo.validate())?;
        self.begin_typing(surface, element).await?;
        let result = self
            .type_chars(surface, element, text, keystroke, typo)
            .await;
        self.state.typing_active = false;
        result
    }

    /// Claim the single typing session, or fail if one is already open.
    pub(super) async fn begin_typing(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
    ) -> SimResult<()> {
        if self.state.typing_active {
            return Err(self
                .reporter
                .raise(
                    surface,
                    "type",
                    ErrorCode::TypingSessionActive,
                    "another typing session is still active",
                    Some(&element.selector),
                )
                .await);
        }
        self.state.typing_active = true;
        Ok(())
    }

    async fn type_chars(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
        text: &str,
        keystroke: &KeystrokeConfig,
        typo: &TypoConfig,
    ) -> SimResult<TypeReport> {
        let mut report = TypeReport::default();

        for c in text.chars() {
            if typo.error_rate > 0.0 && self.rng.gen_bool(typo.error_rate) {
                if let Some(wrong) = qwerty_adjacent_char(c, &mut self.rng) {
                    debug!(intended = %c.escape_debug(), typed = %wrong.escape_debug(), "typo");
                    self.stroke(surface, element, Key::Char(wrong), keystroke)
                        .await?;
                    self.pause(typo.correction_delay_ms, DelayKind::Typo).await?;
                    self.stroke(surface, element, Key::Backspace, keystroke)
                        .await?;
                    let retype =
                        self.sample_ms(typo.retype_delay_min_ms, typo.retype_delay_max_ms);
                    self.pause(retype, DelayKind::Typo).await?;
                    report.typos += 1;
                }
            }

            self.stroke(surface, element, Key::Char(c), keystroke)
                .await?;
            self.state.last_char = Some(c);
            report.chars += 1;

            let delay = self.sample_ms(keystroke.min_ms, keystroke.max_ms)
                + self.timing.boundary_pause(c);
            self.pause(delay, DelayKind::Keystroke).await?;
        }

        Ok(report)
    }

    /// Press, hold, release, then tell the surface its value changed.
    async fn stroke(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
        key: Key,
        keystroke: &KeystrokeConfig,
    ) -> SimResult<()> {
        self.dispatch_key(
            surface,
            element,
            KeyEvent {
                key,
                state: KeyState::Pressed,
            },
        )
        .await?;
        let hold = self.sample_ms(keystroke.hold_min_ms, keystroke.hold_max_ms);
        self.pause(hold, DelayKind::Hold).await?;
        self.dispatch_key(
            surface,
            element,
            KeyEvent {
                key,
                state: KeyState::Released,
            },
        )
        .await?;
        self.notify_input(surface, element).await
    }
}
