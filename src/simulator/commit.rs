use anyhow::{bail, Result};
use rand::Rng;
use tracing::{debug, warn};

use super::Simulator;
use crate::error::{ErrorCode, SimResult};
use crate::model::Element;
use crate::surface::{CommitStrategy, DelayKind, SimEvent, Surface};

impl Simulator {
    /// Apply `text` in one go, trying each [`CommitStrategy`] in order until
    /// reading the value back shows it took. Returns the strategy that stuck.
    pub async fn commit_text(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
        text: &str,
    ) -> SimResult<CommitStrategy> {
        self.checked("commit", self.config.commit.validate())?;
        self.begin_typing(surface, element).await?;
        let result = self.commit_strategies(surface, element, text).await;
        self.state.typing_active = false;
        result
    }

    /// Select whatever the element holds so the next write replaces it.
    pub async fn select_existing(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
    ) -> SimResult<()> {
        if let Err(err) = surface.select_all(element).await {
            return Err(self
                .reporter
                .raise(
                    surface,
                    "select_all",
                    ErrorCode::DispatchFailed,
                    format!("could not select existing content: {err:#}"),
                    Some(&element.selector),
                )
                .await);
        }
        Ok(())
    }

    async fn commit_strategies(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
        text: &str,
    ) -> SimResult<CommitStrategy> {
        self.select_existing(surface, element).await?;

        let commit = self.config.commit.clone();
        if commit.error_pause_probability > 0.0 && self.rng.gen_bool(commit.error_pause_probability)
        {
            let ms = self.sample_ms(commit.error_pause_min_ms, commit.error_pause_max_ms);
            debug!(ms, "recovery pause");
            self.pause(ms, DelayKind::Recovery).await?;
        }

        for strategy in CommitStrategy::ORDER {
            if strategy == CommitStrategy::RegionContent && !element.editable_region {
                continue;
            }

            let applied = match apply(surface, element, strategy, text).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(?strategy, "commit strategy failed: {err:#}");
                    false
                }
            };
            if applied {
                self.notify_input(surface, element).await?;
            }

            let confirmed = applied
                && surface
                    .read_value(element)
                    .await
                    .is_ok_and(|value| value == text);
            self.emit(&SimEvent::Commit {
                strategy,
                confirmed,
            });
            if confirmed {
                debug!(?strategy, chars = text.chars().count(), "value committed");
                return Ok(strategy);
            }

            // A half-applied write must not be appended to by the next attempt.
            self.select_existing(surface, element).await?;
        }

        Err(self
            .reporter
            .raise(
                surface,
                "commit",
                ErrorCode::ValueNotCommitted,
                "no commit strategy was confirmed by read-back",
                Some(&element.selector),
            )
            .await)
    }
}

async fn apply(
    surface: &dyn Surface,
    element: &Element,
    strategy: CommitStrategy,
    text: &str,
) -> Result<()> {
    match strategy {
        CommitStrategy::DirectAssign => surface.set_value(element, text).await,
        CommitStrategy::CommandInsert => surface.insert_text(element, text).await,
        CommitStrategy::ClipboardRoundTrip => clipboard_round_trip(surface, element, text).await,
        CommitStrategy::SyntheticInput => surface.dispatch_input(element, text).await,
        CommitStrategy::RegionContent => {
            if !element.editable_region {
                bail!("{} is not an editable region", element.selector);
            }
            surface.set_region_content(element, text).await
        }
    }
}

/// Paste `text` through the clipboard, then put back whatever was there.
async fn clipboard_round_trip(surface: &dyn Surface, element: &Element, text: &str) -> Result<()> {
    let previous = surface.read_clipboard().await?;
    surface.write_clipboard(text).await?;

    let pasted = surface.paste(element).await;

    let restore = previous.as_deref().unwrap_or("");
    if let Err(err) = surface.write_clipboard(restore).await {
        warn!("could not restore clipboard: {err:#}");
    }
    pasted
}
