use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub keystroke: KeystrokeConfig,
    pub pause: PauseConfig,
    pub typo: TypoConfig,
    pub commit: CommitConfig,
    pub pointer: PointerConfig,
    pub click: ClickConfig,
    pub timing: InteractionTiming,
    pub polling: PollingConfig,
    /// Fixed seed for the run's random sequence; `None` draws one from entropy.
    pub seed: Option<u32>,
    pub logging_enabled: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            keystroke: KeystrokeConfig::default(),
            pause: PauseConfig::default(),
            typo: TypoConfig::default(),
            commit: CommitConfig::default(),
            pointer: PointerConfig::default(),
            click: ClickConfig::default(),
            timing: InteractionTiming::default(),
            polling: PollingConfig::default(),
            seed: None,
            logging_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystrokeConfig {
    pub min_ms: u64,
    pub max_ms: u64,
    pub hold_min_ms: u64,
    pub hold_max_ms: u64,
    /// Payloads longer than this (in chars) go through the bulk commit path.
    pub bulk_threshold: usize,
}

impl Default for KeystrokeConfig {
    fn default() -> Self {
        Self {
            min_ms: 45,
            max_ms: 160,
            hold_min_ms: 18,
            hold_max_ms: 70,
            bulk_threshold: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PauseConfig {
    pub word_ms: u64,
    pub sentence_ms: u64,
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            word_ms: 90,
            sentence_ms: 320,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypoConfig {
    pub error_rate: f64,
    pub correction_delay_ms: u64,
    pub retype_delay_min_ms: u64,
    pub retype_delay_max_ms: u64,
}

impl Default for TypoConfig {
    fn default() -> Self {
        Self {
            error_rate: 0.03,
            correction_delay_ms: 260,
            retype_delay_min_ms: 40,
            retype_delay_max_ms: 140,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Chance of one "noticed-and-recovered" pause per bulk commit.
    pub error_pause_probability: f64,
    pub error_pause_min_ms: u64,
    pub error_pause_max_ms: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            error_pause_probability: 0.15,
            error_pause_min_ms: 400,
            error_pause_max_ms: 1200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    pub use_curve: bool,
    /// Control-point offset as a fraction of the travel distance.
    pub turbulence: f64,
    /// Relative spread applied to every per-step delay.
    pub speed_variance: f64,
    /// Land within `jitter_px` of the requested point instead of on it.
    pub add_jitter: bool,
    pub jitter_px: f64,
    /// Probability of routing through 1-2 detour waypoints.
    pub indirect_path: f64,
    pub micro_jitter: bool,
    pub micro_jitter_px: f64,
    pub step_delay_min_ms: u64,
    pub step_delay_max_ms: u64,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            use_curve: true,
            turbulence: 0.18,
            speed_variance: 0.25,
            add_jitter: true,
            jitter_px: 3.0,
            indirect_path: 0.2,
            micro_jitter: true,
            micro_jitter_px: 1.5,
            step_delay_min_ms: 4,
            step_delay_max_ms: 18,
        }
    }
}

impl PointerConfig {
    /// Straight, noiseless motion; useful when the exact landing point matters.
    pub fn direct() -> Self {
        Self {
            use_curve: false,
            add_jitter: false,
            indirect_path: 0.0,
            micro_jitter: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickDistribution {
    Center,
    Uniform,
    /// Mean of two uniform draws per axis (triangular, centre-biased).
    #[default]
    Natural,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub hold_min_ms: u64,
    pub hold_max_ms: u64,
    pub inter_click_min_ms: u64,
    pub inter_click_max_ms: u64,
    pub settle_min_ms: u64,
    pub settle_max_ms: u64,
    pub think_delay: bool,
    pub distribution: ClickDistribution,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            hold_min_ms: 45,
            hold_max_ms: 130,
            inter_click_min_ms: 70,
            inter_click_max_ms: 160,
            settle_min_ms: 120,
            settle_max_ms: 380,
            think_delay: true,
            distribution: ClickDistribution::Natural,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionTiming {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub idle_timeout_ms: u64,
    pub idle_probability: f64,
    pub idle_jitter_interval_ms: u64,
}

impl Default for InteractionTiming {
    fn default() -> Self {
        Self {
            min_delay_ms: 150,
            max_delay_ms: 650,
            idle_timeout_ms: 2500,
            idle_probability: 0.3,
            idle_jitter_interval_ms: 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub jitter_ratio: f64,
    pub read_ms_per_char: u64,
    pub read_cap_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            interval_ms: 1500,
            jitter_ratio: 0.2,
            read_ms_per_char: 4,
            read_cap_ms: 6000,
        }
    }
}

fn ensure_range(min: u64, max: u64, name: &str) -> Result<()> {
    ensure!(min <= max, "{name}: min must be <= max ({min} > {max})");
    Ok(())
}

fn ensure_probability(p: f64, name: &str) -> Result<()> {
    ensure!(
        p.is_finite() && (0.0..=1.0).contains(&p),
        "{name} must be between 0.0 and 1.0"
    );
    Ok(())
}

fn ensure_non_negative(v: f64, name: &str) -> Result<()> {
    ensure!(v.is_finite() && v >= 0.0, "{name} must be finite and >= 0");
    Ok(())
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: SimulationConfig =
            serde_json::from_str(json).context("failed to parse simulation config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.keystroke.validate()?;
        self.typo.validate()?;
        self.commit.validate()?;
        self.pointer.validate()?;
        self.click.validate()?;
        self.timing.validate()?;

        ensure!(
            self.polling.max_attempts >= 1,
            "polling.max_attempts must be >= 1"
        );
        ensure_probability(self.polling.jitter_ratio, "polling.jitter_ratio")?;

        Ok(())
    }
}

impl KeystrokeConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_range(self.min_ms, self.max_ms, "keystroke")?;
        ensure_range(self.hold_min_ms, self.hold_max_ms, "keystroke.hold")
    }
}

impl TypoConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_probability(self.error_rate, "typo.error_rate")?;
        ensure_range(
            self.retype_delay_min_ms,
            self.retype_delay_max_ms,
            "typo.retype_delay",
        )
    }
}

impl CommitConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_probability(
            self.error_pause_probability,
            "commit.error_pause_probability",
        )?;
        ensure_range(
            self.error_pause_min_ms,
            self.error_pause_max_ms,
            "commit.error_pause",
        )
    }
}

impl PointerConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative(self.turbulence, "pointer.turbulence")?;
        ensure_probability(self.speed_variance, "pointer.speed_variance")?;
        ensure_non_negative(self.jitter_px, "pointer.jitter_px")?;
        ensure_probability(self.indirect_path, "pointer.indirect_path")?;
        ensure_non_negative(self.micro_jitter_px, "pointer.micro_jitter_px")?;
        ensure_range(
            self.step_delay_min_ms,
            self.step_delay_max_ms,
            "pointer.step_delay",
        )
    }
}

impl ClickConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_range(self.hold_min_ms, self.hold_max_ms, "click.hold")?;
        ensure_range(
            self.inter_click_min_ms,
            self.inter_click_max_ms,
            "click.inter_click",
        )?;
        ensure_range(self.settle_min_ms, self.settle_max_ms, "click.settle")
    }
}

impl InteractionTiming {
    pub fn validate(&self) -> Result<()> {
        ensure_range(self.min_delay_ms, self.max_delay_ms, "timing.delay")?;
        ensure_probability(self.idle_probability, "timing.idle_probability")?;
        ensure!(
            self.idle_jitter_interval_ms > 0,
            "timing.idle_jitter_interval_ms must be > 0"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimulationConfig::default()
            .validate()
            .expect("default config should validate");
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let cfg = SimulationConfig::from_json_str(
            r#"{ "typo": { "error_rate": 0.0 }, "polling": { "max_attempts": 5 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.typo.error_rate, 0.0);
        assert_eq!(cfg.typo.correction_delay_ms, 260);
        assert_eq!(cfg.polling.max_attempts, 5);
        assert_eq!(cfg.polling.interval_ms, 1500);
        assert_eq!(cfg.keystroke, KeystrokeConfig::default());
    }

    #[test]
    fn rejects_inverted_ranges_and_bad_probabilities() {
        let mut cfg = SimulationConfig::default();
        cfg.keystroke.min_ms = 500;
        cfg.keystroke.max_ms = 10;
        assert!(cfg.validate().is_err());

        let mut cfg = SimulationConfig::default();
        cfg.typo.error_rate = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = SimulationConfig::default();
        cfg.polling.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sections_validate_on_their_own() {
        let pointer = PointerConfig {
            indirect_path: 1.2,
            ..PointerConfig::default()
        };
        assert!(pointer.validate().is_err());
        assert!(PointerConfig::direct().validate().is_ok());

        let timing = InteractionTiming {
            idle_probability: -0.1,
            ..InteractionTiming::default()
        };
        assert!(timing.validate().is_err());
    }

    #[test]
    fn click_distribution_uses_snake_case() {
        let cfg =
            SimulationConfig::from_json_str(r#"{ "click": { "distribution": "uniform" } }"#)
                .unwrap();
        assert_eq!(cfg.click.distribution, ClickDistribution::Uniform);
    }
}
