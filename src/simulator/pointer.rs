use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use tracing::trace;

use super::Simulator;
use crate::config::PointerConfig;
use crate::error::SimResult;
use crate::model::{Point, PointerEvent, Target};
use crate::surface::{DelayKind, Surface};

const MIN_STEPS: usize = 5;
const MAX_STEPS: usize = 100;
const PX_PER_STEP: f64 = 10.0;

// Detour offsets are capped so long moves don't swing across the screen.
const DETOUR_LATERAL_FRACTION: f64 = 0.3;
const DETOUR_LATERAL_CAP_PX: f64 = 150.0;

/// One emitted position along a segment and the wait owed after it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathStep {
    pub at: Point,
    pub t: f64,
    /// Zero for the final step of a segment.
    pub delay_ms: u64,
}

/// `clamp(round(distance / 10), 5, 100)`.
pub fn base_step_count(distance: f64) -> usize {
    let raw = (distance.max(0.0) / PX_PER_STEP).round();
    (raw as usize).clamp(MIN_STEPS, MAX_STEPS)
}

/// Base step count scaled by a per-move random factor (normally 0.8..1.2).
pub fn scaled_step_count(distance: f64, factor: f64) -> usize {
    let scaled = (base_step_count(distance) as f64 * factor).round();
    (scaled as usize).max(1)
}

fn perpendicular(start: Point, end: Point) -> (f64, f64) {
    let distance = start.distance_to(end);
    if distance <= f64::EPSILON {
        return (0.0, 0.0);
    }
    (-(end.y - start.y) / distance, (end.x - start.x) / distance)
}

fn control_points(
    start: Point,
    end: Point,
    turbulence: f64,
    rng: &mut impl Rng,
) -> (Point, Point) {
    let distance = start.distance_to(end);
    let (nx, ny) = perpendicular(start, end);
    let mut control = |lo: f64, hi: f64| {
        let along = start.lerp(end, rng.gen_range(lo..hi));
        let off = turbulence * distance * rng.gen_range(-1.0..=1.0);
        along.offset(nx * off, ny * off)
    };
    let c1 = control(0.2, 0.4);
    let c2 = control(0.6, 0.8);
    (c1, c2)
}

fn cubic_bezier(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
    let u = 1.0 - t;
    let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
    Point::new(
        a * p0.x + b * p1.x + c * p2.x + d * p3.x,
        a * p0.y + b * p1.y + c * p2.y + d * p3.y,
    )
}

/// 0 at both ends, 1 at the midpoint.
fn dome(t: f64) -> f64 {
    4.0 * t * (1.0 - t)
}

/// Slow at the ends, fastest mid-path, then spread by `speed_variance`.
fn step_delay_ms(t: f64, cfg: &PointerConfig, rng: &mut impl Rng) -> u64 {
    let lo = cfg.step_delay_min_ms as f64;
    let hi = cfg.step_delay_max_ms as f64;
    let speed = 1.0 - (2.0 * t - 1.0).powi(2);
    let base = lo + (hi - lo) * (1.0 - speed);
    let v = cfg.speed_variance;
    let factor = if v > 0.0 {
        rng.gen_range((1.0 - v)..=(1.0 + v))
    } else {
        1.0
    };
    (base * factor).max(0.0).round() as u64
}

/// Positions and per-step delays for one straight-or-curved segment.
///
/// The final position is always exactly `end`.
pub fn plan_segment(
    start: Point,
    end: Point,
    cfg: &PointerConfig,
    rng: &mut impl Rng,
) -> Vec<PathStep> {
    let distance = start.distance_to(end);
    let steps = scaled_step_count(distance, rng.gen_range(0.8..=1.2));
    let controls = if cfg.use_curve {
        Some(control_points(start, end, cfg.turbulence, rng))
    } else {
        None
    };
    let noise = if cfg.micro_jitter && cfg.micro_jitter_px > 0.0 {
        Normal::new(0.0, cfg.micro_jitter_px).ok()
    } else {
        None
    };

    let mut out = Vec::with_capacity(steps);
    for i in 1..=steps {
        let t = i as f64 / steps as f64;
        let at = if i == steps {
            end
        } else {
            let base = match controls {
                Some((c1, c2)) => cubic_bezier(start, c1, c2, end, t),
                None => start.lerp(end, t),
            };
            match &noise {
                Some(n) => {
                    let d = dome(t);
                    base.offset(n.sample(rng) * d, n.sample(rng) * d)
                }
                None => base,
            }
        };
        let delay_ms = if i == steps {
            0
        } else {
            step_delay_ms(t, cfg, rng)
        };
        out.push(PathStep { at, t, delay_ms });
    }
    out
}

/// 0-2 intermediate points off to the side of the direct line.
fn detour_waypoints(
    start: Point,
    end: Point,
    cfg: &PointerConfig,
    rng: &mut impl Rng,
) -> Vec<Point> {
    if cfg.indirect_path <= 0.0 || !rng.gen_bool(cfg.indirect_path) {
        return Vec::new();
    }
    let distance = start.distance_to(end);
    let lateral = (distance * DETOUR_LATERAL_FRACTION).min(DETOUR_LATERAL_CAP_PX);
    let (nx, ny) = perpendicular(start, end);

    let count = rng.gen_range(1..=2);
    let mut fractions: Vec<f64> = (0..count).map(|_| rng.gen_range(0.2..0.8)).collect();
    fractions.sort_by(f64::total_cmp);

    fractions
        .into_iter()
        .map(|f| {
            let off = rng.gen_range(-lateral..=lateral);
            start.lerp(end, f).offset(nx * off, ny * off)
        })
        .collect()
}

/// Whole trajectory for one move: target jitter, optional detours, then one
/// segment per leg. A zero-length move is a single step on the target.
pub fn plan_move(
    start: Point,
    target: Point,
    cfg: &PointerConfig,
    rng: &mut impl Rng,
) -> Vec<PathStep> {
    let mut end = target;
    if cfg.add_jitter && cfg.jitter_px > 0.0 {
        let j = cfg.jitter_px;
        end = end.offset(rng.gen_range(-j..=j), rng.gen_range(-j..=j));
    }

    if start.distance_to(end) <= f64::EPSILON {
        return vec![PathStep {
            at: end,
            t: 1.0,
            delay_ms: 0,
        }];
    }

    let waypoints = detour_waypoints(start, end, cfg, rng);
    let mut out = Vec::new();
    let mut from = start;
    for leg_end in waypoints.into_iter().chain(std::iter::once(end)) {
        out.extend(plan_segment(from, leg_end, cfg, rng));
        from = leg_end;
    }
    out
}

impl Simulator {
    fn resolve_target(&mut self, target: Target) -> Point {
        match target {
            Target::Point(p) => p,
            Target::Region(rect) => rect.at_fraction(
                self.rng.gen_range(0.2..=0.8),
                self.rng.gen_range(0.2..=0.8),
            ),
        }
    }

    /// Move the pointer to `target` using the run's pointer config.
    /// Returns the number of position events emitted.
    pub async fn move_to(
        &mut self,
        surface: &dyn Surface,
        target: impl Into<Target>,
    ) -> SimResult<usize> {
        let cfg = self.config.pointer.clone();
        self.move_to_with(surface, target, &cfg).await
    }

    pub async fn move_to_with(
        &mut self,
        surface: &dyn Surface,
        target: impl Into<Target>,
        cfg: &PointerConfig,
    ) -> SimResult<usize> {
        self.checked("move", cfg.validate())?;
        let start = self.state.last_position;
        let end = self.resolve_target(target.into());
        let steps = plan_move(start, end, cfg, &mut self.rng);
        self.follow(surface, &steps).await?;
        trace!(emitted = steps.len(), x = end.x, y = end.y, "pointer move complete");
        Ok(steps.len())
    }

    /// Single segment from the current position, no target jitter or detours.
    pub(super) async fn traverse(
        &mut self,
        surface: &dyn Surface,
        end: Point,
        cfg: &PointerConfig,
    ) -> SimResult<usize> {
        let steps = plan_segment(self.state.last_position, end, cfg, &mut self.rng);
        self.follow(surface, &steps).await?;
        Ok(steps.len())
    }

    async fn follow(&mut self, surface: &dyn Surface, steps: &[PathStep]) -> SimResult<()> {
        let mut prev = self.state.last_position;
        for step in steps {
            self.dispatch_pointer(surface, PointerEvent::Move { at: step.at })
                .await?;
            if step.delay_ms > 0 {
                self.state.speed = prev.distance_to(step.at) / step.delay_ms as f64;
                self.pause(step.delay_ms, DelayKind::PointerStep).await?;
            }
            prev = step.at;
        }
        Ok(())
    }
}
