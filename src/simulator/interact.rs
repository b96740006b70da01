use rand::Rng;

use super::Simulator;
use crate::config::{ClickConfig, ClickDistribution, PointerConfig};
use crate::error::SimResult;
use crate::model::{Element, MouseButton, Point, PointerEvent, Rect};
use crate::surface::{DelayKind, Surface};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickOptions {
    pub double_click: bool,
    pub right_click: bool,
    /// Number of full press/release sequences; 0 is treated as 1.
    pub click_count: u32,
    /// Overrides `click.distribution` for this call.
    pub distribution: Option<ClickDistribution>,
}

impl ClickOptions {
    pub fn double() -> Self {
        Self {
            double_click: true,
            ..Self::default()
        }
    }

    pub fn right() -> Self {
        Self {
            right_click: true,
            ..Self::default()
        }
    }
}

/// Where inside `bounds` the pointer lands.
pub fn impact_point(bounds: &Rect, distribution: ClickDistribution, rng: &mut impl Rng) -> Point {
    match distribution {
        ClickDistribution::Center => bounds.center(),
        ClickDistribution::Uniform => bounds.at_fraction(rng.gen::<f64>(), rng.gen::<f64>()),
        ClickDistribution::Natural => {
            let fx = (rng.gen::<f64>() + rng.gen::<f64>()) / 2.0;
            let fy = (rng.gen::<f64>() + rng.gen::<f64>()) / 2.0;
            bounds.at_fraction(fx, fy)
        }
    }
}

impl Simulator {
    pub async fn click(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
        options: ClickOptions,
    ) -> SimResult<Point> {
        let cfg = self.config.click.clone();
        self.click_with(surface, element, options, &cfg).await
    }

    /// Returns the impact point of the last click.
    pub async fn click_with(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
        options: ClickOptions,
        cfg: &ClickConfig,
    ) -> SimResult<Point> {
        self.checked("click", cfg.validate())?;
        if cfg.think_delay {
            self.think().await?;
        }

        let distribution = options.distribution.unwrap_or(cfg.distribution);
        let button = if options.right_click {
            MouseButton::Right
        } else {
            MouseButton::Left
        };

        let mut at = self.state.last_position;
        for i in 0..options.click_count.max(1) {
            if i > 0 {
                let gap = self.sample_ms(cfg.inter_click_min_ms, cfg.inter_click_max_ms);
                self.pause(gap, DelayKind::Click).await?;
            }
            at = impact_point(&element.bounds, distribution, &mut self.rng);
            self.approach(surface, at).await?;
            self.press_release(surface, at, button, cfg).await?;

            if options.right_click {
                self.dispatch_pointer(surface, PointerEvent::ContextMenu { at })
                    .await?;
            } else if options.double_click {
                let gap = self.sample_ms(cfg.inter_click_min_ms, cfg.inter_click_max_ms);
                self.pause(gap, DelayKind::Click).await?;
                self.press_release(surface, at, button, cfg).await?;
                self.dispatch_pointer(surface, PointerEvent::DoubleClick { at })
                    .await?;
            }
        }

        let settle = self.sample_ms(cfg.settle_min_ms, cfg.settle_max_ms);
        self.pause(settle, DelayKind::Settle).await?;
        Ok(at)
    }

    /// Short final move so every press lands where the pointer already is.
    async fn approach(&mut self, surface: &dyn Surface, at: Point) -> SimResult<()> {
        if self.state.last_position.distance_to(at) <= f64::EPSILON {
            return Ok(());
        }
        let cfg = PointerConfig {
            add_jitter: false,
            indirect_path: 0.0,
            ..self.config.pointer.clone()
        };
        self.checked("click", cfg.validate())?;
        self.traverse(surface, at, &cfg).await?;
        Ok(())
    }

    async fn press_release(
        &mut self,
        surface: &dyn Surface,
        at: Point,
        button: MouseButton,
        cfg: &ClickConfig,
    ) -> SimResult<()> {
        self.dispatch_pointer(surface, PointerEvent::Down { at, button })
            .await?;
        let hold = self.sample_ms(cfg.hold_min_ms, cfg.hold_max_ms);
        self.pause(hold, DelayKind::Click).await?;
        self.dispatch_pointer(surface, PointerEvent::Up { at, button })
            .await?;
        self.dispatch_pointer(surface, PointerEvent::Click { at, button })
            .await
    }

    /// Rest the pointer over `element` for `duration_ms`.
    pub async fn hover(
        &mut self,
        surface: &dyn Surface,
        element: &Element,
        duration_ms: u64,
    ) -> SimResult<Point> {
        let at = impact_point(&element.bounds, ClickDistribution::Natural, &mut self.rng);
        self.approach(surface, at).await?;
        self.dispatch_pointer(surface, PointerEvent::Over { at })
            .await?;
        self.pause(duration_ms, DelayKind::Think).await?;
        Ok(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::model::ElementRole;
    use crate::sim::{FloorRng, SimSurface};
    use crate::timing::Lcg;

    fn sim() -> Simulator {
        Simulator::new(SimulationConfig {
            seed: Some(12),
            logging_enabled: false,
            ..Default::default()
        })
    }

    #[test]
    fn impact_points_stay_inside_bounds() {
        let bounds = Rect::new(10.0, 20.0, 200.0, 40.0);
        let mut rng = Lcg::new(1);
        assert_eq!(
            impact_point(&bounds, ClickDistribution::Center, &mut rng),
            Point::new(110.0, 40.0)
        );
        for dist in [ClickDistribution::Uniform, ClickDistribution::Natural] {
            for _ in 0..500 {
                assert!(bounds.contains(impact_point(&bounds, dist, &mut rng)));
            }
        }
    }

    #[test]
    fn natural_distribution_is_centre_biased() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let centre = bounds.center();
        let mean_offset = |dist| {
            let mut rng = Lcg::new(99);
            (0..4000)
                .map(|_| impact_point(&bounds, dist, &mut rng).distance_to(centre))
                .sum::<f64>()
                / 4000.0
        };
        assert!(mean_offset(ClickDistribution::Natural) < mean_offset(ClickDistribution::Uniform));
    }

    #[tokio::test(start_paused = true)]
    async fn right_click_ends_with_context_menu() {
        let surface = SimSurface::new();
        let el = surface.element(ElementRole::Submit).unwrap();
        let mut sim = sim();

        let at = sim.click(&surface, &el, ClickOptions::right()).await.unwrap();
        let events: Vec<PointerEvent> = surface
            .pointer_events()
            .into_iter()
            .filter(|e| !matches!(e, PointerEvent::Move { .. }))
            .collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], PointerEvent::Down { button: MouseButton::Right, .. }));
        assert_eq!(events[3], PointerEvent::ContextMenu { at });
        assert_eq!(sim.state().last_position, at);
    }

    #[tokio::test(start_paused = true)]
    async fn double_click_emits_two_clicks_then_dblclick() {
        let surface = SimSurface::new();
        let el = surface.element(ElementRole::NewSession).unwrap();
        let mut sim = sim();

        sim.click(&surface, &el, ClickOptions::double()).await.unwrap();
        let events = surface.pointer_events();
        let clicks = events
            .iter()
            .filter(|e| matches!(e, PointerEvent::Click { .. }))
            .count();
        assert_eq!(clicks, 2);
        assert!(matches!(events.last(), Some(PointerEvent::DoubleClick { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn click_count_repeats_at_fresh_points() {
        let surface = SimSurface::new();
        let el = surface.element(ElementRole::Input).unwrap();
        let mut sim = sim();

        let opts = ClickOptions {
            click_count: 3,
            distribution: Some(ClickDistribution::Uniform),
            ..ClickOptions::default()
        };
        sim.click(&surface, &el, opts).await.unwrap();
        let downs: Vec<Point> = surface
            .pointer_events()
            .iter()
            .filter_map(|e| match e {
                PointerEvent::Down { at, .. } => Some(*at),
                _ => None,
            })
            .collect();
        assert_eq!(downs.len(), 3);
        assert_ne!(downs[0], downs[1]);
        assert_ne!(downs[1], downs[2]);
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_travels_to_every_press() {
        let surface = SimSurface::new();
        let el = surface.element(ElementRole::Input).unwrap();
        let mut sim = sim().with_start_position(el.bounds.center());

        let opts = ClickOptions {
            click_count: 3,
            distribution: Some(ClickDistribution::Uniform),
            ..ClickOptions::default()
        };
        sim.click(&surface, &el, opts).await.unwrap();
        sim.click(&surface, &el, ClickOptions::double()).await.unwrap();

        let events = surface.pointer_events();
        let mut downs = 0;
        for pair in events.windows(2) {
            if let PointerEvent::Down { at, .. } = pair[1] {
                assert_eq!(pair[0].position(), at);
                downs += 1;
            }
        }
        assert_eq!(downs, 5);
        assert!(matches!(events[0], PointerEvent::Move { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn hover_dispatches_over_inside_the_element() {
        let surface = SimSurface::new();
        let el = surface.element(ElementRole::Submit).unwrap();
        let mut sim = sim();

        let at = sim.hover(&surface, &el, 400).await.unwrap();
        assert!(el.bounds.contains(at));
        let events = surface.pointer_events();
        assert_eq!(events.last(), Some(&PointerEvent::Over { at }));
        assert_eq!(events[events.len() - 2], PointerEvent::Move { at });
    }

    #[tokio::test(start_paused = true)]
    async fn floor_rng_hovers_the_top_left_corner() {
        let mut cfg = SimulationConfig {
            logging_enabled: false,
            ..Default::default()
        };
        cfg.pointer.micro_jitter = false;
        let surface = SimSurface::new();
        let el = surface.element(ElementRole::Submit).unwrap();
        let mut sim = Simulator::new(cfg).with_rng(FloorRng);
        assert_eq!(sim.state().seed, None);

        let corner = Point::new(el.bounds.x, el.bounds.y);
        assert_eq!(
            impact_point(&el.bounds, ClickDistribution::Natural, &mut FloorRng),
            corner
        );
        assert_eq!(sim.hover(&surface, &el, 100).await.unwrap(), corner);
        assert_eq!(sim.state().last_position, corner);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_click_section_is_rejected() {
        let surface = SimSurface::new();
        let el = surface.element(ElementRole::Submit).unwrap();
        let mut sim = sim();
        let cfg = ClickConfig {
            hold_min_ms: 90,
            hold_max_ms: 10,
            ..ClickConfig::default()
        };

        let err = sim
            .click_with(&surface, &el, ClickOptions::default(), &cfg)
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidConfig);
        assert!(surface.pointer_events().is_empty());
    }
}
