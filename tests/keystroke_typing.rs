use std::sync::Arc;

use pretty_assertions::assert_eq;

use mimic::config::SimulationConfig;
use mimic::model::ElementRole;
use mimic::sim::{RecordingObserver, SimSurface};
use mimic::surface::DelayKind;
use mimic::Simulator;

const SAMPLES: &[&str] = &[
    "Hello world.",
    "The quick brown fox jumps over the lazy dog!",
    "Line one\nline two? Yes; 42 times, 'quoted' [x] = y/z.",
    "MiXeD CaSe and ümlauts",
    "",
];

fn config(error_rate: f64, seed: u32) -> SimulationConfig {
    let mut cfg = SimulationConfig {
        seed: Some(seed),
        logging_enabled: false,
        ..Default::default()
    };
    cfg.typo.error_rate = error_rate;
    cfg
}

async fn typed_value(text: &str, error_rate: f64, seed: u32) -> String {
    let surface = SimSurface::new();
    let input = surface
        .element(ElementRole::Input)
        .expect("default surface has an input");
    let mut sim = Simulator::new(config(error_rate, seed));
    sim.type_text(&surface, &input, text)
        .await
        .expect("typing should succeed");
    surface.value()
}

#[tokio::test(start_paused = true)]
async fn error_free_typing_commits_text_exactly() {
    for (i, text) in SAMPLES.iter().enumerate() {
        assert_eq!(typed_value(text, 0.0, i as u32).await, *text);
    }
}

#[tokio::test(start_paused = true)]
async fn every_typo_is_corrected_before_moving_on() {
    for seed in 0..5 {
        for text in SAMPLES {
            assert_eq!(typed_value(text, 1.0, seed).await, *text, "seed {seed}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn pauses_grow_after_word_and_sentence_boundaries() {
    let mut cfg = config(0.0, 1);
    cfg.keystroke.min_ms = 50;
    cfg.keystroke.max_ms = 50;
    cfg.pause.word_ms = 90;
    cfg.pause.sentence_ms = 320;

    let surface = SimSurface::new();
    let input = surface.element(ElementRole::Input).unwrap();
    let recorder = Arc::new(RecordingObserver::default());
    let mut sim = Simulator::new(cfg).with_observer(recorder.clone());

    sim.type_text(&surface, &input, "Hello world.")
        .await
        .expect("typing should succeed");
    assert_eq!(surface.value(), "Hello world.");

    let delays = recorder.delays(DelayKind::Keystroke);
    assert_eq!(delays.len(), 12);
    let after_o = delays[4];
    let after_space = delays[5];
    let after_period = delays[11];
    assert!(
        after_space > after_o,
        "space pause {after_space} should exceed plain {after_o}"
    );
    assert!(
        after_period > after_space,
        "period pause {after_period} should exceed space pause {after_space}"
    );
    assert_eq!((after_o, after_space, after_period), (50, 140, 370));
}

#[tokio::test(start_paused = true)]
async fn same_seed_types_the_same_way() {
    let run = |seed| async move {
        let surface = SimSurface::new();
        let input = surface.element(ElementRole::Input).unwrap();
        let mut sim = Simulator::new(config(0.3, seed));
        sim.type_text(&surface, &input, "reproducible typing")
            .await
            .unwrap();
        surface.key_events()
    };
    assert_eq!(run(77).await, run(77).await);
}
