use std::sync::Arc;

use pretty_assertions::assert_eq;

use mimic::config::SimulationConfig;
use mimic::model::{ElementRole, WorkflowMessage};
use mimic::sim::{ResponseScript, SimSurface};
use mimic::trace::TraceObserver;
use mimic::{Orchestrator, Simulator};

fn config(error_rate: f64) -> SimulationConfig {
    let mut cfg = SimulationConfig {
        seed: Some(77),
        logging_enabled: false,
        ..Default::default()
    };
    cfg.typo.error_rate = error_rate;
    cfg.polling.max_attempts = 3;
    cfg.polling.interval_ms = 50;
    cfg
}

#[tokio::test(start_paused = true)]
async fn clean_typing_logs_one_line_per_message() {
    let surface = Arc::new(SimSurface::new().respond_with(ResponseScript::ready_on(1, "ok")));
    let trace = Arc::new(TraceObserver::new());
    let orch = Orchestrator::new(surface.clone(), config(0.0)).with_observer(trace.clone());

    let result = orch.run(WorkflowMessage::new("hi \"there\"\n")).await;

    assert!(result.success, "{result:?}");
    assert_eq!(trace.finish(), vec!["Typing \"hi \\\"there\\\"\\n\"...".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn every_typo_becomes_a_replace_line() {
    let surface = SimSurface::new();
    let input = surface.element(ElementRole::Input).expect("default input");
    let trace = Arc::new(TraceObserver::new());
    let mut sim = Simulator::new(config(1.0)).with_observer(trace.clone());

    sim.type_text(&surface, &input, "sad").await.expect("typing");

    let lines = trace.finish();
    assert_eq!(lines.len(), 3, "{lines:?}");
    for (line, expected) in lines.iter().zip(["s", "a", "d"]) {
        assert!(line.starts_with("Replace \""), "{line}");
        assert!(line.ends_with(&format!("with \"{expected}\"...")), "{line}");
    }
    assert_eq!(surface.value(), "sad");
}

#[tokio::test(start_paused = true)]
async fn bulk_commit_leaves_no_trace() {
    let surface = Arc::new(SimSurface::new().respond_with(ResponseScript::ready_on(1, "ok")));
    let trace = Arc::new(TraceObserver::new());
    let mut cfg = config(0.0);
    cfg.keystroke.bulk_threshold = 4;
    let orch = Orchestrator::new(surface.clone(), cfg).with_observer(trace.clone());

    let result = orch.run(WorkflowMessage::new("pasted in one go")).await;

    assert!(result.success, "{result:?}");
    assert!(trace.finish().is_empty());
}
