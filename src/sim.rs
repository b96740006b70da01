//! In-memory target surface and event recorder.
//!
//! `SimSurface` behaves like a minimal chat page: an input, a submit button,
//! a "new session" button, and a response area that becomes ready after a
//! scripted number of samples. It backs the unit tests and `mimic run`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rand::RngCore;

use crate::model::{
    Element, ElementRole, Key, KeyEvent, KeyState, MouseButton, PointerEvent, Rect, WorkflowState,
};
use crate::surface::{
    CommitStrategy, DelayKind, SimEvent, SimObserver, Surface, SurfaceSnapshot,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub pointer_events: usize,
    pub key_events: usize,
    pub samples: usize,
    pub total_wait_ms: u64,
}

pub fn stats(events: &[SimEvent]) -> RunStats {
    let mut out = RunStats::default();
    for e in events {
        match e {
            SimEvent::Pointer(_) => out.pointer_events += 1,
            SimEvent::Key(_) => out.key_events += 1,
            SimEvent::Sample { .. } => out.samples += 1,
            SimEvent::Delay { ms, .. } => {
                out.total_wait_ms = out.total_wait_ms.saturating_add(*ms);
            }
            SimEvent::Commit { .. } | SimEvent::State { .. } => {}
        }
    }
    out
}

#[derive(Debug, Default, Clone)]
struct SimEditorState {
    buf: Vec<char>,
    cursor: usize,
    /// Whole buffer selected; the next insertion replaces it.
    selected: bool,
}

impl SimEditorState {
    fn take_selection(&mut self) {
        if self.selected {
            self.buf.clear();
            self.cursor = 0;
            self.selected = false;
        }
    }

    fn insert_char(&mut self, c: char) {
        self.take_selection();
        self.buf.insert(self.cursor, c);
        self.cursor += 1;
    }

    fn insert_str(&mut self, s: &str) {
        for c in s.chars() {
            self.insert_char(c);
        }
    }

    fn backspace(&mut self) {
        if self.selected {
            self.take_selection();
            return;
        }
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        self.buf.remove(self.cursor);
    }

    fn set(&mut self, s: &str) {
        self.buf = s.chars().collect();
        self.cursor = self.buf.len();
        self.selected = false;
    }

    fn as_string(&self) -> String {
        self.buf.iter().collect()
    }
}

/// How the response area behaves after one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseScript {
    /// Sample number (counted from the submission) at which the response is
    /// ready; `None` never becomes ready.
    pub ready_on_sample: Option<u32>,
    pub payload: String,
}

impl ResponseScript {
    pub fn ready_on(sample: u32, payload: impl Into<String>) -> Self {
        Self {
            ready_on_sample: Some(sample),
            payload: payload.into(),
        }
    }

    pub fn never() -> Self {
        Self {
            ready_on_sample: None,
            payload: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct SimSurfaceState {
    editor: SimEditorState,
    clipboard: Option<String>,
    submissions: Vec<String>,
    sessions: u32,
    samples: u32,
    samples_since_submit: u32,
    sample_failures_left: u32,
    pointer_events: Vec<PointerEvent>,
    key_events: Vec<KeyEvent>,
    input_notifications: u32,
}

#[derive(Debug)]
pub struct SimSurface {
    location: String,
    elements: HashMap<ElementRole, Element>,
    scripts: Vec<ResponseScript>,
    rejected: HashSet<CommitStrategy>,
    clipboard_denied: bool,
    ignore_keys: bool,
    state: Mutex<SimSurfaceState>,
}

impl Default for SimSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSurface {
    pub fn new() -> Self {
        let elements = [
            (ElementRole::Input, "#prompt", Rect::new(240.0, 620.0, 560.0, 64.0)),
            (ElementRole::Submit, "button[type=submit]", Rect::new(816.0, 632.0, 40.0, 40.0)),
            (ElementRole::NewSession, "a.new-chat", Rect::new(24.0, 24.0, 160.0, 36.0)),
        ]
        .into_iter()
        .map(|(role, selector, bounds)| {
            (
                role,
                Element {
                    role,
                    selector: selector.to_string(),
                    bounds,
                    editable_region: false,
                },
            )
        })
        .collect();

        Self {
            location: "sim://chat".to_string(),
            elements,
            scripts: Vec::new(),
            rejected: HashSet::new(),
            clipboard_denied: false,
            ignore_keys: false,
            state: Mutex::new(SimSurfaceState::default()),
        }
    }

    /// Remove a control so it can't be located.
    pub fn without(mut self, role: ElementRole) -> Self {
        self.elements.remove(&role);
        self
    }

    /// Make the input a contenteditable-style region.
    pub fn editable_region(mut self) -> Self {
        if let Some(el) = self.elements.get_mut(&ElementRole::Input) {
            el.editable_region = true;
        }
        self
    }

    /// Script the response to the next submission. The last script repeats.
    pub fn respond_with(mut self, script: ResponseScript) -> Self {
        self.scripts.push(script);
        self
    }

    /// Make `strategy` appear to succeed without changing the value.
    pub fn reject(mut self, strategy: CommitStrategy) -> Self {
        self.rejected.insert(strategy);
        self
    }

    pub fn deny_clipboard(mut self) -> Self {
        self.clipboard_denied = true;
        self
    }

    /// Key events are recorded but never reach the input.
    pub fn ignore_keys(mut self) -> Self {
        self.ignore_keys = true;
        self
    }

    pub fn with_clipboard(self, text: &str) -> Self {
        self.lock().clipboard = Some(text.to_string());
        self
    }

    pub fn with_value(self, text: &str) -> Self {
        self.lock().editor.set(text);
        self
    }

    /// The next `n` samples fail.
    pub fn fail_samples(self, n: u32) -> Self {
        self.lock().sample_failures_left = n;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimSurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accepts(&self, strategy: CommitStrategy) -> bool {
        !self.rejected.contains(&strategy)
    }

    pub fn element(&self, role: ElementRole) -> Option<Element> {
        self.elements.get(&role).cloned()
    }

    pub fn value(&self) -> String {
        self.lock().editor.as_string()
    }

    pub fn clipboard(&self) -> Option<String> {
        self.lock().clipboard.clone()
    }

    pub fn submissions(&self) -> Vec<String> {
        self.lock().submissions.clone()
    }

    pub fn sessions(&self) -> u32 {
        self.lock().sessions
    }

    pub fn samples(&self) -> u32 {
        self.lock().samples
    }

    pub fn pointer_events(&self) -> Vec<PointerEvent> {
        self.lock().pointer_events.clone()
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.lock().key_events.clone()
    }

    pub fn input_notifications(&self) -> u32 {
        self.lock().input_notifications
    }

    /// Submit the current input value as if the button had been clicked.
    pub fn submit_now(&self) {
        submit(&mut self.lock());
    }

    fn role_at(&self, event: &PointerEvent) -> Option<ElementRole> {
        let at = event.position();
        [ElementRole::Submit, ElementRole::NewSession]
            .into_iter()
            .find(|role| self.elements.get(role).is_some_and(|el| el.bounds.contains(at)))
    }

    fn script_for(&self, submission: usize) -> ResponseScript {
        self.scripts
            .get(submission)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap_or_else(ResponseScript::never)
    }
}

fn submit(state: &mut SimSurfaceState) {
    let text = state.editor.as_string();
    state.submissions.push(text);
    state.editor.set("");
    state.samples_since_submit = 0;
}

#[async_trait]
impl Surface for SimSurface {
    fn location(&self) -> String {
        self.location.clone()
    }

    async fn locate(&self, role: ElementRole) -> Option<Element> {
        self.element(role)
    }

    async fn dispatch_pointer(&self, event: &PointerEvent) -> Result<()> {
        let role = match event {
            PointerEvent::Click {
                button: MouseButton::Left,
                ..
            } => self.role_at(event),
            _ => None,
        };
        let mut state = self.lock();
        state.pointer_events.push(*event);
        match role {
            Some(ElementRole::Submit) => submit(&mut state),
            Some(ElementRole::NewSession) => {
                state.editor.set("");
                state.sessions += 1;
                state.samples_since_submit = 0;
            }
            _ => {}
        }
        Ok(())
    }

    async fn dispatch_key(&self, _element: &Element, event: &KeyEvent) -> Result<()> {
        let mut state = self.lock();
        state.key_events.push(*event);
        if self.ignore_keys || event.state != KeyState::Pressed {
            return Ok(());
        }
        match event.key {
            Key::Char(c) => state.editor.insert_char(c),
            Key::Backspace => state.editor.backspace(),
        }
        Ok(())
    }

    async fn read_value(&self, _element: &Element) -> Result<String> {
        Ok(self.value())
    }

    async fn select_all(&self, _element: &Element) -> Result<()> {
        self.lock().editor.selected = true;
        Ok(())
    }

    async fn notify_input(&self, _element: &Element) -> Result<()> {
        self.lock().input_notifications += 1;
        Ok(())
    }

    async fn set_value(&self, _element: &Element, value: &str) -> Result<()> {
        if self.accepts(CommitStrategy::DirectAssign) {
            self.lock().editor.set(value);
        }
        Ok(())
    }

    async fn insert_text(&self, _element: &Element, text: &str) -> Result<()> {
        if self.accepts(CommitStrategy::CommandInsert) {
            self.lock().editor.insert_str(text);
        }
        Ok(())
    }

    async fn read_clipboard(&self) -> Result<Option<String>> {
        if self.clipboard_denied {
            bail!("clipboard read permission denied");
        }
        Ok(self.lock().clipboard.clone())
    }

    async fn write_clipboard(&self, text: &str) -> Result<()> {
        if self.clipboard_denied {
            bail!("clipboard write permission denied");
        }
        self.lock().clipboard = Some(text.to_string());
        Ok(())
    }

    async fn paste(&self, _element: &Element) -> Result<()> {
        let mut state = self.lock();
        let text = state
            .clipboard
            .clone()
            .ok_or_else(|| anyhow!("nothing to paste"))?;
        if self.accepts(CommitStrategy::ClipboardRoundTrip) {
            state.editor.insert_str(&text);
        }
        Ok(())
    }

    async fn dispatch_input(&self, _element: &Element, text: &str) -> Result<()> {
        if self.accepts(CommitStrategy::SyntheticInput) {
            self.lock().editor.set(text);
        }
        Ok(())
    }

    async fn set_region_content(&self, element: &Element, text: &str) -> Result<()> {
        if !element.editable_region {
            bail!("{} is not an editable region", element.selector);
        }
        if self.accepts(CommitStrategy::RegionContent) {
            self.lock().editor.set(text);
        }
        Ok(())
    }

    async fn sample(&self) -> Result<SurfaceSnapshot> {
        let mut state = self.lock();
        state.samples += 1;
        if state.sample_failures_left > 0 {
            state.sample_failures_left -= 1;
            bail!("response area detached");
        }
        if state.submissions.is_empty() {
            return Ok(SurfaceSnapshot::default());
        }

        state.samples_since_submit += 1;
        let script = self.script_for(state.submissions.len() - 1);
        match script.ready_on_sample {
            Some(k) if state.samples_since_submit >= k => Ok(SurfaceSnapshot {
                in_progress: false,
                content: Some(script.payload),
            }),
            _ => Ok(SurfaceSnapshot {
                in_progress: true,
                content: None,
            }),
        }
    }
}

/// Random source whose every draw is zero.
///
/// Ranges sample their lower bound, unit floats are `0.0`, and any nonzero
/// probability fires. Plug it in with `Simulator::with_rng`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloorRng;

impl RngCore for FloorRng {
    fn next_u32(&mut self) -> u32 {
        0
    }

    fn next_u64(&mut self) -> u64 {
        0
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Keeps every event it sees, for assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SimEvent>>,
}

impl RecordingObserver {
    fn lock(&self) -> MutexGuard<'_, Vec<SimEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().clone()
    }

    pub fn delays(&self, kind: DelayKind) -> Vec<u64> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SimEvent::Delay { ms, kind: k } if *k == kind => Some(*ms),
                _ => None,
            })
            .collect()
    }

    pub fn pointer_events(&self) -> Vec<PointerEvent> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SimEvent::Pointer(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn commits(&self) -> Vec<(CommitStrategy, bool)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SimEvent::Commit {
                    strategy,
                    confirmed,
                } => Some((*strategy, *confirmed)),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<WorkflowState> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SimEvent::State { state } => Some(*state),
                _ => None,
            })
            .collect()
    }
}

impl SimObserver for RecordingObserver {
    fn on_event(&self, event: &SimEvent) {
        self.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Point;

    #[test]
    fn editor_replaces_selection_on_insert() {
        let mut ed = SimEditorState::default();
        ed.insert_str("hello");
        ed.selected = true;
        ed.insert_char('x');
        assert_eq!(ed.as_string(), "x");
        ed.backspace();
        assert_eq!(ed.as_string(), "");
    }

    #[tokio::test]
    async fn clicking_submit_moves_input_into_submissions() {
        let surface = SimSurface::new()
            .with_value("question")
            .respond_with(ResponseScript::ready_on(2, "answer"));
        let at = surface.element(ElementRole::Submit).unwrap().bounds.center();
        surface
            .dispatch_pointer(&PointerEvent::Click {
                at,
                button: MouseButton::Left,
            })
            .await
            .unwrap();

        assert_eq!(surface.submissions(), vec!["question".to_string()]);
        assert_eq!(surface.value(), "");
        assert!(!surface.sample().await.unwrap().is_ready());
        let snap = surface.sample().await.unwrap();
        assert!(snap.is_ready());
        assert_eq!(snap.content.as_deref(), Some("answer"));
    }

    #[tokio::test]
    async fn clicks_elsewhere_do_nothing() {
        let surface = SimSurface::new().with_value("keep");
        surface
            .dispatch_pointer(&PointerEvent::Click {
                at: Point::new(1.0, 900.0),
                button: MouseButton::Left,
            })
            .await
            .unwrap();
        assert!(surface.submissions().is_empty());
        assert_eq!(surface.value(), "keep");
    }

    #[test]
    fn stats_totals_waits() {
        let events = vec![
            SimEvent::Delay {
                ms: 10,
                kind: DelayKind::Keystroke,
            },
            SimEvent::Delay {
                ms: 5,
                kind: DelayKind::Hold,
            },
            SimEvent::Sample {
                attempt: 1,
                ready: false,
            },
        ];
        let s = stats(&events);
        assert_eq!(s.total_wait_ms, 15);
        assert_eq!(s.samples, 1);
        assert_eq!(s.key_events, 0);
    }
}
