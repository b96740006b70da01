use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::model::{Key, KeyState};
use crate::surface::{SimEvent, SimObserver};

#[derive(Debug, Default, Clone)]
struct EditorState {
    buf: Vec<char>,
}

impl EditorState {
    fn insert_char(&mut self, c: char) {
        self.buf.push(c);
    }

    fn backspace(&mut self) -> Option<char> {
        self.buf.pop()
    }
}

#[derive(Debug, Default, Clone)]
struct CorrectionState {
    deleted: Vec<char>,
    inserted: String,
    /// How many of `deleted` still sit at the end of the open typing run.
    from_run: usize,
}

impl CorrectionState {
    fn deleted_string(&self) -> String {
        self.deleted.iter().rev().collect()
    }

    fn has_replace(&self) -> bool {
        !self.deleted.is_empty() && !self.inserted.is_empty()
    }

    fn is_complete(&self) -> bool {
        self.has_replace() && self.inserted.chars().count() >= self.deleted.len()
    }
}

#[derive(Debug, Default, Clone)]
struct Tracer {
    editor: EditorState,
    typing_run: String,
    correction: Option<CorrectionState>,
    lines: Vec<String>,
}

impl Tracer {
    fn push_line(&mut self, line: String) {
        info!(target: "mimic::trace", "{line}");
        self.lines.push(line);
    }

    fn flush_typing_run(&mut self) {
        if self.typing_run.is_empty() {
            return;
        }
        let line = format!("Typing \"{}\"...", escape_for_log(&self.typing_run));
        self.typing_run.clear();
        self.push_line(line);
    }

    fn finish_correction(&mut self) {
        let Some(correction) = self.correction.take() else {
            return;
        };
        if !correction.has_replace() {
            return;
        }
        let line = format!(
            "Replace \"{}\" with \"{}\"...",
            escape_for_log(&correction.deleted_string()),
            escape_for_log(&correction.inserted)
        );
        self.push_line(line);
    }

    fn key_pressed(&mut self, key: Key) {
        match key {
            Key::Backspace => {
                if self
                    .correction
                    .as_ref()
                    .is_some_and(CorrectionState::has_replace)
                {
                    self.finish_correction();
                }
                if let Some(c) = self.editor.backspace() {
                    let run_len = self.typing_run.chars().count();
                    let correction = self
                        .correction
                        .get_or_insert_with(CorrectionState::default);
                    correction.deleted.push(c);
                    if correction.from_run < run_len {
                        correction.from_run += 1;
                    }
                }
            }
            Key::Char(c) => {
                self.editor.insert_char(c);
                let opening = self
                    .correction
                    .as_ref()
                    .filter(|correction| correction.inserted.is_empty())
                    .map(|correction| correction.from_run);
                if let Some(erased) = opening {
                    // Erased chars move from the run into the Replace line.
                    for _ in 0..erased {
                        self.typing_run.pop();
                    }
                    self.flush_typing_run();
                }
                match &mut self.correction {
                    Some(correction) => {
                        correction.inserted.push(c);
                        if correction.is_complete() {
                            self.finish_correction();
                        }
                    }
                    None => self.typing_run.push(c),
                }
            }
        }
    }

    fn finish(&mut self) {
        self.finish_correction();
        self.flush_typing_run();
    }
}

/// Condenses key events into "Typing ..." and "Replace ... with ..." lines.
///
/// Lines are logged through `tracing` as they complete and kept for
/// [`TraceObserver::lines`]. A workflow state change closes the current run.
#[derive(Debug, Default)]
pub struct TraceObserver {
    inner: Mutex<Tracer>,
}

impl TraceObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tracer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    /// Flush any open run and return every line so far.
    pub fn finish(&self) -> Vec<String> {
        let mut tracer = self.lock();
        tracer.finish();
        tracer.lines.clone()
    }
}

impl SimObserver for TraceObserver {
    fn on_event(&self, event: &SimEvent) {
        match event {
            SimEvent::Key(key) if key.state == KeyState::Pressed => self.lock().key_pressed(key.key),
            SimEvent::State { .. } => self.lock().finish(),
            _ => {}
        }
    }
}

fn escape_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyEvent;

    fn press(obs: &TraceObserver, key: Key) {
        obs.on_event(&SimEvent::Key(KeyEvent {
            key,
            state: KeyState::Pressed,
        }));
        obs.on_event(&SimEvent::Key(KeyEvent {
            key,
            state: KeyState::Released,
        }));
    }

    fn type_str(obs: &TraceObserver, s: &str) {
        for c in s.chars() {
            press(obs, Key::Char(c));
        }
    }

    #[test]
    fn plain_typing_is_one_line() {
        let obs = TraceObserver::new();
        type_str(&obs, "Hello \"you\"\n");
        assert!(obs.lines().is_empty());
        assert_eq!(obs.finish(), vec![r#"Typing "Hello \"you\"\n"..."#.to_string()]);
    }

    #[test]
    fn typo_splits_run_around_replacement() {
        let obs = TraceObserver::new();
        type_str(&obs, "Hek");
        press(&obs, Key::Backspace);
        type_str(&obs, "llo");
        assert_eq!(
            obs.finish(),
            vec![
                "Typing \"He\"...".to_string(),
                "Replace \"k\" with \"l\"...".to_string(),
                "Typing \"lo\"...".to_string(),
            ]
        );
    }

    #[test]
    fn state_change_flushes_open_run() {
        let obs = TraceObserver::new();
        type_str(&obs, "hi");
        obs.on_event(&SimEvent::State {
            state: crate::model::WorkflowState::Submitting,
        });
        assert_eq!(obs.lines(), vec!["Typing \"hi\"...".to_string()]);
    }

    #[test]
    fn double_backspace_replaces_both_chars() {
        let obs = TraceObserver::new();
        type_str(&obs, "cat");
        press(&obs, Key::Backspace);
        press(&obs, Key::Backspace);
        type_str(&obs, "ow");
        assert_eq!(
            obs.finish(),
            vec![
                "Typing \"c\"...".to_string(),
                "Replace \"at\" with \"ow\"...".to_string(),
            ]
        );
    }

    #[test]
    fn backspace_without_retype_is_silent() {
        let obs = TraceObserver::new();
        type_str(&obs, "ab");
        press(&obs, Key::Backspace);
        assert_eq!(obs.finish(), vec!["Typing \"ab\"...".to_string()]);
    }
}
