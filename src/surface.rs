//! Contract between the simulator and the external interactive surface.
//!
//! The simulator never knows what the surface is (a browser tab, an
//! accessibility tree, an in-memory fake). It only locates a handful of
//! controls by role, dispatches pointer/key events at them, applies values
//! through the commit methods, and samples readiness.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{Element, ElementRole, KeyEvent, PointerEvent, WorkflowState};

/// One observation of the surface while waiting for a response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SurfaceSnapshot {
    /// A generation/progress marker is visible.
    pub in_progress: bool,
    /// Final content, if any has been rendered.
    pub content: Option<String>,
}

impl SurfaceSnapshot {
    /// Ready means no progress marker and non-empty final content.
    pub fn is_ready(&self) -> bool {
        !self.in_progress && self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

#[async_trait]
pub trait Surface: Send + Sync {
    /// Where the surface currently is (URL, window title, ...), for diagnostics.
    fn location(&self) -> String;

    async fn locate(&self, role: ElementRole) -> Option<Element>;

    async fn dispatch_pointer(&self, event: &PointerEvent) -> Result<()>;

    async fn dispatch_key(&self, element: &Element, event: &KeyEvent) -> Result<()>;

    /// Current value of an input or editable region.
    async fn read_value(&self, element: &Element) -> Result<String>;

    /// Select any existing content so the next write replaces it.
    async fn select_all(&self, element: &Element) -> Result<()>;

    /// Input-changed notification for observers on the surface side.
    async fn notify_input(&self, element: &Element) -> Result<()>;

    async fn set_value(&self, element: &Element, value: &str) -> Result<()>;

    /// Command-based insertion at the current selection.
    async fn insert_text(&self, element: &Element, text: &str) -> Result<()>;

    /// `Ok(None)` when the clipboard is empty; `Err` when access is denied.
    async fn read_clipboard(&self) -> Result<Option<String>>;

    async fn write_clipboard(&self, text: &str) -> Result<()>;

    async fn paste(&self, element: &Element) -> Result<()>;

    /// Synthetic input event carrying `text` as its data.
    async fn dispatch_input(&self, element: &Element, text: &str) -> Result<()>;

    async fn set_region_content(&self, element: &Element, text: &str) -> Result<()>;

    async fn sample(&self) -> Result<SurfaceSnapshot>;
}

/// Ways of applying a whole value at once, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStrategy {
    /// Assign the value property directly.
    DirectAssign,
    /// Editing-command insertion over the selection.
    CommandInsert,
    /// Write clipboard, paste, restore the previous clipboard.
    ClipboardRoundTrip,
    /// Fire a synthetic input event carrying the text.
    SyntheticInput,
    /// Replace the content of an editable region. Skipped for plain inputs.
    RegionContent,
}

impl CommitStrategy {
    pub const ORDER: [CommitStrategy; 5] = [
        CommitStrategy::DirectAssign,
        CommitStrategy::CommandInsert,
        CommitStrategy::ClipboardRoundTrip,
        CommitStrategy::SyntheticInput,
        CommitStrategy::RegionContent,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayKind {
    Keystroke,
    Hold,
    Typo,
    PointerStep,
    Click,
    Think,
    Idle,
    Settle,
    Poll,
    Reading,
    Recovery,
}

/// Everything the simulator does, as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    Pointer(PointerEvent),
    Key(KeyEvent),
    Delay {
        ms: u64,
        kind: DelayKind,
    },
    Commit {
        strategy: CommitStrategy,
        confirmed: bool,
    },
    Sample {
        attempt: u32,
        ready: bool,
    },
    State {
        state: WorkflowState,
    },
}

pub trait SimObserver: Send + Sync {
    fn on_event(&self, event: &SimEvent);
}
