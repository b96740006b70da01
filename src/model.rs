use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Linear interpolation written as `(1 - t) * a + t * b` so that `t = 1`
    /// lands exactly on `other`.
    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point {
            x: (1.0 - t) * self.x + t * other.x,
            y: (1.0 - t) * self.y + t * other.y,
        }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Point {
        Point {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }

    /// Point at fractional coordinates `(fx, fy)` in `[0, 1]` inside the rect.
    pub fn at_fraction(&self, fx: f64, fy: f64) -> Point {
        Point::new(self.x + fx * self.width, self.y + fy * self.height)
    }
}

/// Where a pointer move should end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    Point(Point),
    /// Resolved to a random interior point.
    Region(Rect),
}

impl From<Point> for Target {
    fn from(p: Point) -> Self {
        Target::Point(p)
    }
}

impl From<&Element> for Target {
    fn from(el: &Element) -> Self {
        Target::Region(el.bounds)
    }
}

/// The controls the workflow needs from the target surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementRole {
    Input,
    Submit,
    NewSession,
}

impl ElementRole {
    pub const MANDATORY: [ElementRole; 3] =
        [ElementRole::Input, ElementRole::Submit, ElementRole::NewSession];

    pub fn as_str(self) -> &'static str {
        match self {
            ElementRole::Input => "input",
            ElementRole::Submit => "submit",
            ElementRole::NewSession => "new_session",
        }
    }
}

impl std::fmt::Display for ElementRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A located element on the target surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub role: ElementRole,
    /// Opaque locator used by the surface (CSS selector, accessibility id, ...).
    pub selector: String,
    pub bounds: Rect,
    /// True for contenteditable-like regions rather than plain value inputs.
    #[serde(default)]
    pub editable_region: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerEvent {
    Move { at: Point },
    Over { at: Point },
    Leave { at: Point },
    Down { at: Point, button: MouseButton },
    Up { at: Point, button: MouseButton },
    Click { at: Point, button: MouseButton },
    DoubleClick { at: Point },
    ContextMenu { at: Point },
}

impl PointerEvent {
    pub fn position(&self) -> Point {
        match *self {
            PointerEvent::Move { at }
            | PointerEvent::Over { at }
            | PointerEvent::Leave { at }
            | PointerEvent::Down { at, .. }
            | PointerEvent::Up { at, .. }
            | PointerEvent::Click { at, .. }
            | PointerEvent::DoubleClick { at }
            | PointerEvent::ContextMenu { at } => at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "char", rename_all = "snake_case")]
pub enum Key {
    Char(char),
    Backspace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: Key,
    pub state: KeyState,
}

/// Optional per-run behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeFlags {
    /// Do not click the "new session" control before injecting.
    pub skip_reset: bool,
    /// Use the bulk commit path regardless of payload length.
    pub force_bulk: bool,
    /// Insert an idle "thinking" wait before the submit click.
    pub think_before_submit: bool,
}

/// Input to one workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMessage {
    pub content: String,
    #[serde(default)]
    pub fallback_content: Option<String>,
    #[serde(default)]
    pub mode_flags: ModeFlags,
}

impl WorkflowMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            fallback_content: None,
            mode_flags: ModeFlags::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback_content = Some(fallback.into());
        self
    }

    pub fn with_mode_flags(mut self, flags: ModeFlags) -> Self {
        self.mode_flags = flags;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Verifying,
    Resetting,
    Injecting,
    Submitting,
    Polling,
    FallbackInjecting,
    FallbackSubmitting,
    Capturing,
    Completed,
    Failed,
}

/// Terminal output of one workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Every state entered, in order, ending with `Completed` or `Failed`.
    pub states: Vec<WorkflowState>,
    pub used_fallback: bool,
    pub poll_samples: u32,
}

impl WorkflowResult {
    pub fn final_state(&self) -> Option<WorkflowState> {
        self.states.last().copied()
    }

    pub fn entered(&self, state: WorkflowState) -> bool {
        self.states.contains(&state)
    }
}
