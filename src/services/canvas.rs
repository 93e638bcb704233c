//! Canvas state machine: strokes, open gestures, and per-participant undo.
//!
//! DESIGN
//! ======
//! Two layers share this module:
//!
//! - `Pointer` is the local gesture machine (`Idle` → `Stroking` → `Idle`).
//!   It turns pointer input into draw ops for the wire and never touches
//!   shared state.
//! - `CanvasState` is the authoritative surface. It folds stamped draw ops:
//!   segments extend the origin's open gesture, `commit` turns that gesture
//!   into a stroke and pushes it on the origin's undo stack, `undo` removes
//!   a stroke the origin committed, and `clear` wipes everything.
//!
//! Undo is local-only: a participant can only revert strokes they committed.
//! Clear is global and also empties every undo stack. Each undo stack keeps
//! at most `UNDO_CAPACITY` entries and evicts the oldest first; an evicted
//! stroke stays on the canvas but can no longer be undone.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

pub const UNDO_CAPACITY: usize = 20;
pub const PEN_WIDTH: f64 = 3.0;
pub const ERASER_WIDTH: f64 = 20.0;
pub const MAX_STROKE_WIDTH: f64 = 200.0;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Pen,
    Eraser,
}

impl Tool {
    #[must_use]
    pub fn default_width(self) -> f64 {
        match self {
            Self::Pen => PEN_WIDTH,
            Self::Eraser => ERASER_WIDTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One line segment of a gesture. Erasers carry no color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub tool: Tool,
    pub from: Point,
    pub to: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub width: f64,
}

impl Segment {
    /// Reject coordinates and widths a renderer could not draw.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason for the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if !self.from.is_finite() || !self.to.is_finite() {
            return Err("segment coordinates must be finite".into());
        }
        if !self.width.is_finite() || self.width <= 0.0 || self.width > MAX_STROKE_WIDTH {
            return Err(format!("segment width must be in (0, {MAX_STROKE_WIDTH}]"));
        }
        Ok(())
    }
}

/// Payload of a `draw` event. `stroke_id` is resolved by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DrawOp {
    Segment(Segment),
    Commit {
        #[serde(rename = "strokeId", default, skip_serializing_if = "Option::is_none")]
        stroke_id: Option<String>,
    },
    Undo {
        #[serde(rename = "strokeId", default, skip_serializing_if = "Option::is_none")]
        stroke_id: Option<String>,
    },
}

/// A committed gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: String,
    pub owner: String,
    pub segments: Vec<Segment>,
}

// =============================================================================
// UNDO STACK
// =============================================================================

/// Capped stack of stroke ids. Pushing past capacity evicts the oldest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UndoStack {
    entries: VecDeque<String>,
}

impl UndoStack {
    pub fn push(&mut self, stroke_id: String) {
        if self.entries.len() == UNDO_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(stroke_id);
    }

    /// Pop the newest entry. Popping an empty stack is a no-op.
    pub fn pop(&mut self) -> Option<String> {
        self.entries.pop_back()
    }

    #[must_use]
    pub fn peek(&self) -> Option<&str> {
        self.entries.back().map(String::as_str)
    }

    fn remove(&mut self, stroke_id: &str) -> bool {
        if self.peek() == Some(stroke_id) {
            self.entries.pop_back();
            return true;
        }
        let before = self.entries.len();
        self.entries.retain(|id| id != stroke_id);
        self.entries.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// CANVAS STATE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasState {
    /// Committed strokes in commit order.
    strokes: Vec<Stroke>,
    /// In-progress gestures keyed by participant id.
    open: BTreeMap<String, Vec<Segment>>,
    /// Undo stacks keyed by participant id.
    undo: BTreeMap<String, UndoStack>,
}

impl CanvasState {
    pub fn draw_segment(&mut self, owner: &str, segment: Segment) {
        self.open.entry(owner.to_owned()).or_default().push(segment);
    }

    /// Turn the owner's open gesture into a stroke. Returns `false` if the
    /// owner had nothing open.
    pub fn commit(&mut self, owner: &str, stroke_id: &str) -> bool {
        let Some(segments) = self.open.remove(owner).filter(|s| !s.is_empty()) else {
            return false;
        };
        self.strokes
            .push(Stroke { id: stroke_id.to_owned(), owner: owner.to_owned(), segments });
        self.undo
            .entry(owner.to_owned())
            .or_default()
            .push(stroke_id.to_owned());
        true
    }

    /// Remove a stroke the owner committed. Strokes owned by someone else
    /// are left alone.
    pub fn undo(&mut self, owner: &str, stroke_id: &str) -> bool {
        let Some(stack) = self.undo.get_mut(owner) else {
            return false;
        };
        if !stack.remove(stroke_id) {
            return false;
        }
        self.strokes
            .retain(|s| !(s.id == stroke_id && s.owner == owner));
        true
    }

    /// Commit a departing participant's unfinished gesture under `stroke_id`
    /// and drop their undo stack.
    pub fn abandon(&mut self, owner: &str, stroke_id: &str) {
        if let Some(segments) = self.open.remove(owner).filter(|s| !s.is_empty()) {
            self.strokes
                .push(Stroke { id: stroke_id.to_owned(), owner: owner.to_owned(), segments });
        }
        self.undo.remove(owner);
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.open.clear();
        self.undo.clear();
    }

    #[must_use]
    pub fn has_open_gesture(&self, owner: &str) -> bool {
        self.open.get(owner).is_some_and(|s| !s.is_empty())
    }

    /// Stroke id the owner's next undo would revert.
    #[must_use]
    pub fn peek_undo(&self, owner: &str) -> Option<&str> {
        self.undo.get(owner).and_then(UndoStack::peek)
    }

    #[must_use]
    pub fn undo_depth(&self, owner: &str) -> usize {
        self.undo.get(owner).map_or(0, UndoStack::len)
    }

    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    #[must_use]
    pub fn open_gesture(&self, owner: &str) -> &[Segment] {
        self.open.get(owner).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.strokes.is_empty() && self.open.values().all(Vec::is_empty)
    }
}

// =============================================================================
// LOCAL POINTER
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub enum PointerState {
    #[default]
    Idle,
    Stroking {
        tool: Tool,
        color: Option<String>,
        width: f64,
        last: Point,
        drawn: usize,
    },
}

/// Local gesture machine driven by pointer input.
#[derive(Debug, Clone, Default)]
pub struct Pointer {
    state: PointerState,
}

impl Pointer {
    /// Enter `Stroking`. A second pointer-down restarts the gesture origin.
    /// A non-finite origin leaves the pointer unchanged.
    pub fn down(&mut self, tool: Tool, at: Point, color: Option<String>) {
        if !at.is_finite() {
            return;
        }
        let color = match tool {
            Tool::Pen => color,
            Tool::Eraser => None,
        };
        self.state = PointerState::Stroking { tool, color, width: tool.default_width(), last: at, drawn: 0 };
    }

    /// Extend the gesture. Returns the segment to draw and send, or `None`
    /// while idle or when `to` is not a finite point.
    pub fn move_to(&mut self, to: Point) -> Option<Segment> {
        let PointerState::Stroking { tool, color, width, last, drawn } = &mut self.state else {
            return None;
        };
        if !to.is_finite() {
            return None;
        }
        let segment = Segment { tool: *tool, from: *last, to, color: color.clone(), width: *width };
        *last = to;
        *drawn += 1;
        Some(segment)
    }

    /// Leave `Stroking`. Returns a commit op if anything was drawn.
    pub fn up(&mut self) -> Option<DrawOp> {
        let previous = std::mem::take(&mut self.state);
        match previous {
            PointerState::Stroking { drawn, .. } if drawn > 0 => Some(DrawOp::Commit { stroke_id: None }),
            _ => None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &PointerState {
        &self.state
    }

    #[must_use]
    pub fn is_stroking(&self) -> bool {
        matches!(self.state, PointerState::Stroking { .. })
    }
}

#[cfg(test)]
#[path = "canvas_test.rs"]
mod tests;
