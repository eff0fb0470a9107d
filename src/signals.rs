use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::viewport::EditorViewport;

// ---------------------------------------------------------------------------
// Editor signals
// ---------------------------------------------------------------------------

/// The closed set of events the mode state machines react to. Input devices
/// are translated into these at the plugin edge; everything below the edge
/// consumes signals only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EditorSignal {
    LeftMouseDown,
    LeftMouseUp,
    LeftMouseDrag,
    /// Return the active mode's machine to its rest state.
    BackToStart,
    Delete,
    Duplicate,
}

/// Signals collected this frame, drained by the mode driver.
#[derive(Resource, Default)]
pub struct SignalQueue {
    pub signals: Vec<EditorSignal>,
}

impl SignalQueue {
    pub fn push(&mut self, signal: EditorSignal) {
        self.signals.push(signal);
    }

    pub fn drain(&mut self) -> Vec<EditorSignal> {
        std::mem::take(&mut self.signals)
    }
}

/// Modifier keys sampled once per frame. Shift extends selections, Ctrl
/// toggles snapping.
#[derive(Resource, Default, Clone, Copy)]
pub struct InputModifiers {
    pub shift: bool,
    pub ctrl: bool,
}

/// Cursor travel before a press counts as a drag.
pub const DRAG_START_PIXELS: f32 = 5.0;

/// Pending press state. A press only becomes a drag once the cursor leaves
/// a small pixel radius, so a twitchy click stays a click.
#[derive(Resource, Default)]
pub struct DragTracker {
    pressed_at: Option<Vec2>,
    dragging: bool,
}

impl DragTracker {
    pub fn press(&mut self, at: Vec2) {
        self.pressed_at = Some(at);
        self.dragging = false;
    }

    pub fn release(&mut self) {
        self.pressed_at = None;
        self.dragging = false;
    }

    /// True once the cursor has strayed past the click radius. Latches for
    /// the rest of the press.
    pub fn moved_to(&mut self, cursor: Vec2) -> bool {
        if let Some(origin) = self.pressed_at
            && !self.dragging
            && (cursor - origin).length() > DRAG_START_PIXELS
        {
            self.dragging = true;
        }
        self.dragging
    }
}

// ---------------------------------------------------------------------------
// Input translation
// ---------------------------------------------------------------------------

/// Translate window input into editor signals and keep the viewport's
/// cursor state current.
pub fn collect_input_signals(
    windows: Query<&Window, With<PrimaryWindow>>,
    mouse: Res<ButtonInput<MouseButton>>,
    keys: Res<ButtonInput<KeyCode>>,
    mut viewport: ResMut<EditorViewport>,
    mut modifiers: ResMut<InputModifiers>,
    mut tracker: ResMut<DragTracker>,
    mut queue: ResMut<SignalQueue>,
) {
    let Ok(window) = windows.single() else {
        return;
    };

    viewport.size = Vec2::new(window.width(), window.height());
    viewport.focused = window.focused;

    modifiers.shift = keys.pressed(KeyCode::ShiftLeft) || keys.pressed(KeyCode::ShiftRight);
    modifiers.ctrl = keys.pressed(KeyCode::ControlLeft) || keys.pressed(KeyCode::ControlRight);

    let moved = if let Some(cursor) = window.cursor_position() {
        let moved = cursor.distance_squared(viewport.cursor) > f32::EPSILON;
        viewport.cursor = cursor;
        moved
    } else {
        false
    };

    if mouse.just_pressed(MouseButton::Left) {
        tracker.press(viewport.cursor);
        queue.push(EditorSignal::LeftMouseDown);
    }
    if mouse.pressed(MouseButton::Left) && moved && tracker.moved_to(viewport.cursor) {
        queue.push(EditorSignal::LeftMouseDrag);
    }
    if mouse.just_released(MouseButton::Left) {
        tracker.release();
        queue.push(EditorSignal::LeftMouseUp);
    }

    if viewport.focused {
        if keys.just_pressed(KeyCode::Delete) {
            queue.push(EditorSignal::Delete);
        }
        if modifiers.ctrl && keys.just_pressed(KeyCode::KeyD) {
            queue.push(EditorSignal::Duplicate);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
