//! Interactive window selection.
//!
//! The picker grabs the pointer on the root window, waits for a click, and
//! walks the window tree down to the deepest viewable window under the
//! pointer. The grab is released exactly once no matter how the session
//! ends: [`WindowPicker::end`] on the normal paths, `Drop` as the backstop
//! for error propagation.

use log::{debug, warn};

use crate::backend::{
    CancelToken, DisplayBackend, Geometry, GrabError, SelectionError, SelectionEvent, WindowId,
};
use crate::window::WindowHandle;

/// Lifecycle of one picking session.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
enum PickerState {
    Idle,
    Grabbing,
    AwaitingEvent,
    Resolved,
    Cancelled,
    Failed,
}

/// A transient selection session over a borrowed backend.
///
/// Intended flow: `begin` → `await_selection` → `resolve` → `end`. The
/// session owns the pointer grab between a successful `begin` and `end`.
pub struct WindowPicker<'a, B: DisplayBackend> {
    backend: &'a mut B,
    state: PickerState,
    grab_held: bool,
}

impl<'a, B: DisplayBackend> WindowPicker<'a, B> {
    #[must_use]
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend, state: PickerState::Idle, grab_held: false }
    }

    /// Acquire the exclusive pointer grab.
    ///
    /// On failure no grab is held, so there is nothing to clean up and the
    /// picker moves straight to its failed state.
    pub fn begin(&mut self) -> Result<(), GrabError> {
        debug_assert_eq!(self.state, PickerState::Idle);
        self.state = PickerState::Grabbing;
        match self.backend.grab_pointer() {
            Ok(()) => {
                self.grab_held = true;
                self.state = PickerState::AwaitingEvent;
                Ok(())
            }
            Err(err) => {
                self.state = PickerState::Failed;
                Err(err)
            }
        }
    }

    /// Block until the user clicks a window or aborts.
    ///
    /// Returns the root-relative click coordinates. A secondary button,
    /// a keypress, or a triggered `cancel` token ends the session with
    /// [`SelectionError::Cancelled`].
    pub fn await_selection(&mut self, cancel: &CancelToken) -> Result<(i16, i16), SelectionError> {
        debug_assert_eq!(self.state, PickerState::AwaitingEvent);
        match self.backend.wait_event(cancel) {
            Ok(SelectionEvent::Press { x, y }) => {
                debug!("selection click at root-relative ({x}, {y})");
                Ok((x, y))
            }
            Ok(SelectionEvent::Cancel) => {
                self.state = PickerState::Cancelled;
                Err(SelectionError::Cancelled)
            }
            Err(err) => {
                self.state = PickerState::Failed;
                Err(err)
            }
        }
    }

    /// Descend from the root to the deepest viewable window containing the
    /// click point.
    ///
    /// The grab target is the root, not the window the user meant, so the
    /// click coordinates have to be chased down the tree: at each level the
    /// topmost viewable child whose rectangle contains the point wins, and
    /// the point is translated into that child's coordinate space. Windows
    /// that disappear mid-walk are skipped.
    pub fn resolve(&mut self, point: (i16, i16)) -> Result<WindowHandle, SelectionError> {
        let (mut x, mut y) = point;
        let mut current = self.backend.root();
        let mut current_geometry = None;

        loop {
            let children = match self.backend.query_tree(current) {
                Ok(children) => children,
                Err(err) => {
                    self.state = PickerState::Failed;
                    return Err(err);
                }
            };

            let mut next: Option<(WindowId, Geometry)> = None;
            // Children are reported bottom-to-top; the topmost hit wins.
            for &child in children.iter().rev() {
                if !self.backend.is_viewable(child).unwrap_or(false) {
                    continue;
                }
                let Ok(geometry) = self.backend.get_geometry(child) else {
                    continue;
                };
                if geometry.contains(x, y) {
                    next = Some((child, geometry));
                    break;
                }
            }

            match next {
                Some((child, geometry)) => {
                    x -= geometry.x;
                    y -= geometry.y;
                    current = child;
                    current_geometry = Some(geometry);
                }
                None => break,
            }
        }

        let handle = match current_geometry {
            Some(geometry) => WindowHandle::new(current, geometry),
            // The click hit no child at all; the root itself is selected.
            None => match self.backend.get_geometry(current) {
                Ok(geometry) => WindowHandle::new(current, geometry),
                Err(err) => {
                    self.state = PickerState::Failed;
                    return Err(SelectionError::Resolve(err));
                }
            },
        };

        if handle.is_zero_area() {
            warn!("selected window {} has zero area", handle);
        }
        debug!("selection resolved to window {handle}");
        self.state = PickerState::Resolved;
        Ok(handle)
    }

    /// Release the grab if it is still held.
    ///
    /// Safe to call from any terminal state; the release happens at most
    /// once per session.
    pub fn end(&mut self) {
        if self.grab_held {
            self.backend.ungrab_pointer();
            self.grab_held = false;
        }
    }
}

impl<B: DisplayBackend> Drop for WindowPicker<'_, B> {
    fn drop(&mut self) {
        self.end();
    }
}
