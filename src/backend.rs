//! The capability set a display server has to offer for window capture.
//!
//! Everything the rest of the crate needs from the X server goes through
//! [`DisplayBackend`]: geometry queries, raw pixel fetches, and the optional
//! interactive capabilities (pointer grab, event wait, window tree walk)
//! used by the picker. Keeping the surface behind one trait lets the picker
//! and the capture pipeline share a single session object and lets tests run
//! against a synthetic window tree.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::frame::{PixelBuffer, PixelFormatError};

/// An X11 window resource id.
pub type WindowId = u32;

/// A window's bounding rectangle and color depth.
///
/// `x`/`y` are relative to the window's parent, which for direct children of
/// the root means root-relative.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct Geometry {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub depth: u8,
}

impl Geometry {
    /// Whether the given parent-relative point falls inside this rectangle.
    #[must_use]
    pub const fn contains(&self, x: i16, y: i16) -> bool {
        x >= self.x
            && y >= self.y
            && (x as i32) < self.x as i32 + self.width as i32
            && (y as i32) < self.y as i32 + self.height as i32
    }

    /// Whether the rectangle encloses no pixels at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// An input event delivered while the pointer grab is held.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum SelectionEvent {
    /// Primary button press, with root-relative pointer coordinates.
    Press { x: i16, y: i16 },
    /// Any event that aborts the selection (secondary button, keypress).
    Cancel,
}

/// Cooperative cancellation flag for the picker's event wait.
///
/// Cloned into e.g. a Ctrl-C handler; the event wait polls it between
/// protocol reads so a blocked selection can be abandoned.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Failed to acquire the exclusive pointer grab.
#[derive(thiserror::Error, Debug)]
pub enum GrabError {
    #[error("another client already holds the pointer grab")]
    AlreadyGrabbed,
    #[error("pointer grab refused: {0:?}")]
    Refused(x11rb::protocol::xproto::GrabStatus),
    #[error("X11 protocol error: {0}")]
    Protocol(#[from] x11rb::errors::ReplyError),
}

impl From<x11rb::errors::ConnectionError> for GrabError {
    fn from(err: x11rb::errors::ConnectionError) -> Self {
        Self::Protocol(err.into())
    }
}

/// The interactive selection ended without a usable window.
#[derive(thiserror::Error, Debug)]
pub enum SelectionError {
    #[error("window selection cancelled")]
    Cancelled,
    #[error("could not resolve the selected window: {0}")]
    Resolve(#[source] GeometryError),
    #[error("X11 protocol error: {0}")]
    Protocol(#[from] x11rb::errors::ReplyError),
}

impl From<x11rb::errors::ConnectionError> for SelectionError {
    fn from(err: x11rb::errors::ConnectionError) -> Self {
        Self::Protocol(err.into())
    }
}

/// The window id could not be translated into a geometry.
#[derive(thiserror::Error, Debug)]
pub enum GeometryError {
    #[error("no window with id 0x{0:x} exists on this display")]
    WindowNotFound(WindowId),
    #[error("X11 protocol error: {0}")]
    Protocol(#[from] x11rb::errors::ReplyError),
}

impl From<x11rb::errors::ConnectionError> for GeometryError {
    fn from(err: x11rb::errors::ConnectionError) -> Self {
        Self::Protocol(err.into())
    }
}

/// The window exists but its pixels could not be retrieved.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("window 0x{0:x} is not viewable (unmapped or hidden)")]
    Unmapped(WindowId),
    #[error("window 0x{0:x} has no area to capture")]
    EmptyGeometry(WindowId),
    #[error("the server cannot read the contents of window 0x{0:x}")]
    NotReadable(WindowId),
    #[error("no channel masks known for visual 0x{0:x}")]
    UnknownVisual(u32),
    #[error("no pixmap format advertised for depth {0}")]
    UnsupportedDepth(u8),
    #[error(transparent)]
    Format(#[from] PixelFormatError),
    #[error("X11 protocol error: {0}")]
    Protocol(#[from] x11rb::errors::ReplyError),
}

impl From<x11rb::errors::ConnectionError> for CaptureError {
    fn from(err: x11rb::errors::ConnectionError) -> Self {
        Self::Protocol(err.into())
    }
}

/// The display server capabilities the capture pipeline runs against.
///
/// [`crate::display::X11Backend`] is the real implementation; tests provide
/// a synthetic one. The first three methods are all a plain `--window <id>`
/// capture needs; the rest exist for the interactive picker.
pub trait DisplayBackend {
    /// The root window of the session's default screen.
    fn root(&self) -> WindowId;

    /// Query a window's bounding rectangle and depth.
    fn get_geometry(&self, window: WindowId) -> Result<Geometry, GeometryError>;

    /// Fetch the window's raw pixels for `rect` in the highest-fidelity
    /// format the server offers, along with its channel layout.
    fn get_pixels(&self, window: WindowId, rect: Geometry) -> Result<PixelBuffer, CaptureError>;

    /// Acquire an exclusive pointer grab on the root window.
    fn grab_pointer(&mut self) -> Result<(), GrabError>;

    /// Release the pointer grab. Infallible by contract: release runs on
    /// teardown paths where there is nothing useful to do with a failure.
    fn ungrab_pointer(&mut self);

    /// Block until a selection event arrives or `cancel` is triggered.
    fn wait_event(&mut self, cancel: &CancelToken) -> Result<SelectionEvent, SelectionError>;

    /// A window's children in bottom-to-top stacking order.
    fn query_tree(&self, window: WindowId) -> Result<Vec<WindowId>, SelectionError>;

    /// Whether the window is currently mapped and viewable.
    fn is_viewable(&self, window: WindowId) -> Result<bool, SelectionError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::cell::Cell;
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;

    use super::{
        CancelToken, CaptureError, DisplayBackend, Geometry, GeometryError, GrabError,
        SelectionError, SelectionEvent, WindowId,
    };
    use crate::frame::{ByteOrder, ChannelMasks, PixelBuffer};

    pub(crate) struct MockWindow {
        pub geometry: Geometry,
        pub viewable: bool,
        /// Children in bottom-to-top stacking order, as the X server reports.
        pub children: Vec<WindowId>,
    }

    /// In-memory display server: a window tree, a scripted event queue, and
    /// counters for the grab lifecycle assertions.
    pub(crate) struct MockBackend {
        pub root: WindowId,
        pub windows: HashMap<WindowId, MockWindow>,
        pub events: VecDeque<SelectionEvent>,
        pub refuse_grab: bool,
        pub grabs: u32,
        pub ungrabs: u32,
        /// Simulated seconds, shared with a fake clock.
        pub now: Rc<Cell<u64>>,
        pub pixels_fetched_at: Cell<Option<u64>>,
    }

    impl MockBackend {
        pub fn new(root_geometry: Geometry) -> Self {
            let root = 1;
            let mut windows = HashMap::new();
            windows.insert(
                root,
                MockWindow { geometry: root_geometry, viewable: true, children: Vec::new() },
            );
            Self {
                root,
                windows,
                events: VecDeque::new(),
                refuse_grab: false,
                grabs: 0,
                ungrabs: 0,
                now: Rc::new(Cell::new(0)),
                pixels_fetched_at: Cell::new(None),
            }
        }

        pub fn add_window(
            &mut self,
            id: WindowId,
            parent: WindowId,
            geometry: Geometry,
            viewable: bool,
        ) {
            self.windows.insert(id, MockWindow { geometry, viewable, children: Vec::new() });
            if let Some(parent) = self.windows.get_mut(&parent) {
                parent.children.push(id);
            }
        }
    }

    /// Deterministic pixel pattern used by both the mock server and the
    /// tests that decode its output.
    pub(crate) fn test_sample(x: u32, y: u32) -> u32 {
        ((x % 256) << 16) | ((y % 256) << 8) | ((x + y) % 256)
    }

    impl DisplayBackend for MockBackend {
        fn root(&self) -> WindowId {
            self.root
        }

        fn get_geometry(&self, window: WindowId) -> Result<Geometry, GeometryError> {
            self.windows
                .get(&window)
                .map(|w| w.geometry)
                .ok_or(GeometryError::WindowNotFound(window))
        }

        fn get_pixels(&self, window: WindowId, rect: Geometry) -> Result<PixelBuffer, CaptureError> {
            self.pixels_fetched_at.set(Some(self.now.get()));

            let win = self.windows.get(&window).ok_or(CaptureError::Unmapped(window))?;
            if !win.viewable {
                return Err(CaptureError::Unmapped(window));
            }
            if rect.is_empty() {
                return Err(CaptureError::EmptyGeometry(window));
            }

            let (width, height) = (u32::from(rect.width), u32::from(rect.height));
            let mut data = Vec::with_capacity((width * height * 4) as usize);
            for y in 0..height {
                for x in 0..width {
                    data.extend_from_slice(&test_sample(x, y).to_le_bytes());
                }
            }
            let masks =
                ChannelMasks { red: 0x00FF_0000, green: 0x0000_FF00, blue: 0x0000_00FF };
            Ok(PixelBuffer::new(
                data,
                rect.width,
                rect.height,
                24,
                32,
                32,
                ByteOrder::LsbFirst,
                masks,
            )?)
        }

        fn grab_pointer(&mut self) -> Result<(), GrabError> {
            if self.refuse_grab {
                return Err(GrabError::AlreadyGrabbed);
            }
            self.grabs += 1;
            Ok(())
        }

        fn ungrab_pointer(&mut self) {
            self.ungrabs += 1;
        }

        fn wait_event(&mut self, cancel: &CancelToken) -> Result<SelectionEvent, SelectionError> {
            if cancel.is_cancelled() {
                return Ok(SelectionEvent::Cancel);
            }
            Ok(self.events.pop_front().unwrap_or(SelectionEvent::Cancel))
        }

        fn query_tree(&self, window: WindowId) -> Result<Vec<WindowId>, SelectionError> {
            Ok(self.windows.get(&window).map(|w| w.children.clone()).unwrap_or_default())
        }

        fn is_viewable(&self, window: WindowId) -> Result<bool, SelectionError> {
            Ok(self.windows.get(&window).is_some_and(|w| w.viewable))
        }
    }
}
