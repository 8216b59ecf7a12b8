//! Window handles: an id paired with the geometry it had when resolved.

use std::fmt;

use crate::backend::{DisplayBackend, Geometry, GeometryError, WindowId};

/// A concrete capture target.
///
/// Produced either by the interactive picker or by looking up an explicit
/// id; the geometry is cached from the moment of resolution.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub struct WindowHandle {
    pub id: WindowId,
    pub geometry: Geometry,
}

impl WindowHandle {
    #[must_use]
    pub const fn new(id: WindowId, geometry: Geometry) -> Self {
        Self { id, geometry }
    }

    /// Resolve an explicit window id against the display.
    ///
    /// Fails with [`GeometryError::WindowNotFound`] when the id does not
    /// name a live window on this connection.
    pub fn from_id<B: DisplayBackend>(backend: &B, id: WindowId) -> Result<Self, GeometryError> {
        let geometry = backend.get_geometry(id)?;
        Ok(Self { id, geometry })
    }

    /// A window can be mapped yet enclose no pixels.
    #[must_use]
    pub const fn is_zero_area(&self) -> bool {
        self.geometry.is_empty()
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x} ({}x{} at {},{})",
            self.id, self.geometry.width, self.geometry.height, self.geometry.x, self.geometry.y
        )
    }
}
