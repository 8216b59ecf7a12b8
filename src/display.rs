//! The live X11 session backing [`DisplayBackend`].
//!
//! [`X11Backend`] owns the connection for the lifetime of the process; the
//! socket is closed exactly once when the backend is dropped, after any
//! pointer grab has been released.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::{ConnectError, ReplyOrIdError};
use x11rb::protocol::xproto::{
    ConnectionExt as _, Cursor, EventMask, Format, GrabMode, GrabStatus, ImageFormat, ImageOrder,
    MapState, Screen, Visualid,
};
use x11rb::protocol::{ErrorKind, Event};
use x11rb::rust_connection::RustConnection;

use crate::backend::{
    CancelToken, CaptureError, DisplayBackend, Geometry, GeometryError, GrabError, SelectionError,
    SelectionEvent, WindowId,
};
use crate::frame::{ByteOrder, ChannelMasks, PixelBuffer};

/// Cursor-font glyph index of the crosshair shape.
const XC_CROSSHAIR: u16 = 34;

/// Interval between cancel-flag checks while waiting for a click.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Could not establish the display session.
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("cannot open display: {0}")]
    Connect(#[from] ConnectError),
    #[error("display has no screen {0}")]
    NoScreen(usize),
}

/// An open X11 display session.
///
/// All protocol traffic of one capture invocation goes through a single
/// `X11Backend`; there are no other connection owners.
pub struct X11Backend {
    conn: RustConnection,
    screen_num: usize,
    root: WindowId,
    /// Crosshair cursor held only while the pointer grab is active.
    cursor: Option<Cursor>,
}

impl X11Backend {
    /// Connect to the named display, or to `$DISPLAY` when `None`.
    pub fn connect(display: Option<&str>) -> Result<Self, ConnectionError> {
        let (conn, screen_num) = x11rb::connect(display)?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or(ConnectionError::NoScreen(screen_num))?
            .root;
        info!("connected to X display, screen {screen_num}, root window {root:#x}");
        Ok(Self { conn, screen_num, root, cursor: None })
    }

    fn screen(&self) -> &Screen {
        // The screen index was validated in `connect`.
        &self.conn.setup().roots[self.screen_num]
    }

    /// Channel masks of the given visual, looked up in the screen's
    /// advertised depths.
    fn visual_masks(&self, visual: Visualid) -> Option<ChannelMasks> {
        self.screen()
            .allowed_depths
            .iter()
            .flat_map(|depth| depth.visuals.iter())
            .find(|candidate| candidate.visual_id == visual)
            .map(|v| ChannelMasks { red: v.red_mask, green: v.green_mask, blue: v.blue_mask })
    }

    fn pixmap_format(&self, depth: u8) -> Option<&Format> {
        self.conn.setup().pixmap_formats.iter().find(|format| format.depth == depth)
    }

    fn server_byte_order(&self) -> ByteOrder {
        if self.conn.setup().image_byte_order == ImageOrder::MSB_FIRST {
            ByteOrder::MsbFirst
        } else {
            ByteOrder::LsbFirst
        }
    }

    /// Build a crosshair cursor from the standard cursor font.
    fn crosshair_cursor(&self) -> Result<Cursor, ReplyOrIdError> {
        let font = self.conn.generate_id()?;
        self.conn.open_font(font, b"cursor")?;
        let cursor = self.conn.generate_id()?;
        self.conn.create_glyph_cursor(
            cursor,
            font,
            font,
            XC_CROSSHAIR,
            XC_CROSSHAIR + 1,
            0,
            0,
            0,
            u16::MAX,
            u16::MAX,
            u16::MAX,
        )?;
        self.conn.close_font(font)?;
        Ok(cursor)
    }

    fn free_cursor(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            if let Err(err) = self.conn.free_cursor(cursor) {
                warn!("failed to free selection cursor: {err}");
            }
        }
    }
}

impl DisplayBackend for X11Backend {
    fn root(&self) -> WindowId {
        self.root
    }

    fn get_geometry(&self, window: WindowId) -> Result<Geometry, GeometryError> {
        let reply = self.conn.get_geometry(window)?.reply().map_err(|err| match err {
            x11rb::errors::ReplyError::X11Error(ref x11)
                if matches!(x11.error_kind, ErrorKind::Window | ErrorKind::Drawable) =>
            {
                GeometryError::WindowNotFound(window)
            }
            other => GeometryError::Protocol(other),
        })?;
        Ok(Geometry {
            x: reply.x,
            y: reply.y,
            width: reply.width,
            height: reply.height,
            depth: reply.depth,
        })
    }

    fn get_pixels(&self, window: WindowId, rect: Geometry) -> Result<PixelBuffer, CaptureError> {
        let attributes = self.conn.get_window_attributes(window)?.reply()?;
        if attributes.map_state != MapState::VIEWABLE {
            return Err(CaptureError::Unmapped(window));
        }
        if rect.is_empty() {
            return Err(CaptureError::EmptyGeometry(window));
        }

        let image = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                window,
                0,
                0,
                rect.width,
                rect.height,
                u32::MAX,
            )?
            .reply()
            .map_err(|err| match err {
                x11rb::errors::ReplyError::X11Error(ref x11)
                    if x11.error_kind == ErrorKind::Match =>
                {
                    CaptureError::NotReadable(window)
                }
                other => CaptureError::Protocol(other),
            })?;

        let masks =
            self.visual_masks(image.visual).ok_or(CaptureError::UnknownVisual(image.visual))?;
        let format =
            self.pixmap_format(image.depth).ok_or(CaptureError::UnsupportedDepth(image.depth))?;
        debug!(
            "fetched {}x{} pixels from {window:#x}: depth {}, {} bpp, masks {:x}/{:x}/{:x}",
            rect.width, rect.height, image.depth, format.bits_per_pixel, masks.red, masks.green,
            masks.blue
        );

        Ok(PixelBuffer::new(
            image.data,
            rect.width,
            rect.height,
            image.depth,
            format.bits_per_pixel,
            format.scanline_pad,
            self.server_byte_order(),
            masks,
        )?)
    }

    fn grab_pointer(&mut self) -> Result<(), GrabError> {
        let cursor = match self.crosshair_cursor() {
            Ok(cursor) => {
                self.cursor = Some(cursor);
                cursor
            }
            Err(err) => {
                // The grab works fine without a custom cursor shape.
                warn!("could not create crosshair cursor: {err}");
                x11rb::NONE
            }
        };

        let reply = self
            .conn
            .grab_pointer(
                false,
                self.root,
                EventMask::BUTTON_PRESS,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                cursor,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;

        if reply.status == GrabStatus::SUCCESS {
            debug!("pointer grab acquired on root {:#x}", self.root);
            Ok(())
        } else {
            self.free_cursor();
            if reply.status == GrabStatus::ALREADY_GRABBED {
                Err(GrabError::AlreadyGrabbed)
            } else {
                Err(GrabError::Refused(reply.status))
            }
        }
    }

    fn ungrab_pointer(&mut self) {
        let released = self
            .conn
            .ungrab_pointer(x11rb::CURRENT_TIME)
            .and_then(|_| self.conn.flush());
        if let Err(err) = released {
            warn!("failed to release pointer grab: {err}");
        } else {
            debug!("pointer grab released");
        }
        self.free_cursor();
    }

    fn wait_event(&mut self, cancel: &CancelToken) -> Result<SelectionEvent, SelectionError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(SelectionEvent::Cancel);
            }
            match self.conn.poll_for_event()? {
                Some(Event::ButtonPress(press)) => {
                    if press.detail == 1 {
                        return Ok(SelectionEvent::Press { x: press.root_x, y: press.root_y });
                    }
                    return Ok(SelectionEvent::Cancel);
                }
                Some(Event::KeyPress(_)) => return Ok(SelectionEvent::Cancel),
                Some(_) => {}
                None => thread::sleep(EVENT_POLL_INTERVAL),
            }
        }
    }

    fn query_tree(&self, window: WindowId) -> Result<Vec<WindowId>, SelectionError> {
        Ok(self.conn.query_tree(window)?.reply()?.children)
    }

    fn is_viewable(&self, window: WindowId) -> Result<bool, SelectionError> {
        Ok(self.conn.get_window_attributes(window)?.reply()?.map_state == MapState::VIEWABLE)
    }
}
