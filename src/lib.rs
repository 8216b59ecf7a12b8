//! # x11-capture
//!
//! **x11-capture** captures the pixel contents of a single X11 window and
//! writes them to a PNG file. The target window is given either by its
//! numeric id or interactively: the tool grabs the pointer, waits for a
//! click, and resolves the window under the cursor by walking the window
//! tree. Pixels are decoded with the channel masks of the window's visual,
//! so any contiguous mask layout the server uses comes out as canonical
//! 8-bit RGB, and the PNG is written one row at a time.
//!
//! ## Usage
//!
//! ```no_run
//! use x11_capture::capture::{self, SystemClock};
//! use x11_capture::display::X11Backend;
//! use x11_capture::settings::CaptureSettings;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = X11Backend::connect(None)?;
//!     let settings = CaptureSettings::default();
//!
//!     // Capture a known window id into screenshot.png.
//!     capture::capture_window(&backend, &SystemClock, &settings, 0x1e0_0007)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! Interactive selection runs through [`capture::pick_window`], which
//! guarantees the pointer grab is released however the selection ends.
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::inconsistent_struct_constructor)]
#![warn(clippy::must_use_candidate)]
#![warn(clippy::ptr_as_ptr)]
#![warn(clippy::borrow_as_ptr)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]

pub mod backend;
pub mod capture;
pub mod display;
pub mod encoder;
pub mod frame;
pub mod picker;
pub mod settings;
pub mod window;
