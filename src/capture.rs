//! One-shot capture orchestration.
//!
//! Ties the pipeline together: optional delay, geometry lookup, raw pixel
//! fetch, then the streaming encode. The output file is only ever opened
//! after the pixels are already in hand, so a failed fetch leaves the
//! destination untouched.

use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::backend::{
    CancelToken, CaptureError, DisplayBackend, GeometryError, GrabError, SelectionError, WindowId,
};
use crate::display::ConnectionError;
use crate::encoder::{EncodingError, ImageEncoder};
use crate::picker::WindowPicker;
use crate::settings::{CaptureSettings, ConfigError};
use crate::window::WindowHandle;

/// Any fatal error of a capture invocation.
///
/// Each stage keeps its own error type; this enum only aggregates them for
/// the binary's single diagnostic line.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Grab(#[from] GrabError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Source of delay sleeps, abstracted so tests can run on simulated time.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation used by the binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Run the interactive picker through its whole lifecycle.
///
/// The pointer grab is released on every path out of this function,
/// including cancellation and protocol failures.
pub fn pick_window<B: DisplayBackend>(
    backend: &mut B,
    cancel: &CancelToken,
) -> Result<WindowHandle, Error> {
    let mut picker = WindowPicker::new(backend);
    picker.begin()?;
    let outcome = match picker.await_selection(cancel) {
        Ok(point) => picker.resolve(point),
        Err(err) => Err(err),
    };
    picker.end();
    Ok(outcome?)
}

/// Capture `window` and write it to `settings.output`.
pub fn capture_window<B: DisplayBackend, C: Clock>(
    backend: &B,
    clock: &C,
    settings: &CaptureSettings,
    window: WindowId,
) -> Result<(), Error> {
    if !settings.delay.is_zero() {
        debug!("waiting {:?} before reading pixels", settings.delay);
        clock.sleep(settings.delay);
    }

    let handle = WindowHandle::from_id(backend, window)?;
    let buffer = backend.get_pixels(handle.id, handle.geometry)?;
    info!("captured window {} at depth {}", handle, buffer.depth());

    let width = u32::from(buffer.width());
    let height = u32::from(buffer.height());
    let mut encoder = ImageEncoder::open(&settings.output, width, height)?;
    let mut row = Vec::with_capacity(width as usize * 3);
    for y in 0..buffer.height() {
        buffer.fill_rgb_row(y, &mut row);
        encoder.write_row(&row)?;
    }
    encoder.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    use super::*;
    use crate::backend::mock::{MockBackend, test_sample};
    use crate::backend::{Geometry, SelectionEvent};

    /// Advances the mock backend's shared simulated time instead of
    /// sleeping.
    struct FakeClock {
        now: Rc<Cell<u64>>,
    }

    impl Clock for FakeClock {
        fn sleep(&self, duration: Duration) {
            self.now.set(self.now.get() + duration.as_secs());
        }
    }

    fn rect(x: i16, y: i16, width: u16, height: u16) -> Geometry {
        Geometry { x, y, width, height, depth: 24 }
    }

    fn temp_output(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("x11-capture-e2e-{}-{name}", std::process::id()))
    }

    fn settings_for(output: PathBuf, delay: Duration) -> CaptureSettings {
        CaptureSettings { display: None, delay, output, window: None }
    }

    fn decode(path: &Path) -> (png::OutputInfo, Vec<u8>) {
        let decoder = png::Decoder::new(File::open(path).unwrap());
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        buf.truncate(info.buffer_size());
        (info, buf)
    }

    #[test]
    fn captured_file_matches_window_geometry_and_pixels() {
        let mut backend = MockBackend::new(rect(0, 0, 1920, 1200));
        backend.add_window(0x1e0_0007, backend.root, rect(4, 30, 800, 600), true);
        let output = temp_output("dims.png");
        let settings = settings_for(output.clone(), Duration::ZERO);

        capture_window(&backend, &SystemClock, &settings, 0x1e0_0007).unwrap();

        let (info, data) = decode(&output);
        assert_eq!((info.width, info.height), (800, 600));
        assert_eq!(info.color_type, png::ColorType::Rgb);
        assert_eq!(info.bit_depth, png::BitDepth::Eight);

        // Spot-check a few pixels against the mock's deterministic pattern.
        for (x, y) in [(0u32, 0u32), (1, 0), (799, 599), (255, 128)] {
            let sample = test_sample(x, y);
            let offset = ((y * 800 + x) * 3) as usize;
            let expected = [(sample >> 16) as u8, (sample >> 8) as u8, sample as u8];
            assert_eq!(&data[offset..offset + 3], &expected, "pixel ({x}, {y})");
        }
        fs::remove_file(&output).unwrap();
    }

    #[test]
    fn delay_elapses_before_the_pixel_fetch() {
        let mut backend = MockBackend::new(rect(0, 0, 1920, 1200));
        backend.add_window(7, backend.root, rect(0, 0, 2, 2), true);
        let clock = FakeClock { now: backend.now.clone() };
        let output = temp_output("delay.png");
        let settings = settings_for(output.clone(), Duration::from_secs(2));

        capture_window(&backend, &clock, &settings, 7).unwrap();

        assert!(backend.pixels_fetched_at.get().unwrap() >= 2);
        fs::remove_file(&output).unwrap();
    }

    #[test]
    fn unknown_window_id_fails_before_any_output_exists() {
        let backend = MockBackend::new(rect(0, 0, 1920, 1200));
        let output = temp_output("missing.png");
        let settings = settings_for(output.clone(), Duration::ZERO);

        let result = capture_window(&backend, &SystemClock, &settings, 0xbad);
        assert!(matches!(result, Err(Error::Geometry(GeometryError::WindowNotFound(0xbad)))));
        assert!(!output.exists());
    }

    #[test]
    fn unmapped_window_fails_before_any_output_exists() {
        let mut backend = MockBackend::new(rect(0, 0, 1920, 1200));
        backend.add_window(9, backend.root, rect(0, 0, 10, 10), false);
        let output = temp_output("unmapped.png");
        let settings = settings_for(output.clone(), Duration::ZERO);

        let result = capture_window(&backend, &SystemClock, &settings, 9);
        assert!(matches!(result, Err(Error::Capture(CaptureError::Unmapped(9)))));
        assert!(!output.exists());
    }

    #[test]
    fn picker_flow_selects_clicked_window_and_releases_grab() {
        let mut backend = MockBackend::new(rect(0, 0, 1000, 1000));
        backend.add_window(10, 1, rect(0, 0, 100, 100), true);
        backend.add_window(11, 10, rect(10, 10, 50, 50), true);
        backend.events.push_back(SelectionEvent::Press { x: 30, y: 30 });

        let handle = pick_window(&mut backend, &CancelToken::new()).unwrap();
        assert_eq!(handle.id, 11);
        assert_eq!(backend.grabs, 1);
        assert_eq!(backend.ungrabs, 1);
    }

    #[test]
    fn cancelled_pick_releases_grab_and_reports_cancellation() {
        let mut backend = MockBackend::new(rect(0, 0, 1000, 1000));
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = pick_window(&mut backend, &cancel);
        assert!(matches!(result, Err(Error::Selection(SelectionError::Cancelled))));
        assert_eq!(backend.ungrabs, 1);
    }
}
