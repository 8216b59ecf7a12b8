//! Streaming PNG output.
//!
//! Rows are compressed and written as they arrive, so peak encode memory is
//! one row rather than the whole image. The encoder writes to a `.part`
//! sibling of the destination and renames it into place in
//! [`ImageEncoder::finalize`]; until then nothing ever exists under the
//! final name, and an abandoned encoder removes the part-file on drop.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use log::{debug, info};

/// The output file or PNG stream could not be produced.
#[derive(thiserror::Error, Debug)]
pub enum EncodingError {
    #[error("image dimensions {width}x{height} cannot be encoded")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("row holds {actual} bytes, expected {expected}")]
    BadRowLength { expected: usize, actual: usize },
    #[error("received more than the {0} rows declared in the header")]
    TooManyRows(u32),
    #[error("only {written} of {expected} rows were written")]
    MissingRows { written: u32, expected: u32 },
    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Encodes RGB rows into a PNG file, one row at a time.
///
/// The stream is 8 bits per channel, RGB, non-interlaced. `write_row` must
/// be called exactly `height` times top-to-bottom, then `finalize` publishes
/// the file under its final name.
pub struct ImageEncoder {
    stream: Option<png::StreamWriter<'static, BufWriter<File>>>,
    row_len: usize,
    height: u32,
    rows_written: u32,
    part_path: PathBuf,
    path: PathBuf,
    finished: bool,
}

impl ImageEncoder {
    /// Create the part-file and write the PNG header.
    ///
    /// Fails without leaving anything behind: dimension validation happens
    /// before the filesystem is touched, and a header-write failure removes
    /// the just-created part-file.
    pub fn open(path: &Path, width: u32, height: u32) -> Result<Self, EncodingError> {
        if width == 0 || height == 0 {
            return Err(EncodingError::InvalidDimensions { width, height });
        }

        let part_path = part_path_for(path);
        let file = File::create(&part_path)?;

        let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let stream = encoder
            .write_header()
            .and_then(png::Writer::into_stream_writer)
            .map_err(|err| {
                let _ = fs::remove_file(&part_path);
                err
            })?;

        debug!("encoding {width}x{height} PNG into {}", part_path.display());
        Ok(Self {
            stream: Some(stream),
            row_len: width as usize * 3,
            height,
            rows_written: 0,
            part_path,
            path: path.to_path_buf(),
            finished: false,
        })
    }

    /// Append one row of `width * 3` RGB bytes.
    pub fn write_row(&mut self, row: &[u8]) -> Result<(), EncodingError> {
        if row.len() != self.row_len {
            return Err(EncodingError::BadRowLength { expected: self.row_len, actual: row.len() });
        }
        if self.rows_written == self.height {
            return Err(EncodingError::TooManyRows(self.height));
        }
        if let Some(stream) = self.stream.as_mut() {
            stream.write_all(row)?;
        }
        self.rows_written += 1;
        Ok(())
    }

    /// Write the trailing PNG structure, flush, and move the file to its
    /// final name. Must be the last call.
    pub fn finalize(mut self) -> Result<(), EncodingError> {
        if self.rows_written != self.height {
            return Err(EncodingError::MissingRows {
                written: self.rows_written,
                expected: self.height,
            });
        }
        if let Some(stream) = self.stream.take() {
            stream.finish()?;
        }
        fs::rename(&self.part_path, &self.path)?;
        self.finished = true;
        info!("wrote {}", self.path.display());
        Ok(())
    }
}

impl Drop for ImageEncoder {
    fn drop(&mut self) {
        // Close the stream first, then discard the incomplete file so a
        // failed capture never leaves output under the final name.
        drop(self.stream.take());
        if !self.finished {
            let _ = fs::remove_file(&self.part_path);
        }
    }
}

fn part_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
