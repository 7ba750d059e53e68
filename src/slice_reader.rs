use crate::{ang_reader::AngReader, ctf_reader::CtfReader, enums::Attribute};

use std::path::Path;
use thiserror::Error;

/// Failure reported by a [`SliceReader`]. The code is always negative and is
/// passed through the assembler unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct SliceReadError {
    pub code: i32,
    pub message: String,
}

impl SliceReadError {
    pub const CANNOT_OPEN: i32 = -100;
    pub const MISSING_DIMENSIONS: i32 = -200;
    pub const GRID_NOT_SET: i32 = -300;
    pub const UNSUPPORTED_GRID: i32 = -400;
    pub const MALFORMED_LINE: i32 = -500;
    pub const PREMATURE_END: i32 = -600;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn cannot_open(path: &Path, err: std::io::Error) -> Self {
        Self::new(
            Self::CANNOT_OPEN,
            format!("{} could not be opened: {err}", path.display()),
        )
    }
}

/// Crystallographic phase entry from a slice header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseInfo {
    pub index: i32,
    pub material_name: String,
    pub formula: String,
    pub symmetry: u32,
    pub lattice_constants: [f32; 6],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceHeader {
    /// Grid width in points
    pub num_cols: usize,
    /// Grid height in points
    pub num_rows: usize,
    pub x_step: f32,
    pub y_step: f32,
    pub phases: Vec<PhaseInfo>,
}

/// Most points a reader reserves up front. Larger grids grow as data lines
/// are read, so a corrupt header cannot trigger a huge allocation.
const PREALLOCATED_POINTS: usize = 1 << 16;

impl SliceHeader {
    /// Points in the grid, `None` when `num_cols * num_rows` overflows
    pub fn num_points(&self) -> Option<usize> {
        self.num_cols.checked_mul(self.num_rows)
    }

    pub(crate) fn checked_num_points(&self) -> Result<usize, SliceReadError> {
        self.num_points().ok_or_else(|| {
            SliceReadError::new(
                SliceReadError::MISSING_DIMENSIONS,
                format!(
                    "grid of {} x {} points is too large",
                    self.num_cols, self.num_rows
                ),
            )
        })
    }
}

/// Capacity to reserve for `total` points
pub(crate) fn initial_capacity(total: usize) -> usize {
    total.min(PREALLOCATED_POINTS)
}

/// All arrays of one slice in row-major reading order. Arrays the file does
/// not carry are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceData {
    pub header: SliceHeader,
    pub euler1: Option<Vec<f32>>,
    pub euler2: Option<Vec<f32>>,
    pub euler3: Option<Vec<f32>>,
    pub x_position: Option<Vec<f32>>,
    pub y_position: Option<Vec<f32>>,
    pub image_quality: Option<Vec<f32>>,
    pub confidence_index: Option<Vec<f32>>,
    pub phase: Option<Vec<i32>>,
    pub sem_signal: Option<Vec<f32>>,
    pub fit: Option<Vec<f32>>,
}

impl SliceData {
    pub fn new(header: SliceHeader) -> Self {
        Self {
            header,
            ..Default::default()
        }
    }

    /// Float array for `attribute`. Always `None` for [`Attribute::Phase`],
    /// use [`SliceData::phase`] instead.
    pub fn float_array(&self, attribute: Attribute) -> Option<&[f32]> {
        let array = match attribute {
            Attribute::Euler1 => &self.euler1,
            Attribute::Euler2 => &self.euler2,
            Attribute::Euler3 => &self.euler3,
            Attribute::XPosition => &self.x_position,
            Attribute::YPosition => &self.y_position,
            Attribute::ImageQuality => &self.image_quality,
            Attribute::ConfidenceIndex => &self.confidence_index,
            Attribute::SemSignal => &self.sem_signal,
            Attribute::Fit => &self.fit,
            Attribute::Phase => return None,
        };
        array.as_deref()
    }
}

/// Reads one slice file of a stack.
///
/// `slice` is the zero-based position of the file in the list being
/// assembled. File based readers only use it for diagnostics.
pub trait SliceReader {
    /// Read grid dimensions and phase metadata only
    fn read_header(&self, path: &Path, slice: usize) -> Result<SliceHeader, SliceReadError>;

    /// Read the header and every attribute array of the slice
    fn read_file(&self, path: &Path, slice: usize) -> Result<SliceData, SliceReadError>;
}

impl<R: SliceReader + ?Sized> SliceReader for &R {
    fn read_header(&self, path: &Path, slice: usize) -> Result<SliceHeader, SliceReadError> {
        (**self).read_header(path, slice)
    }

    fn read_file(&self, path: &Path, slice: usize) -> Result<SliceData, SliceReadError> {
        (**self).read_file(path, slice)
    }
}

impl<R: SliceReader + ?Sized> SliceReader for Box<R> {
    fn read_header(&self, path: &Path, slice: usize) -> Result<SliceHeader, SliceReadError> {
        (**self).read_header(path, slice)
    }

    fn read_file(&self, path: &Path, slice: usize) -> Result<SliceData, SliceReadError> {
        (**self).read_file(path, slice)
    }
}

/// Reader for a scan file extension (without the dot)
pub fn reader_for_extension(extension: &str) -> Option<Box<dyn SliceReader + Send + Sync>> {
    if extension.eq_ignore_ascii_case("ang") {
        Some(Box::new(AngReader))
    } else if extension.eq_ignore_ascii_case("ctf") {
        Some(Box::new(CtfReader))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_lookup_is_case_insensitive() {
        assert!(reader_for_extension("ang").is_some());
        assert!(reader_for_extension("CTF").is_some());
        assert!(reader_for_extension("h5ebsd").is_none());
    }

    #[test]
    fn oversized_grid_has_no_point_count() {
        let header = SliceHeader {
            num_cols: usize::MAX,
            num_rows: 2,
            ..Default::default()
        };
        assert_eq!(header.num_points(), None);
        let err = header.checked_num_points().unwrap_err();
        assert_eq!(err.code, SliceReadError::MISSING_DIMENSIONS);
        assert_eq!(initial_capacity(1_000_000_000), PREALLOCATED_POINTS);
    }

    #[test]
    fn phase_is_not_a_float_array() {
        let mut data = SliceData::new(SliceHeader::default());
        data.phase = Some(vec![1]);
        assert!(data.float_array(Attribute::Phase).is_none());
    }
}
