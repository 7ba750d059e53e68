//! Reader for TSL/EDAX `.ang` scan files.
//!
//! An `.ang` file starts with `#` prefixed header lines followed by one
//! whitespace separated data line per grid point:
//!
//! ```text
//! phi1 PHI phi2 x y IQ CI phase [SEM signal] [fit]
//! ```
//!
//! Only square grids are supported.

use crate::slice_reader::{
    PhaseInfo, SliceData, SliceHeader, SliceReadError, SliceReader, initial_capacity,
};

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::debug;

const SQUARE_GRID: &str = "SqrGrid";
const HEX_GRID: &str = "HexGrid";

/// Columns every data line must carry
const REQUIRED_COLUMNS: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct AngReader;

#[derive(Default)]
struct RawHeader {
    ncols_odd: i64,
    ncols_even: i64,
    nrows: i64,
    x_step: f32,
    y_step: f32,
    grid: String,
    phases: Vec<PhaseInfo>,
}

impl RawHeader {
    fn parse_line(&mut self, line: &str) {
        let body = line.trim_start_matches('#').trim_start();
        let key_end = body
            .find(|c: char| !(c.is_ascii_alphabetic() || c == '_' || c == '-'))
            .unwrap_or(body.len());
        let (key, rest) = body.split_at(key_end);
        if key.is_empty() {
            return;
        }
        let value = rest.trim_start_matches(':').trim();

        match key {
            "NCOLS_ODD" => self.ncols_odd = value.parse().unwrap_or(-1),
            "NCOLS_EVEN" => self.ncols_even = value.parse().unwrap_or(-1),
            "NROWS" => self.nrows = value.parse().unwrap_or(-1),
            "XSTEP" => self.x_step = value.parse().unwrap_or(0.0),
            "YSTEP" => self.y_step = value.parse().unwrap_or(0.0),
            "GRID" => self.grid = value.to_string(),
            "Phase" => self.phases.push(PhaseInfo {
                index: value.parse().unwrap_or(0),
                ..Default::default()
            }),
            "MaterialName" => {
                if let Some(phase) = self.phases.last_mut() {
                    phase.material_name = value.to_string();
                }
            }
            "Formula" => {
                if let Some(phase) = self.phases.last_mut() {
                    phase.formula = value.to_string();
                }
            }
            "Symmetry" => {
                if let Some(phase) = self.phases.last_mut() {
                    phase.symmetry = value.parse().unwrap_or(0);
                }
            }
            "LatticeConstants" => {
                if let Some(phase) = self.phases.last_mut() {
                    for (slot, token) in phase
                        .lattice_constants
                        .iter_mut()
                        .zip(value.split_whitespace())
                    {
                        *slot = token.parse().unwrap_or(0.0);
                    }
                }
            }
            _ => debug!(key, "ignoring ang header entry"),
        }
    }

    fn into_header(self) -> Result<SliceHeader, SliceReadError> {
        if self.nrows < 1 {
            return Err(SliceReadError::new(
                SliceReadError::MISSING_DIMENSIONS,
                format!("NROWS must be at least 1, found {}", self.nrows),
            ));
        }
        if self.grid.starts_with(HEX_GRID) {
            return Err(SliceReadError::new(
                SliceReadError::UNSUPPORTED_GRID,
                "ang files with hexagonal grids are not supported",
            ));
        }
        if !self.grid.starts_with(SQUARE_GRID) {
            return Err(SliceReadError::new(
                SliceReadError::GRID_NOT_SET,
                "GRID header entry is missing",
            ));
        }
        let num_cols = if self.ncols_even > 0 {
            self.ncols_even
        } else {
            self.ncols_odd
        };
        if num_cols < 1 {
            return Err(SliceReadError::new(
                SliceReadError::MISSING_DIMENSIONS,
                "neither NCOLS_EVEN nor NCOLS_ODD is set",
            ));
        }

        let header = SliceHeader {
            num_cols: num_cols as usize,
            num_rows: self.nrows as usize,
            x_step: self.x_step,
            y_step: self.y_step,
            phases: self.phases,
        };
        header.checked_num_points()?;
        Ok(header)
    }
}

impl AngReader {
    /// Parse an `.ang` stream. With `header_only` the data section is not
    /// touched and every array of the result is `None`.
    pub fn read_from<R: BufRead>(
        input: R,
        header_only: bool,
    ) -> Result<SliceData, SliceReadError> {
        let mut lines = input.lines();
        let mut raw = RawHeader::default();
        let mut first_data_line = None;

        for line in lines.by_ref() {
            let line = line.map_err(|err| {
                SliceReadError::new(SliceReadError::MALFORMED_LINE, err.to_string())
            })?;
            if line.starts_with('#') {
                raw.parse_line(&line);
            } else {
                first_data_line = Some(line);
                break;
            }
        }

        let header = raw.into_header()?;
        if header_only {
            return Ok(SliceData::new(header));
        }

        let total = header.checked_num_points()?;
        let capacity = initial_capacity(total);
        let mut euler1 = Vec::with_capacity(capacity);
        let mut euler2 = Vec::with_capacity(capacity);
        let mut euler3 = Vec::with_capacity(capacity);
        let mut x_position = Vec::with_capacity(capacity);
        let mut y_position = Vec::with_capacity(capacity);
        let mut image_quality = Vec::with_capacity(capacity);
        let mut confidence_index = Vec::with_capacity(capacity);
        let mut phase = Vec::with_capacity(capacity);
        let mut sem_signal = Vec::with_capacity(capacity);
        let mut fit = Vec::with_capacity(capacity);
        let mut num_fields = None;

        let data_lines = first_data_line.into_iter().map(Ok).chain(lines);
        for (line_number, line) in data_lines.enumerate() {
            if euler1.len() == total {
                break;
            }
            let line = line.map_err(|err| {
                SliceReadError::new(SliceReadError::MALFORMED_LINE, err.to_string())
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            let fields = *num_fields.get_or_insert(tokens.len());
            if tokens.len() < REQUIRED_COLUMNS || tokens.len() < fields {
                return Err(SliceReadError::new(
                    SliceReadError::MALFORMED_LINE,
                    format!(
                        "data line {} has {} columns, expected {}",
                        line_number + 1,
                        tokens.len(),
                        fields.max(REQUIRED_COLUMNS)
                    ),
                ));
            }

            let float = |column: usize| -> Result<f32, SliceReadError> {
                tokens[column].parse::<f32>().map_err(|_| {
                    SliceReadError::new(
                        SliceReadError::MALFORMED_LINE,
                        format!(
                            "data line {} column {} is not a number: '{}'",
                            line_number + 1,
                            column + 1,
                            tokens[column]
                        ),
                    )
                })
            };

            euler1.push(float(0)?);
            euler2.push(float(1)?);
            euler3.push(float(2)?);
            x_position.push(float(3)?);
            y_position.push(float(4)?);
            image_quality.push(float(5)?);
            confidence_index.push(float(6)?);
            phase.push(match tokens[7].parse::<i32>() {
                Ok(value) => value,
                Err(_) => float(7)? as i32,
            });
            if fields > 8 {
                sem_signal.push(float(8)?);
            }
            if fields > 9 {
                fit.push(float(9)?);
            }
        }

        if euler1.len() != total {
            return Err(SliceReadError::new(
                SliceReadError::PREMATURE_END,
                format!(
                    "premature end of file: NROWS={} NCOLS={} but only {} of {} points were read",
                    header.num_rows,
                    header.num_cols,
                    euler1.len(),
                    total
                ),
            ));
        }

        let fields = num_fields.unwrap_or(REQUIRED_COLUMNS);
        Ok(SliceData {
            header,
            euler1: Some(euler1),
            euler2: Some(euler2),
            euler3: Some(euler3),
            x_position: Some(x_position),
            y_position: Some(y_position),
            image_quality: Some(image_quality),
            confidence_index: Some(confidence_index),
            phase: Some(phase),
            sem_signal: (fields > 8).then_some(sem_signal),
            fit: (fields > 9).then_some(fit),
        })
    }

    fn open(path: &Path) -> Result<BufReader<File>, SliceReadError> {
        File::open(path)
            .map(BufReader::new)
            .map_err(|err| SliceReadError::cannot_open(path, err))
    }
}

impl SliceReader for AngReader {
    fn read_header(&self, path: &Path, slice: usize) -> Result<SliceHeader, SliceReadError> {
        debug!(slice, path = %path.display(), "reading ang header");
        Self::read_from(Self::open(path)?, true).map(|data| data.header)
    }

    fn read_file(&self, path: &Path, slice: usize) -> Result<SliceData, SliceReadError> {
        debug!(slice, path = %path.display(), "reading ang file");
        Self::read_from(Self::open(path)?, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "\
# TEM_PIXperUM          1.000000
# x-star                0.500000
#
# Phase 1
# MaterialName  \tNickel
# Formula     \tNi
# Symmetry              43
# LatticeConstants      3.560 3.560 3.560  90.000  90.000  90.000
#
# GRID: SqrGrid
# XSTEP: 0.250000
# YSTEP: 0.500000
# NCOLS_ODD: 3
# NCOLS_EVEN: 3
# NROWS: 2
#
";

    fn ten_column_body() -> String {
        (0..6)
            .map(|i| {
                format!(
                    "  {i}.0 0.5 0.25 {x} {y} 100.{i} 0.9 {phase} 1.0 2.0\n",
                    x = i % 3,
                    y = i / 3,
                    phase = i % 2
                )
            })
            .collect()
    }

    #[test]
    fn parses_header_and_phase_metadata() {
        let data = AngReader::read_from(Cursor::new(HEADER), true).unwrap();
        let header = data.header;
        assert_eq!((header.num_cols, header.num_rows), (3, 2));
        assert_eq!(header.x_step, 0.25);
        assert_eq!(header.y_step, 0.5);
        assert_eq!(header.phases.len(), 1);
        let phase = &header.phases[0];
        assert_eq!(phase.index, 1);
        assert_eq!(phase.material_name, "Nickel");
        assert_eq!(phase.formula, "Ni");
        assert_eq!(phase.symmetry, 43);
        assert_eq!(phase.lattice_constants[0], 3.56);
        assert_eq!(phase.lattice_constants[5], 90.0);
        assert!(data.euler1.is_none());
    }

    #[test]
    fn reads_all_ten_columns_in_row_major_order() {
        let text = format!("{HEADER}{}", ten_column_body());
        let data = AngReader::read_from(Cursor::new(text), false).unwrap();

        assert_eq!(data.euler1.as_deref(), Some(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0][..]));
        assert_eq!(data.x_position.as_deref(), Some(&[0.0, 1.0, 2.0, 0.0, 1.0, 2.0][..]));
        assert_eq!(data.phase.as_deref(), Some(&[0, 1, 0, 1, 0, 1][..]));
        assert_eq!(data.sem_signal.as_ref().map(Vec::len), Some(6));
        assert_eq!(data.fit.as_ref().map(Vec::len), Some(6));
    }

    #[test]
    fn eight_column_files_have_no_sem_or_fit() {
        let body: String = (0..6).map(|_| "1 2 3 4 5 6 7 1\n").collect();
        let data = AngReader::read_from(Cursor::new(format!("{HEADER}{body}")), false).unwrap();
        assert!(data.sem_signal.is_none());
        assert!(data.fit.is_none());
        assert_eq!(data.confidence_index.as_deref(), Some(&[7.0; 6][..]));
    }

    #[test]
    fn short_file_is_premature_end() {
        let body: String = (0..4).map(|_| "1 2 3 4 5 6 7 1\n").collect();
        let err = AngReader::read_from(Cursor::new(format!("{HEADER}{body}")), false).unwrap_err();
        assert_eq!(err.code, SliceReadError::PREMATURE_END);
    }

    #[test]
    fn garbage_value_is_malformed() {
        let body: String = (0..6).map(|_| "1 2 x 4 5 6 7 1\n").collect();
        let err = AngReader::read_from(Cursor::new(format!("{HEADER}{body}")), false).unwrap_err();
        assert_eq!(err.code, SliceReadError::MALFORMED_LINE);
    }

    #[test]
    fn header_errors_follow_reader_codes() {
        let no_rows = HEADER.replace("# NROWS: 2", "# NROWS: 0");
        let err = AngReader::read_from(Cursor::new(no_rows), true).unwrap_err();
        assert_eq!(err.code, SliceReadError::MISSING_DIMENSIONS);

        let hex = HEADER.replace("SqrGrid", "HexGrid");
        let err = AngReader::read_from(Cursor::new(hex), true).unwrap_err();
        assert_eq!(err.code, SliceReadError::UNSUPPORTED_GRID);

        let no_grid = HEADER.replace("# GRID: SqrGrid\n", "");
        let err = AngReader::read_from(Cursor::new(no_grid), true).unwrap_err();
        assert_eq!(err.code, SliceReadError::GRID_NOT_SET);
    }

    #[test]
    fn overflowing_grid_is_missing_dimensions() {
        let huge = HEADER
            .replace("# NCOLS_EVEN: 3", "# NCOLS_EVEN: 5000000000")
            .replace("# NROWS: 2", "# NROWS: 5000000000");
        let err = AngReader::read_from(Cursor::new(huge), false).unwrap_err();
        assert_eq!(err.code, SliceReadError::MISSING_DIMENSIONS);
    }

    #[test]
    fn huge_grid_is_not_preallocated() {
        let huge = HEADER
            .replace("# NCOLS_EVEN: 3", "# NCOLS_EVEN: 1000000")
            .replace("# NROWS: 2", "# NROWS: 1000000");
        let text = format!("{huge}{}", ten_column_body());
        let err = AngReader::read_from(Cursor::new(text), false).unwrap_err();
        assert_eq!(err.code, SliceReadError::PREMATURE_END);
    }

    #[test]
    fn missing_file_cannot_be_opened() {
        let err = AngReader
            .read_file(Path::new("/definitely/not/here.ang"), 0)
            .unwrap_err();
        assert_eq!(err.code, SliceReadError::CANNOT_OPEN);
    }
}
