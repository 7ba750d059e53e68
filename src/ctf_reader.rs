//! Reader for HKL/Oxford Channel 5 `.ctf` scan files.
//!
//! Header and data are tab separated. The data section starts after the
//! column line (`Phase X Y Bands Error Euler1 Euler2 Euler3 MAD BC BS`).
//! Euler angles are stored in degrees and converted to radians so that they
//! line up with `.ang` data. Band contrast becomes image quality and MAD
//! becomes fit; confidence index and SEM signal do not exist in this format.

use crate::slice_reader::{
    PhaseInfo, SliceData, SliceHeader, SliceReadError, SliceReader, initial_capacity,
};

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct CtfReader;

/// Column positions resolved from the column header line
struct Columns {
    phase: usize,
    x: usize,
    y: usize,
    euler: [usize; 3],
    mad: Option<usize>,
    bc: Option<usize>,
}

impl Columns {
    fn from_header_line(line: &str) -> Result<Self, SliceReadError> {
        let names: Vec<&str> = line.split('\t').map(str::trim).collect();
        let find = |name: &str| names.iter().position(|column| *column == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                SliceReadError::new(
                    SliceReadError::MALFORMED_LINE,
                    format!("ctf column '{name}' is missing"),
                )
            })
        };

        Ok(Self {
            phase: require("Phase")?,
            x: require("X")?,
            y: require("Y")?,
            euler: [require("Euler1")?, require("Euler2")?, require("Euler3")?],
            mad: find("MAD"),
            bc: find("BC"),
        })
    }

    fn width(&self) -> usize {
        [self.phase, self.x, self.y]
            .into_iter()
            .chain(self.euler)
            .chain(self.mad)
            .chain(self.bc)
            .max()
            .unwrap_or(0)
            + 1
    }
}

fn parse_phase_line(index: i32, line: &str) -> PhaseInfo {
    let tokens: Vec<&str> = line.split('\t').collect();
    let mut phase = PhaseInfo {
        index,
        ..Default::default()
    };
    let lengths = tokens.first().map(|t| t.split(';')).into_iter().flatten();
    let angles = tokens.get(1).map(|t| t.split(';')).into_iter().flatten();
    for (slot, token) in phase.lattice_constants.iter_mut().zip(lengths.chain(angles)) {
        *slot = token.trim().parse().unwrap_or(0.0);
    }
    phase.material_name = tokens.get(2).map(|t| t.trim().to_string()).unwrap_or_default();
    phase.symmetry = tokens
        .get(3)
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(0);
    phase
}

impl CtfReader {
    pub fn read_from<R: BufRead>(
        input: R,
        header_only: bool,
    ) -> Result<SliceData, SliceReadError> {
        let mut lines = input.lines();
        let mut next_line = || -> Option<Result<String, SliceReadError>> {
            lines.next().map(|line| {
                line.map_err(|err| {
                    SliceReadError::new(SliceReadError::MALFORMED_LINE, err.to_string())
                })
            })
        };

        let mut x_cells = 0usize;
        let mut y_cells = 0usize;
        let mut x_step = 0.0f32;
        let mut y_step = 0.0f32;
        let mut phases = Vec::new();
        let mut columns = None;

        while let Some(line) = next_line() {
            let line = line?;
            let mut tokens = line.split('\t');
            let key = tokens.next().unwrap_or_default().trim();
            let value = tokens.next().unwrap_or_default().trim();
            match key {
                "XCells" => x_cells = value.parse().unwrap_or(0),
                "YCells" => y_cells = value.parse().unwrap_or(0),
                "XStep" => x_step = value.parse().unwrap_or(0.0),
                "YStep" => y_step = value.parse().unwrap_or(0.0),
                "Phases" => {
                    let count: i32 = value.parse().unwrap_or(0);
                    for index in 1..=count {
                        match next_line() {
                            Some(phase_line) => phases.push(parse_phase_line(index, &phase_line?)),
                            None => break,
                        }
                    }
                }
                "Phase" => {
                    columns = Some(Columns::from_header_line(&line)?);
                    break;
                }
                _ => {}
            }
        }

        if x_cells == 0 || y_cells == 0 {
            return Err(SliceReadError::new(
                SliceReadError::MISSING_DIMENSIONS,
                format!("XCells ({x_cells}) and YCells ({y_cells}) must both be set"),
            ));
        }
        let header = SliceHeader {
            num_cols: x_cells,
            num_rows: y_cells,
            x_step,
            y_step,
            phases,
        };
        let total = header.checked_num_points()?;
        if header_only {
            return Ok(SliceData::new(header));
        }

        let columns = columns.ok_or_else(|| {
            SliceReadError::new(SliceReadError::MALFORMED_LINE, "ctf column line not found")
        })?;
        let capacity = initial_capacity(total);
        let mut euler = [
            Vec::with_capacity(capacity),
            Vec::with_capacity(capacity),
            Vec::with_capacity(capacity),
        ];
        let mut x_position = Vec::with_capacity(capacity);
        let mut y_position = Vec::with_capacity(capacity);
        let mut phase = Vec::with_capacity(capacity);
        let mut image_quality = Vec::with_capacity(capacity);
        let mut fit = Vec::with_capacity(capacity);
        let width = columns.width();

        while phase.len() < total {
            let Some(line) = next_line() else { break };
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split('\t').map(str::trim).collect();
            if tokens.len() < width {
                return Err(SliceReadError::new(
                    SliceReadError::MALFORMED_LINE,
                    format!("data line has {} columns, expected {width}", tokens.len()),
                ));
            }
            let float = |column: usize| -> Result<f32, SliceReadError> {
                tokens[column].parse::<f32>().map_err(|_| {
                    SliceReadError::new(
                        SliceReadError::MALFORMED_LINE,
                        format!("column {} is not a number: '{}'", column + 1, tokens[column]),
                    )
                })
            };

            phase.push(float(columns.phase)? as i32);
            x_position.push(float(columns.x)?);
            y_position.push(float(columns.y)?);
            for (array, column) in euler.iter_mut().zip(columns.euler) {
                array.push(float(column)?.to_radians());
            }
            if let Some(column) = columns.bc {
                image_quality.push(float(column)?);
            }
            if let Some(column) = columns.mad {
                fit.push(float(column)?);
            }
        }

        if phase.len() != total {
            return Err(SliceReadError::new(
                SliceReadError::PREMATURE_END,
                format!(
                    "premature end of file: {} of {total} points were read",
                    phase.len()
                ),
            ));
        }

        let [euler1, euler2, euler3] = euler;
        Ok(SliceData {
            euler1: Some(euler1),
            euler2: Some(euler2),
            euler3: Some(euler3),
            x_position: Some(x_position),
            y_position: Some(y_position),
            phase: Some(phase),
            image_quality: columns.bc.map(|_| image_quality),
            fit: columns.mad.map(|_| fit),
            ..SliceData::new(header)
        })
    }

    fn open(path: &Path) -> Result<BufReader<File>, SliceReadError> {
        File::open(path)
            .map(BufReader::new)
            .map_err(|err| SliceReadError::cannot_open(path, err))
    }
}

impl SliceReader for CtfReader {
    fn read_header(&self, path: &Path, slice: usize) -> Result<SliceHeader, SliceReadError> {
        debug!(slice, path = %path.display(), "reading ctf header");
        Self::read_from(Self::open(path)?, true).map(|data| data.header)
    }

    fn read_file(&self, path: &Path, slice: usize) -> Result<SliceData, SliceReadError> {
        debug!(slice, path = %path.display(), "reading ctf file");
        Self::read_from(Self::open(path)?, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "Channel Text File\n\
Prj\tsample\n\
JobMode\tGrid\n\
XCells\t2\n\
YCells\t2\n\
XStep\t0.5\n\
YStep\t0.75\n\
Phases\t2\n\
3.524;3.524;3.524\t90;90;90\tNickel\t11\t225\n\
2.950;2.950;4.680\t90;90;120\tTitanium\t9\t194\n\
Phase\tX\tY\tBands\tError\tEuler1\tEuler2\tEuler3\tMAD\tBC\tBS\n";

    #[test]
    fn parses_header_and_phases() {
        let header = CtfReader::read_from(Cursor::new(HEADER), true).unwrap().header;
        assert_eq!((header.num_cols, header.num_rows), (2, 2));
        assert_eq!((header.x_step, header.y_step), (0.5, 0.75));
        assert_eq!(header.phases.len(), 2);
        assert_eq!(header.phases[1].index, 2);
        assert_eq!(header.phases[1].material_name, "Titanium");
        assert_eq!(header.phases[1].symmetry, 9);
        assert_eq!(header.phases[1].lattice_constants[2], 4.68);
        assert_eq!(header.phases[1].lattice_constants[5], 120.0);
    }

    #[test]
    fn maps_columns_and_converts_degrees() {
        let body = "\
1\t0\t0\t8\t0\t180\t90\t0\t0.5\t120\t200\n\
2\t0.5\t0\t8\t0\t0\t0\t0\t0.4\t110\t200\n\
0\t0\t0.75\t0\t3\t0\t0\t0\t0\t0\t0\n\
1\t0.5\t0.75\t8\t0\t0\t0\t360\t0.3\t100\t200\n";
        let data = CtfReader::read_from(Cursor::new(format!("{HEADER}{body}")), false).unwrap();

        assert_eq!(data.phase.as_deref(), Some(&[1, 2, 0, 1][..]));
        assert_eq!(data.x_position.as_deref(), Some(&[0.0, 0.5, 0.0, 0.5][..]));
        let euler1 = data.euler1.unwrap();
        assert!((euler1[0] - std::f32::consts::PI).abs() < 1e-6);
        assert_eq!(data.image_quality.as_deref(), Some(&[120.0, 110.0, 0.0, 100.0][..]));
        assert_eq!(data.fit.as_deref(), Some(&[0.5, 0.4, 0.0, 0.3][..]));
        assert!(data.confidence_index.is_none());
        assert!(data.sem_signal.is_none());
    }

    #[test]
    fn missing_cells_is_an_error() {
        let text = HEADER.replace("XCells\t2\n", "");
        let err = CtfReader::read_from(Cursor::new(text), true).unwrap_err();
        assert_eq!(err.code, SliceReadError::MISSING_DIMENSIONS);
    }

    #[test]
    fn truncated_data_is_premature_end() {
        let body = "1\t0\t0\t8\t0\t0\t0\t0\t0.5\t120\t200\n";
        let err = CtfReader::read_from(Cursor::new(format!("{HEADER}{body}")), false).unwrap_err();
        assert_eq!(err.code, SliceReadError::PREMATURE_END);
    }

    #[test]
    fn oversized_grid_is_rejected_before_reading_data() {
        let text = HEADER
            .replace("XCells\t2\n", "XCells\t5000000000\n")
            .replace("YCells\t2\n", "YCells\t5000000000\n");
        let err = CtfReader::read_from(Cursor::new(text), true).unwrap_err();
        assert_eq!(err.code, SliceReadError::MISSING_DIMENSIONS);
    }

    #[test]
    fn huge_grid_with_short_data_is_premature_end() {
        let text = HEADER
            .replace("XCells\t2\n", "XCells\t1000000\n")
            .replace("YCells\t2\n", "YCells\t1000000\n");
        let body = "1\t0\t0\t8\t0\t0\t0\t0\t0.5\t120\t200\n";
        let err = CtfReader::read_from(Cursor::new(format!("{text}{body}")), false).unwrap_err();
        assert_eq!(err.code, SliceReadError::PREMATURE_END);
    }
}
