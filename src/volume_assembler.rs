use crate::{
    enums::{Attribute, StackingOrder},
    file_list::FileList,
    slice_pattern::{ImportRange, SliceFileDescriptor, resolve_directory},
    slice_reader::{SliceData, SliceReadError, SliceReader, reader_for_extension},
    volume::EbsdVolume,
};

use ndarray::{Array3, ArrayView2, ArrayViewMut2, s};
use std::{
    ops::ControlFlow,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum VolumeAssemblerError {
    #[error("No slice files to assemble")]
    NoSlices,

    #[error("No slice reader for extension '{0}'")]
    UnsupportedExtension(String),

    #[error("{count} slice file(s) missing, first is {first}")]
    MissingFiles { count: usize, first: PathBuf },

    #[error("Stacking order must be low-to-high or high-to-low")]
    UnknownStackingOrder,

    #[error("Volume depth {zpoints} cannot hold {slices} slices")]
    InsufficientDepth { zpoints: usize, slices: usize },

    #[error("Volume of {xpoints}x{ypoints}x{zpoints} points cannot be allocated")]
    VolumeTooLarge {
        xpoints: usize,
        ypoints: usize,
        zpoints: usize,
    },

    #[error("Slice {slice} ({path}) could not be read: {source}")]
    SliceRead {
        slice: usize,
        path: PathBuf,
        #[source]
        source: SliceReadError,
    },

    #[error("Slice {slice} is {width}x{height} points, larger than the {xpoints}x{ypoints} volume")]
    SliceTooLarge {
        slice: usize,
        width: usize,
        height: usize,
        xpoints: usize,
        ypoints: usize,
    },

    #[error("Slice {slice} {attribute:?} array has {found} values, expected {expected}")]
    AttributeLength {
        slice: usize,
        attribute: Attribute,
        found: usize,
        expected: usize,
    },

    #[error("Assembly cancelled after {completed} slice(s)")]
    Cancelled { completed: usize },

    #[error("Assembler has already run (state {0:?})")]
    NotIdle(AssemblyState),
}

impl VolumeAssemblerError {
    /// Reader error code of a failed slice
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::SliceRead { source, .. } => Some(source.code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Idle,
    HeaderScan,
    Allocated,
    Copying { slice: usize },
    Complete,
    Failed,
}

impl AssemblyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyOptions {
    /// Target `(xpoints, ypoints, zpoints)`. Zero or missing X/Y are taken
    /// from the largest slice header, a zero or missing Z from the number of
    /// slices.
    pub dimensions: Option<(usize, usize, usize)>,
    pub stacking_order: StackingOrder,
    pub z_resolution: f32,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            dimensions: None,
            stacking_order: StackingOrder::LowToHigh,
            z_resolution: 1.0,
        }
    }
}

/// Reported after every copied slice
#[derive(Debug, Clone, Copy)]
pub struct SliceProgress<'a> {
    pub slice: usize,
    pub total: usize,
    pub path: &'a Path,
}

/// Stitches per-slice scans into one [`EbsdVolume`].
///
/// An assembler runs once. Slices are read one at a time, in list order,
/// and any failure drops everything allocated so far.
pub struct VolumeAssembler<R> {
    reader: R,
    state: AssemblyState,
}

impl<R: SliceReader> VolumeAssembler<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: AssemblyState::Idle,
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Assemble `files` without progress reporting
    pub fn assemble_all<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        options: &AssemblyOptions,
    ) -> Result<EbsdVolume, VolumeAssemblerError> {
        self.assemble(files, options, |_| ControlFlow::Continue(()))
    }

    /// Assemble `files`, listed from the lowest slice index to the highest.
    ///
    /// `progress` is called after each slice; returning
    /// [`ControlFlow::Break`] aborts with [`VolumeAssemblerError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Fails without returning a partial volume if any slice cannot be read
    /// or does not fit the target footprint.
    pub fn assemble<P, F>(
        &mut self,
        files: &[P],
        options: &AssemblyOptions,
        mut progress: F,
    ) -> Result<EbsdVolume, VolumeAssemblerError>
    where
        P: AsRef<Path>,
        F: FnMut(&SliceProgress<'_>) -> ControlFlow<()>,
    {
        if self.state != AssemblyState::Idle {
            return Err(VolumeAssemblerError::NotIdle(self.state));
        }

        let result = self.run(files, options, &mut progress);
        match &result {
            Ok(volume) => {
                self.transition(AssemblyState::Complete);
                info!(dim = ?volume.dim(), "volume assembled");
            }
            Err(err) => {
                self.transition(AssemblyState::Failed);
                warn!(error = %err, "volume assembly failed");
            }
        }
        result
    }

    fn run<P, F>(
        &mut self,
        files: &[P],
        options: &AssemblyOptions,
        progress: &mut F,
    ) -> Result<EbsdVolume, VolumeAssemblerError>
    where
        P: AsRef<Path>,
        F: FnMut(&SliceProgress<'_>) -> ControlFlow<()>,
    {
        if files.is_empty() {
            return Err(VolumeAssemblerError::NoSlices);
        }
        let low_to_high = match options.stacking_order {
            StackingOrder::LowToHigh => true,
            StackingOrder::HighToLow => false,
            StackingOrder::Unknown => return Err(VolumeAssemblerError::UnknownStackingOrder),
        };

        let (mut xpoints, mut ypoints, mut zpoints) = options.dimensions.unwrap_or_default();
        if xpoints == 0 || ypoints == 0 {
            self.transition(AssemblyState::HeaderScan);
            let (width, height) = self.scan_headers(files)?;
            if xpoints == 0 {
                xpoints = width;
            }
            if ypoints == 0 {
                ypoints = height;
            }
        }
        if zpoints == 0 {
            zpoints = files.len();
        }
        if zpoints < files.len() {
            return Err(VolumeAssemblerError::InsufficientDepth {
                zpoints,
                slices: files.len(),
            });
        }

        info!(
            xpoints,
            ypoints,
            zpoints,
            slices = files.len(),
            order = ?options.stacking_order,
            "allocating volume"
        );
        let mut volume = EbsdVolume::try_zeros(xpoints, ypoints, zpoints).ok_or(
            VolumeAssemblerError::VolumeTooLarge {
                xpoints,
                ypoints,
                zpoints,
            },
        )?;
        self.transition(AssemblyState::Allocated);

        let mut num_phases = None;
        for (slice, file) in files.iter().enumerate() {
            self.transition(AssemblyState::Copying { slice });
            let path = file.as_ref();
            let data = self
                .reader
                .read_file(path, slice)
                .map_err(|source| VolumeAssemblerError::SliceRead {
                    slice,
                    path: path.to_path_buf(),
                    source,
                })?;

            let num_phases = *num_phases.get_or_insert_with(|| {
                volume.phases = data.header.phases.clone();
                volume.resolution = (data.header.x_step, data.header.y_step, options.z_resolution);
                data.header.phases.len()
            });

            let zval = if low_to_high {
                slice
            } else {
                (zpoints - 1) - slice
            };
            Self::copy_slice(&mut volume, &data, slice, zval, num_phases)?;

            let report = SliceProgress {
                slice,
                total: files.len(),
                path,
            };
            if progress(&report).is_break() {
                info!(completed = slice + 1, "volume assembly cancelled");
                return Err(VolumeAssemblerError::Cancelled {
                    completed: slice + 1,
                });
            }
        }

        Ok(volume)
    }

    /// Largest slice width and height over all headers
    fn scan_headers<P: AsRef<Path>>(
        &self,
        files: &[P],
    ) -> Result<(usize, usize), VolumeAssemblerError> {
        files
            .iter()
            .enumerate()
            .try_fold((0, 0), |(width, height), (slice, file)| {
                let path = file.as_ref();
                let header = self.reader.read_header(path, slice).map_err(|source| {
                    VolumeAssemblerError::SliceRead {
                        slice,
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                Ok((width.max(header.num_cols), height.max(header.num_rows)))
            })
    }

    fn copy_slice(
        volume: &mut EbsdVolume,
        data: &SliceData,
        slice: usize,
        zval: usize,
        num_phases: usize,
    ) -> Result<(), VolumeAssemblerError> {
        let (width, height) = (data.header.num_cols, data.header.num_rows);
        let (_, ypoints, xpoints) = volume.dim();
        if width > xpoints || height > ypoints {
            return Err(VolumeAssemblerError::SliceTooLarge {
                slice,
                width,
                height,
                xpoints,
                ypoints,
            });
        }
        let xstart = (xpoints - width) / 2;
        let ystart = (ypoints - height) / 2;
        let footprint = Footprint {
            zval,
            ystart,
            xstart,
            width,
            height,
        };
        debug!(slice, zval, xstart, ystart, width, height, "copying slice");

        for attribute in Attribute::ALL {
            let Some(source) = data.float_array(attribute) else {
                continue;
            };
            let source = source_view(source, &footprint, slice, attribute)?;
            if let Some(destination) = volume.float_array_mut(attribute) {
                footprint.view_mut(destination).assign(&source);
            }
        }

        if let Some(phase) = data.phase.as_deref() {
            let source = source_view(phase, &footprint, slice, Attribute::Phase)?;
            let mut destination = footprint.view_mut(&mut volume.phase);
            destination.assign(&source);
            // Single phase data may carry 0 for unindexed points; ids are 1-based
            if num_phases == 1 {
                destination.mapv_inplace(|id| if id < 1 { 1 } else { id });
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: AssemblyState) {
        debug!(from = ?self.state, to = ?next, "assembler state");
        self.state = next;
    }
}

/// Region of the volume covered by one slice
struct Footprint {
    zval: usize,
    ystart: usize,
    xstart: usize,
    width: usize,
    height: usize,
}

impl Footprint {
    fn view_mut<'a, A>(&self, array: &'a mut Array3<A>) -> ArrayViewMut2<'a, A> {
        array.slice_mut(s![
            self.zval,
            self.ystart..self.ystart + self.height,
            self.xstart..self.xstart + self.width
        ])
    }
}

fn source_view<'a, A>(
    source: &'a [A],
    footprint: &Footprint,
    slice: usize,
    attribute: Attribute,
) -> Result<ArrayView2<'a, A>, VolumeAssemblerError> {
    ArrayView2::from_shape((footprint.height, footprint.width), source).map_err(|_| {
        VolumeAssemblerError::AttributeLength {
            slice,
            attribute,
            found: source.len(),
            expected: footprint.height * footprint.width,
        }
    })
}

/// Assembles stacks straight from a directory, picking the slice reader from
/// the file extension.
pub struct VolumeLoader;

impl VolumeLoader {
    /// Resolve the stack in `directory` and assemble every slice of it
    pub fn load_from_directory(
        directory: impl AsRef<Path>,
        options: &AssemblyOptions,
    ) -> Result<EbsdVolume, VolumeAssemblerError> {
        let directory = directory.as_ref();
        let range = resolve_directory(directory);
        if range.is_empty() {
            return Err(VolumeAssemblerError::NoSlices);
        }
        Self::load_from_range(directory, &range, options)
    }

    /// Assemble the slices `range` describes in `directory`. Every file of
    /// the range must exist.
    pub fn load_from_range(
        directory: impl AsRef<Path>,
        range: &ImportRange,
        options: &AssemblyOptions,
    ) -> Result<EbsdVolume, VolumeAssemblerError> {
        let reader = reader_for_extension(&range.extension)
            .ok_or_else(|| VolumeAssemblerError::UnsupportedExtension(range.extension.clone()))?;

        // The assembler expects the list ordered low to high whatever the
        // stacking order; the order is applied while copying.
        let list = FileList::new(directory.as_ref(), range.clone(), StackingOrder::LowToHigh);
        let files: Vec<SliceFileDescriptor> = list.iter().collect();
        if files.is_empty() {
            return Err(VolumeAssemblerError::NoSlices);
        }

        let missing: Vec<&SliceFileDescriptor> = files.iter().filter(|f| !f.exists).collect();
        if let Some(first) = missing.first() {
            for file in &missing {
                warn!(path = %file.path.display(), "slice file does not exist");
            }
            return Err(VolumeAssemblerError::MissingFiles {
                count: missing.len(),
                first: first.path.clone(),
            });
        }

        VolumeAssembler::new(reader).assemble(&files, options, |report| {
            debug!(
                slice = report.slice + 1,
                total = report.total,
                path = %report.path.display(),
                "slice assembled"
            );
            ControlFlow::Continue(())
        })
    }
}
