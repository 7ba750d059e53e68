//! # EBSD-volume library
//!
//! This crate turns a directory of 2D EBSD (electron backscatter
//! diffraction) scans, one file per serial section, into a single 3D
//! volume.

//!
//! Serial sectioning instruments write one scan per slice, named after a
//! common template such as `Slice_007.ang`. The crate works in three steps:
//!  - Resolve: infer the file-name prefix, zero padding, suffix and the
//!    range of slice indices present in a directory
//!  - List: regenerate the expected file names for any index range, in
//!    either stacking order, and flag the files that are missing
//!  - Assemble: read every slice and copy its per-point arrays into a
//!    pre-allocated volume. Slices smaller than the volume footprint are
//!    centered, never stretched.
//!
//!  Supported scan formats are TSL `.ang` and HKL `.ctf` (square grids
//!  only). Other formats can be plugged in by implementing
//!  [`SliceReader`].
//!
//! # Examples
//!
//! ## Assembling every slice of a directory
//!
//! ```no_run
//! # use ebsd_volume::{AssemblyOptions, Attribute, Orientation, StackingOrder, VolumeLoader};
//! let options = AssemblyOptions {
//!     stacking_order: StackingOrder::HighToLow,
//!     ..Default::default()
//! };
//! let volume = VolumeLoader::load_from_directory("ebsd", &options)
//!     .expect("should have assembled the slices in ebsd/");
//! let image = volume
//!     .get_image_from_axis(volume.dim().0 / 2, Orientation::Axial, Attribute::ImageQuality)
//!     .expect("should have rendered the center slice");
//! image.save("iq.png");
//! ```
//!
//! ## Inspecting a stack before importing it
//!
//! ```no_run
//! # use ebsd_volume::{FileList, StackingOrder, resolve_directory};
//! let range = resolve_directory("ebsd");
//! if range.is_empty() {
//!     println!("no scans found");
//! }
//! let list = FileList::new("ebsd", range, StackingOrder::LowToHigh);
//! for file in list.missing() {
//!     println!("missing {}", file.path.display());
//! }
//! ```
//!
//! [`SliceReader`]: crate::slice_reader::SliceReader

pub mod ang_reader;
pub mod config;
pub mod ctf_reader;
pub mod enums;
pub mod file_list;
pub mod slice_pattern;
pub mod slice_reader;
pub mod volume;
pub mod volume_assembler;

pub use config::{ConfigError, ImportConfig};
pub use enums::{Attribute, Orientation, StackingOrder};
pub use file_list::FileList;
pub use slice_pattern::{ImportRange, SliceFileDescriptor, resolve, resolve_directory};
pub use slice_reader::{SliceData, SliceHeader, SliceReadError, SliceReader};
pub use volume::EbsdVolume;
pub use volume_assembler::{
    AssemblyOptions, AssemblyState, SliceProgress, VolumeAssembler, VolumeAssemblerError,
    VolumeLoader,
};
