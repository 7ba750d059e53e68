use crate::enums::{Attribute, Orientation};
use crate::slice_reader::PhaseInfo;

use image::{GrayImage, ImageBuffer};
use ndarray::{Array2, Array3, ArrayView2, s};
use rayon::prelude::*;

/// An assembled EBSD volume.
///
/// Every attribute is stored as an [`Array3`] of shape `(z, y, x)` in
/// standard layout, so the flat data of each array is addressed as
/// `z * xpoints * ypoints + y * xpoints + x`.
#[derive(Debug, Clone, PartialEq)]
pub struct EbsdVolume {
    pub euler1: Array3<f32>,
    pub euler2: Array3<f32>,
    pub euler3: Array3<f32>,
    pub x_position: Array3<f32>,
    pub y_position: Array3<f32>,
    pub image_quality: Array3<f32>,
    pub confidence_index: Array3<f32>,
    pub phase: Array3<i32>,
    pub sem_signal: Array3<f32>,
    pub fit: Array3<f32>,
    /// Step sizes along (x, y, z)
    pub resolution: (f32, f32, f32),
    /// Phase table of the first slice
    pub phases: Vec<PhaseInfo>,
}

impl EbsdVolume {
    /// Zero-filled volume of `xpoints * ypoints * zpoints` points
    pub fn zeros(xpoints: usize, ypoints: usize, zpoints: usize) -> Self {
        let shape = (zpoints, ypoints, xpoints);
        Self {
            euler1: Array3::zeros(shape),
            euler2: Array3::zeros(shape),
            euler3: Array3::zeros(shape),
            x_position: Array3::zeros(shape),
            y_position: Array3::zeros(shape),
            image_quality: Array3::zeros(shape),
            confidence_index: Array3::zeros(shape),
            phase: Array3::zeros(shape),
            sem_signal: Array3::zeros(shape),
            fit: Array3::zeros(shape),
            resolution: (1.0, 1.0, 1.0),
            phases: Vec::new(),
        }
    }

    /// Like [`EbsdVolume::zeros`], but `None` when the point count overflows
    /// or the arrays cannot be allocated
    pub fn try_zeros(xpoints: usize, ypoints: usize, zpoints: usize) -> Option<Self> {
        let shape = (zpoints, ypoints, xpoints);
        let len = xpoints.checked_mul(ypoints)?.checked_mul(zpoints)?;
        Some(Self {
            euler1: try_filled(shape, len, 0.0)?,
            euler2: try_filled(shape, len, 0.0)?,
            euler3: try_filled(shape, len, 0.0)?,
            x_position: try_filled(shape, len, 0.0)?,
            y_position: try_filled(shape, len, 0.0)?,
            image_quality: try_filled(shape, len, 0.0)?,
            confidence_index: try_filled(shape, len, 0.0)?,
            phase: try_filled(shape, len, 0)?,
            sem_signal: try_filled(shape, len, 0.0)?,
            fit: try_filled(shape, len, 0.0)?,
            resolution: (1.0, 1.0, 1.0),
            phases: Vec::new(),
        })
    }

    /// Get the dimensions of the volume (zpoints, ypoints, xpoints)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.phase.dim()
    }

    pub fn xpoints(&self) -> usize {
        self.dim().2
    }

    pub fn ypoints(&self) -> usize {
        self.dim().1
    }

    pub fn zpoints(&self) -> usize {
        self.dim().0
    }

    pub fn num_points(&self) -> usize {
        self.phase.len()
    }

    /// Flat offset of `(x, y, z)` into any attribute array
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        let (_, ypoints, xpoints) = self.dim();
        z * xpoints * ypoints + y * xpoints + x
    }

    /// Float array of `attribute`, `None` for [`Attribute::Phase`]
    pub fn float_array(&self, attribute: Attribute) -> Option<&Array3<f32>> {
        match attribute {
            Attribute::Euler1 => Some(&self.euler1),
            Attribute::Euler2 => Some(&self.euler2),
            Attribute::Euler3 => Some(&self.euler3),
            Attribute::XPosition => Some(&self.x_position),
            Attribute::YPosition => Some(&self.y_position),
            Attribute::ImageQuality => Some(&self.image_quality),
            Attribute::ConfidenceIndex => Some(&self.confidence_index),
            Attribute::SemSignal => Some(&self.sem_signal),
            Attribute::Fit => Some(&self.fit),
            Attribute::Phase => None,
        }
    }

    pub fn float_array_mut(&mut self, attribute: Attribute) -> Option<&mut Array3<f32>> {
        match attribute {
            Attribute::Euler1 => Some(&mut self.euler1),
            Attribute::Euler2 => Some(&mut self.euler2),
            Attribute::Euler3 => Some(&mut self.euler3),
            Attribute::XPosition => Some(&mut self.x_position),
            Attribute::YPosition => Some(&mut self.y_position),
            Attribute::ImageQuality => Some(&mut self.image_quality),
            Attribute::ConfidenceIndex => Some(&mut self.confidence_index),
            Attribute::SemSignal => Some(&mut self.sem_signal),
            Attribute::Fit => Some(&mut self.fit),
            Attribute::Phase => None,
        }
    }

    /// Flat data of a float attribute in volume order
    pub fn flat(&self, attribute: Attribute) -> Option<&[f32]> {
        self.float_array(attribute)?.as_slice()
    }

    /// Flat phase ids in volume order
    pub fn phase_ids(&self) -> Option<&[i32]> {
        self.phase.as_slice()
    }

    fn float_plane(
        array: &Array3<f32>,
        index: usize,
        orientation: Orientation,
    ) -> ArrayView2<'_, f32> {
        match orientation {
            Orientation::Axial => array.slice(s![index, .., ..]),
            Orientation::Coronal => array.slice(s![.., index, ..]),
            Orientation::Sagittal => array.slice(s![.., .., index]),
        }
    }

    /// Plane of a float attribute through `index` along `orientation`.
    /// Phase ids are converted to `f32`.
    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
        attribute: Attribute,
    ) -> Option<Array2<f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let plane = match self.float_array(attribute) {
            Some(array) => Self::float_plane(array, index, orientation).to_owned(),
            None => {
                let phase = match orientation {
                    Orientation::Axial => self.phase.slice(s![index, .., ..]),
                    Orientation::Coronal => self.phase.slice(s![.., index, ..]),
                    Orientation::Sagittal => self.phase.slice(s![.., .., index]),
                };
                phase.mapv(|value| value as f32)
            }
        };
        Some(plane)
    }

    /// Render a plane as an 8 bit grayscale image, stretched between the
    /// plane's minimum and maximum. Constant planes render black.
    pub fn get_image_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
        attribute: Attribute,
    ) -> Option<GrayImage> {
        let plane = self.get_slice_from_axis(index, orientation, attribute)?;
        Self::slice_to_image(&plane.view())
    }

    fn slice_to_image(slice: &ArrayView2<'_, f32>) -> Option<GrayImage> {
        let (height, width) = slice.dim();
        let (min, max) = slice
            .into_par_iter()
            .fold(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |(lo, hi), &v| (lo.min(v), hi.max(v)),
            )
            .reduce(
                || (f32::INFINITY, f32::NEG_INFINITY),
                |a, b| (a.0.min(b.0), a.1.max(b.1)),
            );
        let span = max - min;

        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v, min, span))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    #[inline]
    fn normalize_to_u8(value: f32, min: f32, span: f32) -> u8 {
        if span.is_nan() || span <= 0.0 || !value.is_finite() {
            return 0;
        }
        (((value - min) / span) * 255.0).round().clamp(0.0, 255.0) as u8
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let dim = self.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }
}

fn try_filled<A: Clone>(shape: (usize, usize, usize), len: usize, value: A) -> Option<Array3<A>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len).ok()?;
    data.resize(len, value);
    Array3::from_shape_vec(shape, data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_volume() -> EbsdVolume {
        let mut volume = EbsdVolume::zeros(4, 3, 2);
        for (i, value) in volume.image_quality.iter_mut().enumerate() {
            *value = i as f32;
        }
        volume
    }

    #[test]
    fn flat_index_matches_standard_layout() {
        let volume = ramp_volume();
        let flat = volume.image_quality.as_slice().unwrap();
        assert_eq!(volume.dim(), (2, 3, 4));
        assert_eq!(volume.index(3, 2, 1), 12 + 8 + 3);
        assert_eq!(flat[volume.index(1, 2, 1)], volume.image_quality[[1, 2, 1]]);
    }

    #[test]
    fn slices_along_each_axis() {
        let volume = ramp_volume();
        let axial = volume
            .get_slice_from_axis(1, Orientation::Axial, Attribute::ImageQuality)
            .unwrap();
        assert_eq!(axial.dim(), (3, 4));
        assert_eq!(axial[[0, 0]], 12.0);

        let coronal = volume
            .get_slice_from_axis(2, Orientation::Coronal, Attribute::ImageQuality)
            .unwrap();
        assert_eq!(coronal.dim(), (2, 4));

        let sagittal = volume
            .get_slice_from_axis(3, Orientation::Sagittal, Attribute::ImageQuality)
            .unwrap();
        assert_eq!(sagittal.dim(), (2, 3));
        assert_eq!(sagittal[[1, 2]], 23.0);

        assert!(
            volume
                .get_slice_from_axis(4, Orientation::Sagittal, Attribute::ImageQuality)
                .is_none()
        );
    }

    #[test]
    fn renders_normalized_grayscale() {
        let volume = ramp_volume();
        let image = volume
            .get_image_from_axis(0, Orientation::Axial, Attribute::ImageQuality)
            .unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(0, 0).0[0], 0);
        assert_eq!(image.get_pixel(3, 2).0[0], 255);
    }

    #[test]
    fn constant_plane_renders_black() {
        let mut volume = EbsdVolume::zeros(2, 2, 1);
        volume.phase.fill(1);
        let image = volume
            .get_image_from_axis(0, Orientation::Axial, Attribute::Phase)
            .unwrap();
        assert!(image.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn unallocatable_volume_is_none() {
        assert!(EbsdVolume::try_zeros(usize::MAX, 2, 1).is_none());
        assert!(EbsdVolume::try_zeros(1 << 40, 1 << 40, 1).is_none());
        let volume = EbsdVolume::try_zeros(3, 2, 1).unwrap();
        assert_eq!(volume, EbsdVolume::zeros(3, 2, 1));
    }
}
