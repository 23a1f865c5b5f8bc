use image::{imageops, GenericImageView, RgbImage};
use ndarray::{Array2, ArrayViewMut1};

use crate::error::Result;

/// Visual embedding of entity crops.
///
/// Implementations must return one row per input image, in input order, and
/// the same number of columns (`dim()`) for every call.
pub trait ImageEncoder {
    fn dim(&self) -> usize;
    fn embed(&self, batch: &[RgbImage]) -> Result<Array2<f32>>;
}

impl<E: ImageEncoder + ?Sized> ImageEncoder for Box<E> {
    #[inline]
    fn dim(&self) -> usize {
        (**self).dim()
    }

    #[inline]
    fn embed(&self, batch: &[RgbImage]) -> Result<Array2<f32>> {
        (**self).embed(batch)
    }
}

/// Per-channel color histogram of the central part of a crop.
///
/// The center of a player box is mostly jersey, which is what separates the
/// two teams; borders carry grass and neighbours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorHistogramEncoder {
    pub bins: usize,
    /// Side of the sampled window relative to the crop, in (0, 1]
    pub center_fraction: f32,
}

impl Default for ColorHistogramEncoder {
    fn default() -> Self {
        Self {
            bins: 8,
            center_fraction: 0.5,
        }
    }
}

impl ColorHistogramEncoder {
    pub fn new(bins: usize, center_fraction: f32) -> Self {
        Self {
            bins: bins.max(1),
            center_fraction: center_fraction.clamp(f32::EPSILON, 1.0),
        }
    }

    fn histogram(&self, crop: &RgbImage, mut out: ArrayViewMut1<'_, f32>) {
        let (w, h) = crop.dimensions();
        let cw = ((w as f32 * self.center_fraction).round() as u32).clamp(1, w.max(1));
        let ch = ((h as f32 * self.center_fraction).round() as u32).clamp(1, h.max(1));

        if w == 0 || h == 0 {
            return;
        }

        let window = imageops::crop_imm(crop, (w - cw) / 2, (h - ch) / 2, cw, ch);
        let mut count = 0usize;

        for (_, _, px) in window.pixels() {
            for (channel, &value) in px.0.iter().enumerate() {
                let bin = value as usize * self.bins / 256;
                out[channel * self.bins + bin] += 1.0;
            }
            count += 1;
        }

        if count > 0 {
            out /= count as f32;
        }
    }
}

impl ImageEncoder for ColorHistogramEncoder {
    #[inline]
    fn dim(&self) -> usize {
        3 * self.bins
    }

    fn embed(&self, batch: &[RgbImage]) -> Result<Array2<f32>> {
        let mut out = Array2::zeros((batch.len(), self.dim()));

        for (crop, row) in batch.iter().zip(out.rows_mut()) {
            self.histogram(crop, row);
        }

        Ok(out)
    }
}
