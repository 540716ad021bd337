//! Error-diffusion dithering
//!
//! The [`Quantizer`] maps one row of RGB pixels at a time to palette indices,
//! pushing each pixel's quantization error onto not-yet-visited neighbours
//! according to a [`DiffusionKernel`]. It only keeps `max_dy + 1` rows of
//! accumulated error, so memory stays proportional to the image width.
//!
//! ## Example
//!
//! ```
//! use embedded_graphics_core::pixelcolor::Rgb888;
//! use reterminal_e100x::{DiffusionKernel, PaletteIndex, Quantizer, color::MONOCHROME};
//!
//! let mut quantizer = Quantizer::new(MONOCHROME, DiffusionKernel::FLOYD_STEINBERG, 4);
//! let row = [Rgb888::new(255, 255, 255); 4];
//! let mut out = [PaletteIndex::default(); 4];
//! if quantizer.quantize_row(&row, &mut out).is_ok() {
//!     assert!(out.iter().all(|i| i.get() == 1));
//! }
//! ```

use alloc::vec;
use alloc::vec::Vec;
use embedded_graphics_core::pixelcolor::Rgb888;

use crate::color::{Palette, PaletteIndex, rgb_channels};
use crate::error::CodecError;
use crate::gamut::Gamut;

/// Fixed error-diffusion kernel
///
/// Each target is `(dx, dy, weight)`; the error pushed to a target is
/// `error * weight / divisor`, divided when the target pixel is visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiffusionKernel {
    /// Divisor applied to accumulated error
    pub divisor: u16,
    /// Diffusion targets relative to the current pixel
    pub targets: &'static [(i8, u8, u8)],
}

impl DiffusionKernel {
    /// Floyd–Steinberg, 7/3/5/1 over 16
    pub const FLOYD_STEINBERG: Self = Self {
        divisor: 16,
        targets: &[(1, 0, 7), (-1, 1, 3), (0, 1, 5), (1, 1, 1)],
    };

    /// Atkinson, diffuses only 6/8 of the error for higher contrast
    pub const ATKINSON: Self = Self {
        divisor: 8,
        targets: &[(1, 0, 1), (2, 0, 1), (-1, 1, 1), (0, 1, 1), (1, 1, 1), (0, 2, 1)],
    };

    /// Jarvis–Judice–Ninke, wide 12-neighbour kernel over 48
    pub const JARVIS_JUDICE_NINKE: Self = Self {
        divisor: 48,
        targets: &[
            (1, 0, 7),
            (2, 0, 5),
            (-2, 1, 3),
            (-1, 1, 5),
            (0, 1, 7),
            (1, 1, 5),
            (2, 1, 3),
            (-2, 2, 1),
            (-1, 2, 3),
            (0, 2, 5),
            (1, 2, 3),
            (2, 2, 1),
        ],
    };

    /// Rows of error state the kernel needs
    pub fn rows(&self) -> usize {
        self.targets
            .iter()
            .map(|&(_, dy, _)| usize::from(dy))
            .max()
            .unwrap_or(0)
            + 1
    }
}

impl Default for DiffusionKernel {
    fn default() -> Self {
        Self::FLOYD_STEINBERG
    }
}

/// Row-streaming error-diffusion quantizer
///
/// Created per image; the error state starts zeroed.
pub struct Quantizer<'p> {
    palette: Palette<'p>,
    kernel: DiffusionKernel,
    width: usize,
    rows: usize,
    current: usize,
    errors: Vec<[i32; 3]>,
    gamut: Option<Gamut>,
}

impl<'p> Quantizer<'p> {
    /// Create a quantizer for rows of `width` pixels
    pub fn new(palette: Palette<'p>, kernel: DiffusionKernel, width: usize) -> Self {
        let rows = kernel.rows();
        Self {
            palette,
            kernel,
            width,
            rows,
            current: 0,
            errors: vec![[0; 3]; width * rows],
            gamut: None,
        }
    }

    /// Clip error-adjusted colors onto the palette's gamut before matching
    ///
    /// No-op for palettes without a supported solid.
    pub fn with_gamut_clip(mut self) -> Self {
        self.gamut = Gamut::for_palette(&self.palette);
        self
    }

    /// Row width this quantizer was created for
    pub fn width(&self) -> usize {
        self.width
    }

    /// Clear the error state so the next row starts a new image
    pub fn reset(&mut self) {
        self.errors.fill([0; 3]);
        self.current = 0;
    }

    /// Quantize the next row of the image
    ///
    /// Rows must be fed top to bottom.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::RowLength` if `row` or `out` is not exactly
    /// `width` pixels long.
    pub fn quantize_row(
        &mut self,
        row: &[Rgb888],
        out: &mut [PaletteIndex],
    ) -> Result<(), CodecError> {
        if row.len() != self.width || out.len() != self.width {
            return Err(CodecError::RowLength {
                expected: self.width,
                provided: if row.len() != self.width {
                    row.len()
                } else {
                    out.len()
                },
            });
        }

        let divisor = i32::from(self.kernel.divisor);
        let base = self.current * self.width;
        for (x, (pixel, slot)) in row.iter().zip(out.iter_mut()).enumerate() {
            let source = rgb_channels(*pixel);
            let carried = self.errors[base + x];
            let mut raw = [0i32; 3];
            for c in 0..3 {
                raw[c] = source[c] + carried[c] / divisor;
            }
            let adjusted = match &self.gamut {
                Some(gamut) => gamut.clip(raw),
                None => raw.map(|c| c.clamp(0, 255)),
            };

            let index = self.palette.nearest_channels(adjusted);
            *slot = index;

            let target = rgb_channels(self.palette.entry(index).rgb);
            let error = [
                adjusted[0] - target[0],
                adjusted[1] - target[1],
                adjusted[2] - target[2],
            ];
            if error == [0; 3] {
                continue;
            }
            self.diffuse(x, error);
        }

        self.errors[base..base + self.width].fill([0; 3]);
        self.current = (self.current + 1) % self.rows;
        Ok(())
    }

    fn diffuse(&mut self, x: usize, error: [i32; 3]) {
        for &(dx, dy, weight) in self.kernel.targets {
            let Some(tx) = x.checked_add_signed(isize::from(dx)) else {
                continue;
            };
            if tx >= self.width {
                continue;
            }
            let ring_row = (self.current + usize::from(dy)) % self.rows;
            let cell = &mut self.errors[ring_row * self.width + tx];
            let weight = i32::from(weight);
            for c in 0..3 {
                cell[c] += error[c] * weight;
            }
        }
    }
}
