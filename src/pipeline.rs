//! Row-streaming image pipeline
//!
//! Source rows are pulled from a [`RowSource`], resampled onto the panel's
//! logical grid, quantized by a [`Quantizer`] and packed by a [`PanelCodec`]
//! one row at a time. Only one source row, one destination row and the
//! quantizer's error rows are alive during a render.
//!
//! ## Example
//!
//! ```
//! use embedded_graphics_core::pixelcolor::Rgb888;
//! use reterminal_e100x::{DecodeError, ImagePipeline, PanelGeometry, RowSource, color::MONOCHROME};
//!
//! struct Solid(u32);
//!
//! impl RowSource for Solid {
//!     fn dimensions(&self) -> (u32, u32) {
//!         (8, 2)
//!     }
//!     fn next_row(&mut self, out: &mut [Rgb888]) -> Result<(), DecodeError> {
//!         out.fill(Rgb888::new(255, 255, 255));
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! let geometry = match PanelGeometry::new(8, 2) {
//!     Ok(g) => g,
//!     Err(_) => return,
//! };
//! let pipeline = ImagePipeline::new(MONOCHROME);
//! if let Ok(frame) = pipeline.render(&mut Solid(0), &geometry) {
//!     assert_eq!(frame.plane(0), &[0xFF, 0xFF]);
//! }
//! ```

use alloc::vec;
use alloc::vec::Vec;
use embedded_graphics_core::pixelcolor::Rgb888;
use embedded_io::Read;

use crate::codec::{FrameBuffer, PanelCodec};
use crate::color::{Palette, PaletteIndex};
use crate::config::PanelGeometry;
use crate::dither::{DiffusionKernel, Quantizer};
use crate::error::DecodeError;
use crate::png::PngDecoder;

/// Producer of decoded image rows, top to bottom
pub trait RowSource {
    /// Image width and height in pixels
    fn dimensions(&self) -> (u32, u32);

    /// Decode the next row into `out`
    ///
    /// `out` is exactly one image width long.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error; the source is unusable afterwards.
    fn next_row(&mut self, out: &mut [Rgb888]) -> Result<(), DecodeError>;
}

/// How a source image is fitted onto the panel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResamplePolicy {
    /// Source must match the panel's logical resolution exactly
    Exact,
    /// Nearest-neighbour scaling with integer floor mapping
    NearestNeighbor {
        /// Largest accepted scale ratio on either axis
        max_factor: u8,
    },
}

impl Default for ResamplePolicy {
    fn default() -> Self {
        Self::NearestNeighbor { max_factor: 4 }
    }
}

impl ResamplePolicy {
    /// Check that `source` can be mapped onto `target`
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::ResolutionMismatch` with the source dimensions
    /// if the policy does not allow the mapping.
    pub fn check(&self, source: (u32, u32), target: (u32, u32)) -> Result<(), DecodeError> {
        let allowed = match *self {
            Self::Exact => source == target,
            Self::NearestNeighbor { max_factor } => {
                let factor = u64::from(max_factor);
                let within = |s: u32, d: u32| {
                    let (s, d) = (u64::from(s), u64::from(d));
                    s > 0 && d > 0 && s <= d * factor && d <= s * factor
                };
                within(source.0, target.0) && within(source.1, target.1)
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(DecodeError::ResolutionMismatch {
                width: source.0,
                height: source.1,
            })
        }
    }
}

/// Source coordinate sampled for destination coordinate `d`
fn source_coordinate(d: u32, source: u32, target: u32) -> u32 {
    (u64::from(d) * u64::from(source) / u64::from(target)) as u32
}

/// Decode, resample, quantize and pack an image into a frame buffer
#[derive(Clone, Copy, Debug)]
pub struct ImagePipeline<'p> {
    palette: Palette<'p>,
    kernel: DiffusionKernel,
    resample: ResamplePolicy,
    gamut_clip: bool,
}

impl<'p> ImagePipeline<'p> {
    /// Pipeline with Floyd–Steinberg and the default resample policy
    pub fn new(palette: Palette<'p>) -> Self {
        Self {
            palette,
            kernel: DiffusionKernel::default(),
            resample: ResamplePolicy::default(),
            gamut_clip: false,
        }
    }

    /// Use another diffusion kernel
    pub fn with_kernel(mut self, kernel: DiffusionKernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// Clip diffused colors onto the palette's gamut
    pub fn with_gamut_clip(mut self, enabled: bool) -> Self {
        self.gamut_clip = enabled;
        self
    }

    /// Use another resample policy
    pub fn with_resample(mut self, resample: ResamplePolicy) -> Self {
        self.resample = resample;
        self
    }

    /// Render every row of `source` into a new frame for `geometry`
    ///
    /// # Errors
    ///
    /// Returns `ResolutionMismatch` before any row is read if the source does
    /// not fit the panel, otherwise the first error of the source.
    pub fn render<S: RowSource>(
        &self,
        source: &mut S,
        geometry: &PanelGeometry,
    ) -> Result<FrameBuffer, DecodeError> {
        let (src_w, src_h) = source.dimensions();
        let dst_w = u32::from(geometry.logical_width());
        let dst_h = u32::from(geometry.logical_height());
        self.resample.check((src_w, src_h), (dst_w, dst_h))?;
        log::debug!(
            "pipeline: {}x{} -> {}x{} ({} planes)",
            src_w,
            src_h,
            dst_w,
            dst_h,
            self.palette.plane_count()
        );

        let codec = PanelCodec::new(*geometry, self.palette);
        let mut frame = codec.frame();
        let mut quantizer = Quantizer::new(self.palette, self.kernel, dst_w as usize);
        if self.gamut_clip {
            quantizer = quantizer.with_gamut_clip();
        }

        let columns: Vec<usize> = (0..dst_w)
            .map(|x| source_coordinate(x, src_w, dst_w) as usize)
            .collect();
        let mut src_row = vec![Rgb888::new(0, 0, 0); src_w as usize];
        let mut dst_row = vec![Rgb888::new(0, 0, 0); dst_w as usize];
        let mut indices = vec![PaletteIndex::default(); dst_w as usize];
        let mut rows_read = 0u32;

        for y in 0..dst_h {
            let sy = source_coordinate(y, src_h, dst_h);
            while rows_read <= sy {
                source.next_row(&mut src_row)?;
                rows_read += 1;
            }
            for (pixel, &sx) in dst_row.iter_mut().zip(&columns) {
                *pixel = src_row[sx];
            }
            quantizer
                .quantize_row(&dst_row, &mut indices)
                .and_then(|()| codec.encode_row(&mut frame, y, &indices))
                .map_err(|e| {
                    log::error!("pipeline: row {} rejected by codec: {}", y, e);
                    DecodeError::Corrupt
                })?;
        }

        log::info!("pipeline: rendered {} rows from {} source rows", dst_h, rows_read);
        Ok(frame)
    }

    /// Decode a PNG byte stream and render it for `geometry`
    ///
    /// # Errors
    ///
    /// Returns any [`DecodeError`] from the decoder or the resample check.
    pub fn render_png<R: Read>(
        &self,
        reader: R,
        geometry: &PanelGeometry,
    ) -> Result<FrameBuffer, DecodeError> {
        let mut decoder = PngDecoder::new(reader)?;
        self.render(&mut decoder, geometry)
    }
}
