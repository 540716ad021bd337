//! Bit-plane frame buffers
//!
//! A panel stores each pixel's native color code spread over N binary
//! planes: bit k of the code lives in plane k. [`PanelCodec`] packs rows of
//! [`PaletteIndex`] values into a [`FrameBuffer`] and unpacks them again.
//!
//! Planes are `ceil(native_width / 8) * native_height` bytes, MSB first.
//! Padding bits past the native width are always 0.
//!
//! ## Example
//!
//! ```
//! use reterminal_e100x::{PanelCodec, PanelGeometry, color::MONOCHROME};
//!
//! let geometry = match PanelGeometry::new(5, 1) {
//!     Ok(g) => g,
//!     Err(_) => return,
//! };
//! let codec = PanelCodec::new(geometry, MONOCHROME);
//! let mut frame = codec.frame();
//!
//! let white = match MONOCHROME.index(1) {
//!     Some(i) => i,
//!     None => return,
//! };
//! if codec.encode_row(&mut frame, 0, &[white; 5]).is_ok() {
//!     assert_eq!(frame.plane(0), &[0b1111_1000]);
//! }
//! ```

use alloc::vec;
use alloc::vec::Vec;

use crate::color::{Palette, PaletteIndex};
use crate::config::PanelGeometry;
use crate::error::CodecError;
use crate::rotation::native_position;

/// Packed plane buffers for one full frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    geometry: PanelGeometry,
    plane_count: usize,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a zeroed frame
    pub fn new(geometry: PanelGeometry, plane_count: usize) -> Self {
        Self {
            geometry,
            plane_count,
            data: vec![0; geometry.plane_len() * plane_count],
        }
    }

    /// Geometry the frame was allocated for
    pub fn geometry(&self) -> &PanelGeometry {
        &self.geometry
    }

    /// Number of planes
    pub fn plane_count(&self) -> usize {
        self.plane_count
    }

    /// Packed bytes of plane `k`
    ///
    /// Out-of-range planes are empty.
    pub fn plane(&self, k: usize) -> &[u8] {
        let len = self.geometry.plane_len();
        self.data.get(k * len..(k + 1) * len).unwrap_or(&[])
    }

    /// Iterator over all planes in order
    pub fn planes(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks(self.geometry.plane_len().max(1))
    }

    /// Native code stored for a native pixel
    pub fn native_code(&self, nx: u32, ny: u32) -> u8 {
        let index = ny as usize * self.geometry.plane_stride() + (nx / 8) as usize;
        let bit = 0x80u8 >> (nx % 8);
        (0..self.plane_count).fold(0u8, |code, k| {
            if self.plane(k).get(index).is_some_and(|b| b & bit != 0) {
                code | (1 << k)
            } else {
                code
            }
        })
    }

    /// Zero every plane
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    fn set(&mut self, k: usize, index: usize, bit: u8, on: bool) {
        let offset = k * self.geometry.plane_len() + index;
        if let Some(byte) = self.data.get_mut(offset) {
            if on {
                *byte |= bit;
            } else {
                *byte &= !bit;
            }
        }
    }
}

/// Packs palette indices into a panel's native plane layout
#[derive(Clone, Copy, Debug)]
pub struct PanelCodec<'p> {
    geometry: PanelGeometry,
    palette: Palette<'p>,
}

impl<'p> PanelCodec<'p> {
    /// Create a codec for a panel geometry and palette
    pub fn new(geometry: PanelGeometry, palette: Palette<'p>) -> Self {
        Self { geometry, palette }
    }

    /// Geometry
    pub fn geometry(&self) -> &PanelGeometry {
        &self.geometry
    }

    /// Palette
    pub fn palette(&self) -> Palette<'p> {
        self.palette
    }

    /// Allocate an empty frame sized for this codec
    pub fn frame(&self) -> FrameBuffer {
        FrameBuffer::new(self.geometry, self.palette.plane_count())
    }

    fn check(&self, frame: &FrameBuffer, y: u32, len: usize) -> Result<(), CodecError> {
        if frame.geometry != self.geometry || frame.plane_count != self.palette.plane_count() {
            return Err(CodecError::FrameMismatch);
        }
        let height = u32::from(self.geometry.logical_height());
        if y >= height {
            return Err(CodecError::RowOutOfRange { row: y, height });
        }
        let expected = usize::from(self.geometry.logical_width());
        if len != expected {
            return Err(CodecError::RowLength {
                expected,
                provided: len,
            });
        }
        Ok(())
    }

    /// Write one logical row into the frame
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` if the row is out of range, has the wrong
    /// length, holds an index outside the palette, or the frame was made for
    /// a different panel. The frame is left untouched on error.
    pub fn encode_row(
        &self,
        frame: &mut FrameBuffer,
        y: u32,
        row: &[PaletteIndex],
    ) -> Result<(), CodecError> {
        self.check(frame, y, row.len())?;
        if let Some(bad) = row
            .iter()
            .find(|i| usize::from(i.get()) >= self.palette.len())
        {
            return Err(CodecError::IndexOutOfRange(bad.get()));
        }

        for (x, index) in row.iter().enumerate() {
            self.write_pixel(frame, x as u32, y, *index);
        }
        Ok(())
    }

    /// Write one logical pixel without range checks
    ///
    /// Callers guarantee `x`/`y` are inside the logical area and `frame`
    /// belongs to this codec.
    pub(crate) fn write_pixel(&self, frame: &mut FrameBuffer, x: u32, y: u32, index: PaletteIndex) {
        let code = self.palette.entry(index).code;
        let (byte, bit) = native_position(x, y, &self.geometry);
        for k in 0..frame.plane_count {
            frame.set(k, byte, bit, code & (1 << k) != 0);
        }
    }

    /// Read one logical row back out of the frame
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` for the same range and length violations as
    /// [`encode_row`](Self::encode_row), or `IndexOutOfRange` with the stored
    /// code if it has no palette entry.
    pub fn decode_row(
        &self,
        frame: &FrameBuffer,
        y: u32,
        out: &mut [PaletteIndex],
    ) -> Result<(), CodecError> {
        self.check(frame, y, out.len())?;
        for (x, slot) in out.iter_mut().enumerate() {
            let (byte, bit) = native_position(x as u32, y, &self.geometry);
            let code = (0..frame.plane_count).fold(0u8, |code, k| {
                if frame.plane(k).get(byte).is_some_and(|b| b & bit != 0) {
                    code | (1 << k)
                } else {
                    code
                }
            });
            *slot = self
                .palette
                .index_of_code(code)
                .ok_or(CodecError::IndexOutOfRange(code))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{MONOCHROME, SPECTRA6};
    use crate::config::ScanOrder;

    fn indices(palette: Palette<'_>, raw: &[u8]) -> Vec<PaletteIndex> {
        raw.iter().map(|&r| palette.index(r).unwrap()).collect()
    }

    #[test]
    fn test_width_five_padding_is_zero() {
        let codec = PanelCodec::new(PanelGeometry::new(5, 1).unwrap(), MONOCHROME);
        let mut frame = codec.frame();
        codec
            .encode_row(&mut frame, 0, &indices(MONOCHROME, &[1, 1, 1, 1, 1]))
            .unwrap();
        assert_eq!(frame.plane(0), &[0b1111_1000]);
        assert_eq!(frame.plane(0)[0] & 0b0000_0111, 0);
    }

    #[test]
    fn test_spectra6_three_planes() {
        let codec = PanelCodec::new(PanelGeometry::new(8, 1).unwrap(), SPECTRA6);
        let mut frame = codec.frame();
        assert_eq!(frame.plane_count(), 3);
        // index 2 is blue, code 5 = 0b101
        let row = indices(SPECTRA6, &[2, 0, 0, 0, 0, 0, 0, 1]);
        codec.encode_row(&mut frame, 0, &row).unwrap();
        assert_eq!(frame.plane(0), &[0b1000_0001]);
        assert_eq!(frame.plane(1), &[0b0000_0000]);
        assert_eq!(frame.plane(2), &[0b1000_0000]);
        assert_eq!(frame.native_code(0, 0), 5);
        assert_eq!(frame.native_code(7, 0), 1);
    }

    #[test]
    fn test_round_trip_column_major_mirrored() {
        let geometry = PanelGeometry::new(12, 6)
            .unwrap()
            .with_scan(ScanOrder::ColumnMajor)
            .with_mirror(true, false);
        let codec = PanelCodec::new(geometry, SPECTRA6);
        let mut frame = codec.frame();
        let width = usize::from(geometry.logical_width());
        let height = u32::from(geometry.logical_height());

        let mut expected = Vec::new();
        for y in 0..height {
            let raw: Vec<u8> = (0..width).map(|x| ((x as u32 + y) % 6) as u8).collect();
            let row = indices(SPECTRA6, &raw);
            codec.encode_row(&mut frame, y, &row).unwrap();
            expected.push(row);
        }
        for y in 0..height {
            let mut out = vec![PaletteIndex::default(); width];
            codec.decode_row(&frame, y, &mut out).unwrap();
            assert_eq!(out, expected[y as usize]);
        }
    }

    #[test]
    fn test_encode_overwrites_previous_bits() {
        let codec = PanelCodec::new(PanelGeometry::new(8, 1).unwrap(), MONOCHROME);
        let mut frame = codec.frame();
        codec
            .encode_row(&mut frame, 0, &indices(MONOCHROME, &[1; 8]))
            .unwrap();
        codec
            .encode_row(&mut frame, 0, &indices(MONOCHROME, &[0, 1, 0, 1, 0, 1, 0, 1]))
            .unwrap();
        assert_eq!(frame.plane(0), &[0b0101_0101]);
    }

    #[test]
    fn test_errors() {
        let codec = PanelCodec::new(PanelGeometry::new(4, 2).unwrap(), MONOCHROME);
        let mut frame = codec.frame();
        let row = indices(MONOCHROME, &[0; 4]);
        assert_eq!(
            codec.encode_row(&mut frame, 2, &row),
            Err(CodecError::RowOutOfRange { row: 2, height: 2 })
        );
        assert_eq!(
            codec.encode_row(&mut frame, 0, &row[..3]),
            Err(CodecError::RowLength {
                expected: 4,
                provided: 3
            })
        );
        let foreign = indices(SPECTRA6, &[4; 4]);
        assert_eq!(
            codec.encode_row(&mut frame, 0, &foreign),
            Err(CodecError::IndexOutOfRange(4))
        );

        let mut other = FrameBuffer::new(PanelGeometry::new(8, 2).unwrap(), 1);
        assert_eq!(
            codec.encode_row(&mut other, 0, &row),
            Err(CodecError::FrameMismatch)
        );
    }

    #[test]
    fn test_decode_unknown_code() {
        let codec = PanelCodec::new(PanelGeometry::new(8, 1).unwrap(), SPECTRA6);
        let mut frame = codec.frame();
        // code 7 in every plane
        for k in 0..3 {
            frame.set(k, 0, 0x80, true);
        }
        let mut out = vec![PaletteIndex::default(); 8];
        assert_eq!(
            codec.decode_row(&frame, 0, &mut out),
            Err(CodecError::IndexOutOfRange(7))
        );
    }
}
