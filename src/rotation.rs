//! Logical to native coordinate mapping
//!
//! Plane buffers are stored in the controller's native order: bit-packed,
//! eight horizontal pixels per byte, MSB first. A logical (image) pixel is
//! first transposed when the panel scans column-major, then mirrored per the
//! geometry flags.
//!
//! ## Example
//!
//! ```
//! use reterminal_e100x::{PanelGeometry, rotation::native_position};
//!
//! let geometry = match PanelGeometry::new(16, 2) {
//!     Ok(g) => g,
//!     Err(_) => return,
//! };
//!
//! // Pixel (0,0) is at byte 0, bit 7 (MSB)
//! assert_eq!(native_position(0, 0, &geometry), (0, 0x80));
//!
//! // Pixel (9,1) is in the second row, second byte
//! assert_eq!(native_position(9, 1, &geometry), (3, 0x40));
//! ```

use crate::config::{PanelGeometry, ScanOrder};

/// Native pixel coordinates of a logical pixel
///
/// `x` and `y` must be inside the logical dimensions of `geometry`.
pub fn native_coordinates(x: u32, y: u32, geometry: &PanelGeometry) -> (u32, u32) {
    let (nx, ny) = match geometry.scan() {
        ScanOrder::RowMajor => (x, y),
        ScanOrder::ColumnMajor => (y, x),
    };
    let nx = if geometry.mirror_x() {
        u32::from(geometry.native_width()) - 1 - nx
    } else {
        nx
    };
    let ny = if geometry.mirror_y() {
        u32::from(geometry.native_height()) - 1 - ny
    } else {
        ny
    };
    (nx, ny)
}

/// Byte index and bit mask of a logical pixel within one plane
///
/// # Returns
///
/// A tuple of (byte_index, bit_mask):
/// - `byte_index`: index into the plane buffer
/// - `bit_mask`: bit within the byte (0x80 for the leftmost native pixel)
pub fn native_position(x: u32, y: u32, geometry: &PanelGeometry) -> (usize, u8) {
    let (nx, ny) = native_coordinates(x, y, geometry);
    let index = ny as usize * geometry.plane_stride() + (nx / 8) as usize;
    let bit = 0x80 >> (nx % 8);
    (index, bit)
}
