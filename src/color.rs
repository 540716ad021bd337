//! Panel palettes and nearest-color search
//!
//! An e-paper panel can only show a handful of pigments. A [`Palette`] lists
//! them as [`PaletteEntry`] values: the RGB color the pigment looks like, and
//! the native code the controller expects for it.
//!
//! ## Spectra 6 codes
//!
//! | Color  | Code |
//! |--------|------|
//! | Black  | 0    |
//! | White  | 1    |
//! | Yellow | 2    |
//! | Red    | 3    |
//! | Blue   | 5    |
//! | Green  | 6    |
//!
//! Code 7 is the controller's "clean" value and is never produced.
//!
//! ## Example
//!
//! ```
//! use embedded_graphics_core::pixelcolor::Rgb888;
//! use reterminal_e100x::color::MONOCHROME;
//!
//! let index = MONOCHROME.nearest(Rgb888::new(200, 200, 200));
//! assert_eq!(MONOCHROME.entry(index).code, 1); // white
//! ```

use embedded_graphics_core::pixelcolor::{Rgb888, RgbColor};

/// One pigment the panel can render
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaletteEntry {
    /// Perceived color of the pigment
    pub rgb: Rgb888,
    /// Native controller code
    pub code: u8,
}

impl PaletteEntry {
    /// Create a palette entry
    pub const fn new(r: u8, g: u8, b: u8, code: u8) -> Self {
        Self {
            rgb: Rgb888::new(r, g, b),
            code,
        }
    }
}

/// Position of an entry within a [`Palette`]
///
/// Only a palette hands these out, so an index is always in range for the
/// palette that produced it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct PaletteIndex(u8);

impl PaletteIndex {
    /// Raw index value
    pub const fn get(self) -> u8 {
        self.0
    }
}

/// Fixed set of colors a panel can physically render
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette<'a> {
    entries: &'a [PaletteEntry],
}

impl<'a> Palette<'a> {
    /// Create a palette from its entries
    ///
    /// Returns `None` for an empty palette or one with more than 16 entries.
    pub const fn new(entries: &'a [PaletteEntry]) -> Option<Self> {
        if entries.is_empty() || entries.len() > 16 {
            None
        } else {
            Some(Self { entries })
        }
    }

    const fn from_static(entries: &'a [PaletteEntry]) -> Self {
        Self { entries }
    }

    /// Number of entries
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; palettes have at least one entry
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in index order
    pub const fn entries(&self) -> &'a [PaletteEntry] {
        self.entries
    }

    /// Index for a raw position, if it is in range
    pub fn index(&self, position: u8) -> Option<PaletteIndex> {
        (usize::from(position) < self.entries.len()).then_some(PaletteIndex(position))
    }

    /// Entry behind an index
    ///
    /// Indices from a different, larger palette resolve to the first entry.
    pub fn entry(&self, index: PaletteIndex) -> PaletteEntry {
        self.entries
            .get(usize::from(index.0))
            .copied()
            .unwrap_or(self.entries[0])
    }

    /// Index of the entry with this native code
    pub fn index_of_code(&self, code: u8) -> Option<PaletteIndex> {
        self.entries
            .iter()
            .position(|entry| entry.code == code)
            .map(|position| PaletteIndex(position as u8))
    }

    /// Number of bit planes needed to hold every native code
    pub fn plane_count(&self) -> usize {
        let max_code = self.entries.iter().map(|e| e.code).max().unwrap_or(0);
        (u8::BITS - max_code.leading_zeros()).max(1) as usize
    }

    /// Nearest entry by squared Euclidean distance; ties go to the lower index
    pub fn nearest(&self, color: Rgb888) -> PaletteIndex {
        self.nearest_channels([
            i32::from(color.r()),
            i32::from(color.g()),
            i32::from(color.b()),
        ])
    }

    /// Nearest entry for already clamped channel values
    pub(crate) fn nearest_channels(&self, channels: [i32; 3]) -> PaletteIndex {
        let mut best = 0usize;
        let mut best_distance = i32::MAX;
        for (position, entry) in self.entries.iter().enumerate() {
            let distance = distance_squared(channels, rgb_channels(entry.rgb));
            if distance < best_distance {
                best = position;
                best_distance = distance;
            }
        }
        PaletteIndex(best as u8)
    }
}

pub(crate) fn rgb_channels(color: Rgb888) -> [i32; 3] {
    [
        i32::from(color.r()),
        i32::from(color.g()),
        i32::from(color.b()),
    ]
}

fn distance_squared(a: [i32; 3], b: [i32; 3]) -> i32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Black and white panel (E1001)
pub const MONOCHROME: Palette<'static> = Palette::from_static(&[
    PaletteEntry::new(0x00, 0x00, 0x00, 0),
    PaletteEntry::new(0xFF, 0xFF, 0xFF, 1),
]);

/// Spectra 6 pigments as measured on the panel (E1002)
///
/// Dithering against measured colors keeps hue error low on photographs.
pub const SPECTRA6: Palette<'static> = Palette::from_static(&[
    PaletteEntry::new(0x19, 0x1E, 0x21, 0),
    PaletteEntry::new(0xE8, 0xE8, 0xE8, 1),
    PaletteEntry::new(0x21, 0x57, 0xBA, 5),
    PaletteEntry::new(0x12, 0x5F, 0x20, 6),
    PaletteEntry::new(0xB2, 0x13, 0x18, 3),
    PaletteEntry::new(0xEF, 0xDE, 0x44, 2),
]);

/// Spectra 6 with black and white stretched to full range
///
/// Better for rendered dashboards whose black and white must stay solid.
pub const SPECTRA6_SATURATED: Palette<'static> = Palette::from_static(&[
    PaletteEntry::new(0, 0, 0, 0),
    PaletteEntry::new(255, 255, 255, 1),
    PaletteEntry::new(33, 87, 186, 5),
    PaletteEntry::new(18, 95, 32, 6),
    PaletteEntry::new(178, 19, 24, 3),
    PaletteEntry::new(239, 222, 68, 2),
]);

/// Spectra 6 "clean" code, sent for pixels outside the image
pub const SPECTRA6_CLEAN: u8 = 7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_prefers_exact_match() {
        let index = SPECTRA6_SATURATED.nearest(Rgb888::new(178, 19, 24));
        assert_eq!(SPECTRA6_SATURATED.entry(index).code, 3);
    }

    #[test]
    fn test_nearest_mid_gray_goes_white_in_monochrome() {
        // 128 is one step closer to 255 than to 0
        let index = MONOCHROME.nearest(Rgb888::new(128, 128, 128));
        assert_eq!(index.get(), 1);
        let index = MONOCHROME.nearest(Rgb888::new(127, 127, 127));
        assert_eq!(index.get(), 0);
    }

    #[test]
    fn test_nearest_tie_goes_to_first_entry() {
        const ENTRIES: &[PaletteEntry] = &[
            PaletteEntry::new(0, 0, 0, 0),
            PaletteEntry::new(20, 0, 0, 1),
        ];
        let palette = Palette::new(ENTRIES).unwrap();
        assert_eq!(palette.nearest(Rgb888::new(10, 0, 0)).get(), 0);
    }

    #[test]
    fn test_plane_count() {
        assert_eq!(MONOCHROME.plane_count(), 1);
        assert_eq!(SPECTRA6.plane_count(), 3);
    }

    #[test]
    fn test_index_bounds() {
        assert!(MONOCHROME.index(1).is_some());
        assert!(MONOCHROME.index(2).is_none());
        assert_eq!(SPECTRA6.index_of_code(5).map(PaletteIndex::get), Some(2));
        assert!(SPECTRA6.index_of_code(SPECTRA6_CLEAN).is_none());
    }

    #[test]
    fn test_empty_palette_rejected() {
        assert!(Palette::new(&[]).is_none());
    }
}
