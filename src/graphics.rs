//! Graphics support via embedded-graphics
//!
//! [`Canvas`] implements [`DrawTarget`] over a [`FrameBuffer`], so status
//! screens (provisioning instructions, error notices) can be drawn locally
//! and handed to the panel driver like a decoded image. Colors are snapped
//! to the nearest palette entry; there is no dithering.
//!
//! ## Example
//!
//! ```
//! use embedded_graphics::{
//!     pixelcolor::Rgb888,
//!     prelude::*,
//!     primitives::{PrimitiveStyle, Rectangle},
//! };
//! use reterminal_e100x::PanelVariant;
//! use reterminal_e100x::graphics::Canvas;
//!
//! let mut canvas = Canvas::for_panel(PanelVariant::E1002.spec());
//! let _ = canvas.clear(Rgb888::WHITE);
//! let _ = Rectangle::new(Point::new(10, 10), Size::new(50, 30))
//!     .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
//!     .draw(&mut canvas);
//!
//! let frame = canvas.into_frame();
//! assert_eq!(frame.plane_count(), 3);
//! ```

use core::convert::Infallible;
use embedded_graphics_core::{
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Point, Size},
    pixelcolor::Rgb888,
    prelude::Pixel,
};

use crate::codec::{FrameBuffer, PanelCodec};
use crate::color::Palette;
use crate::command::PanelSpec;
use crate::config::PanelGeometry;

/// Drawable frame for one panel
#[derive(Clone, Debug)]
pub struct Canvas<'p> {
    codec: PanelCodec<'p>,
    frame: FrameBuffer,
}

impl<'p> Canvas<'p> {
    /// Create an empty canvas
    ///
    /// Every pixel starts at the palette entry with code 0.
    pub fn new(geometry: PanelGeometry, palette: Palette<'p>) -> Self {
        let codec = PanelCodec::new(geometry, palette);
        let frame = codec.frame();
        Self { codec, frame }
    }

    /// Frame being drawn
    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Finish drawing
    pub fn into_frame(self) -> FrameBuffer {
        self.frame
    }
}

impl Canvas<'static> {
    /// Canvas matching a panel's geometry and palette
    pub fn for_panel(spec: &PanelSpec) -> Self {
        Self::new(spec.geometry, spec.palette)
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<Iter>(&mut self, pixels: Iter) -> Result<(), Self::Error>
    where
        Iter: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let sz = self.size();
        let palette = self.codec.palette();

        for Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 {
                continue;
            }

            let x = x as u32;
            let y = y as u32;

            if x >= sz.width || y >= sz.height {
                continue;
            }

            self.codec
                .write_pixel(&mut self.frame, x, y, palette.nearest(color));
        }

        Ok(())
    }
}

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        let geometry = self.codec.geometry();
        Size::new(
            u32::from(geometry.logical_width()),
            u32::from(geometry.logical_height()),
        )
    }
}
