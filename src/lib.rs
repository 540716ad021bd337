//! reTerminal E100x wake-cycle firmware core
//!
//! Everything a reTerminal E1001/E1002 e-paper frame does between two deep
//! sleeps, independent of the chip HAL:
//!
//! - `no_std` + `alloc`
//! - `embedded-hal` v1.0 for SPI, GPIO, I2C and delays
//! - Streaming PNG decode with error-diffusion dithering to the panel palette
//! - Bit-exact multi-plane frame encoding for monochrome and Spectra 6 panels
//! - Table-driven panel refresh that always powers the panel off
//! - Wake scheduler with button navigation, provisioning entry and reporting
//! - `embedded-graphics` integration (with `graphics` feature)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core::convert::Infallible;
//! use embedded_hal::delay::DelayNs;
//! use embedded_hal::digital::{InputPin, OutputPin};
//! use embedded_hal::spi::{Operation, SpiDevice};
//! use reterminal_e100x::{ImagePipeline, Interface, PanelDriver, PanelVariant};
//! # struct MockSpi;
//! # impl embedded_hal::spi::ErrorType for MockSpi { type Error = Infallible; }
//! # impl SpiDevice for MockSpi {
//! #     fn transaction(
//! #         &mut self,
//! #         _operations: &mut [Operation<'_, u8>],
//! #     ) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! # }
//! # struct MockPin;
//! # impl embedded_hal::digital::ErrorType for MockPin { type Error = Infallible; }
//! # impl OutputPin for MockPin {
//! #     fn set_low(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! #     fn set_high(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl InputPin for MockPin {
//! #     fn is_high(&mut self) -> Result<bool, Self::Error> { Ok(true) }
//! #     fn is_low(&mut self) -> Result<bool, Self::Error> { Ok(false) }
//! # }
//! # struct MockDelay;
//! # impl DelayNs for MockDelay { fn delay_ns(&mut self, _ns: u32) {} }
//! # let spi = MockSpi;
//! # let dc = MockPin;
//! # let rst = MockPin;
//! # let busy = MockPin;
//! # let mut delay = MockDelay;
//! # let png_bytes: &[u8] = &[];
//!
//! let variant = PanelVariant::E1002;
//! let spec = variant.spec();
//! let interface = Interface::for_variant(spi, dc, rst, busy, variant);
//! let mut panel = PanelDriver::new(interface, variant);
//!
//! let frame = match ImagePipeline::new(spec.palette).render_png(png_bytes, &spec.geometry) {
//!     Ok(frame) => frame,
//!     Err(_) => return,
//! };
//! if let Err(e) = panel.refresh(&frame, &mut delay) {
//!     // The panel is already powered off here
//!     let _ = e.stage;
//! }
//! ```

#![no_std]

extern crate alloc;

/// Frame buffers and palette-index packing
pub mod codec;
/// Panel palettes and nearest-color lookup
pub mod color;
/// Controller commands and per-variant command tables
pub mod command;
/// Panel geometry, cycle configuration and builder
pub mod config;
/// Error-diffusion quantizer
pub mod dither;
/// Panel refresh state machine
pub mod driver;
/// Error types for the firmware core
pub mod error;
/// Gamut clipping onto the palette hull
pub mod gamut;
/// Wake classification and page navigation
pub mod input;
/// Hardware interface abstraction
pub mod interface;
/// Network seam
pub mod net;
/// Image decode pipeline
pub mod pipeline;
/// Streaming PNG decoder
pub mod png;
/// Cycle reports and their encodings
pub mod report;
/// Logical to native coordinate mapping
pub mod rotation;
/// Wake cycle orchestration
pub mod scheduler;
/// Battery and climate sampling
pub mod sensor;
/// Persisted settings and retained state
pub mod settings;

/// Graphics support via embedded-graphics (requires `graphics` feature)
#[cfg(feature = "graphics")]
pub mod graphics;

pub use codec::{FrameBuffer, PanelCodec};
pub use color::{Palette, PaletteEntry, PaletteIndex};
pub use command::{PanelSpec, PanelVariant};
pub use config::{Builder, CycleConfig, MAX_PANEL_EDGE, PanelGeometry, ScanOrder};
pub use dither::{DiffusionKernel, Quantizer};
pub use driver::{DriverState, PanelCommandSequence, PanelDriver};
pub use error::{
    ArmError, BuilderError, CodecError, ConfigError, DecodeError, FaultReason, IoError,
    PanelError, PanelStage, SensorError,
};
pub use gamut::Gamut;
pub use input::{Button, WakeCause, WakeReason};
pub use interface::InterfaceError;
pub use interface::{DisplayInterface, Interface};
pub use net::Network;
pub use pipeline::{ImagePipeline, ResamplePolicy, RowSource};
pub use report::{CycleStatus, FetchStatus, PanelStatus, Report, ReportSink};
pub use scheduler::{CycleReport, Mode, Platform, Provisioning, ProvisioningOutcome, WakeScheduler};
pub use sensor::{SensorReading, SensorSampler};
pub use settings::{ConfigStore, RetainedState, Settings};

#[cfg(feature = "graphics")]
pub use graphics::Canvas;
