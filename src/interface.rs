//! Hardware interface abstraction
//!
//! This module provides the [`DisplayInterface`] trait and the [`Interface`] struct
//! for talking to the panel controller over SPI.
//!
//! ## Hardware Requirements
//!
//! The reTerminal panels need:
//! - SPI bus (MOSI + SCK, CS handled by the [`SpiDevice`])
//! - 3 GPIO pins:
//!   - **DC**: Data/Command select (output)
//!   - **RST**: Reset (output, active low)
//!   - **BUSY**: Busy status (input, active low on both variants)
//!
//! ## Example
//!
//! ```rust,no_run
//! use embedded_hal::delay::DelayNs;
//! use embedded_hal::digital::{InputPin, OutputPin};
//! use embedded_hal::spi::{Operation, SpiDevice};
//! use reterminal_e100x::{DisplayInterface, Interface};
//! # use core::convert::Infallible;
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
//! # let mut delay = MockDelay;
//! let mut interface = Interface::new(MockSpi, MockPin, MockPin, MockPin);
//!
//! // Power on, then wait up to one second for the charge pump
//! let _ = interface.send_command(0x04);
//! let _ = interface.busy_wait(&mut delay, 1_000);
//! ```

use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;

use crate::command::{PanelVariant, ResetTiming};
use crate::error::FaultReason;

type InterfaceResult<T, E> = core::result::Result<T, E>;

/// Trait for the hardware interface to a panel controller
///
/// This trait abstracts over different hardware implementations,
/// allowing the [`PanelDriver`](crate::driver::PanelDriver) to work with any
/// SPI + GPIO implementation that satisfies embedded-hal traits.
///
/// ## Implementing
///
/// For most cases, use the provided [`Interface`] struct. Custom
/// implementations (e.g. a shared bus with manual CS) must map their errors
/// onto a [`FaultReason`].
pub trait DisplayInterface {
    /// Error type for interface operations
    type Error: Debug + Into<FaultReason>;

    /// Send a command byte to the controller
    ///
    /// The implementation must:
    /// 1. Set DC pin low (command mode)
    /// 2. Send the command byte over SPI
    ///
    /// # Errors
    ///
    /// Returns an error if SPI communication or GPIO fails.
    fn send_command(&mut self, command: u8) -> InterfaceResult<(), Self::Error>;

    /// Send data bytes to the controller
    ///
    /// The implementation must:
    /// 1. Set DC pin high (data mode)
    /// 2. Send the data bytes over SPI
    ///
    /// # Errors
    ///
    /// Returns an error if SPI communication or GPIO fails.
    fn send_data(&mut self, data: &[u8]) -> InterfaceResult<(), Self::Error>;

    /// Perform a hardware reset pulse
    ///
    /// # Errors
    ///
    /// Returns an error if the RST pin cannot be driven.
    fn reset<D: DelayNs>(
        &mut self,
        delay: &mut D,
        timing: &ResetTiming,
    ) -> InterfaceResult<(), Self::Error>;

    /// Wait for the busy line to clear
    ///
    /// Polls BUSY every millisecond. A `timeout_ms` of 0 returns at once
    /// without sampling the pin.
    ///
    /// # Errors
    ///
    /// Returns a timeout error if BUSY is still asserted after `timeout_ms`.
    fn busy_wait<D: DelayNs>(
        &mut self,
        delay: &mut D,
        timeout_ms: u32,
    ) -> InterfaceResult<(), Self::Error>;
}

/// Errors that can occur at the interface level
///
/// Generic over SPI and GPIO error types.
#[derive(Debug)]
pub enum InterfaceError<SpiErr, PinErr> {
    /// SPI communication error
    Spi(SpiErr),
    /// GPIO pin error
    Pin(PinErr),
    /// Timeout waiting for busy pin
    Timeout,
}

impl<SpiErr: Debug, PinErr: Debug> core::fmt::Display for InterfaceError<SpiErr, PinErr> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "SPI error: {e:?}"),
            Self::Pin(e) => write!(f, "Pin error: {e:?}"),
            Self::Timeout => write!(f, "Timeout waiting for display"),
        }
    }
}

impl<SpiErr: Debug, PinErr: Debug> core::error::Error for InterfaceError<SpiErr, PinErr> {}

impl<SpiErr, PinErr> From<InterfaceError<SpiErr, PinErr>> for FaultReason {
    fn from(err: InterfaceError<SpiErr, PinErr>) -> Self {
        match err {
            InterfaceError::Spi(_) => Self::Bus,
            InterfaceError::Pin(_) => Self::Pin,
            InterfaceError::Timeout => Self::Timeout,
        }
    }
}

/// Hardware interface over embedded-hal v1.0 SPI and GPIO traits
///
/// ## Type Parameters
///
/// * `SPI` - SPI device implementing [`SpiDevice`]
/// * `DC` - Data/Command pin implementing [`OutputPin`]
/// * `RST` - Reset pin implementing [`OutputPin`]
/// * `BUSY` - Busy pin implementing [`InputPin`]
pub struct Interface<SPI, DC, RST, BUSY> {
    /// SPI device for communication
    spi: SPI,
    /// Data/Command select pin (low=command, high=data)
    dc: DC,
    /// Reset pin (active low)
    rst: RST,
    /// Busy pin
    busy: BUSY,
    /// Busy pin polarity (true = active high, false = active low)
    busy_active_high: bool,
}

impl<SPI, DC, RST, BUSY> Interface<SPI, DC, RST, BUSY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
{
    /// Create a new Interface with an active-low BUSY line
    ///
    /// # Arguments
    ///
    /// * `spi` - SPI device (must implement [`SpiDevice`])
    /// * `dc` - Data/Command pin (output, low=command, high=data)
    /// * `rst` - Reset pin (output, active low)
    /// * `busy` - Busy pin (input)
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            busy_active_high: false,
        }
    }

    /// Create an Interface with the BUSY polarity of a panel variant
    pub fn for_variant(spi: SPI, dc: DC, rst: RST, busy: BUSY, variant: PanelVariant) -> Self {
        let mut interface = Self::new(spi, dc, rst, busy);
        interface.busy_active_high = variant.spec().busy_active_high;
        interface
    }

    /// Set busy pin polarity
    ///
    /// Default is active-low. Set to true for active-high controllers.
    pub fn set_busy_active_high(&mut self, active_high: bool) -> &mut Self {
        self.busy_active_high = active_high;
        self
    }

    /// Get busy pin polarity (true = active high)
    pub fn busy_active_high(&self) -> bool {
        self.busy_active_high
    }

    /// Release the bus and pins
    pub fn release(self) -> (SPI, DC, RST, BUSY) {
        (self.spi, self.dc, self.rst, self.busy)
    }
}

impl<SPI, DC, RST, BUSY, PinErr> DisplayInterface for Interface<SPI, DC, RST, BUSY>
where
    SPI: SpiDevice,
    SPI::Error: Debug,
    DC: OutputPin<Error = PinErr>,
    RST: OutputPin<Error = PinErr>,
    BUSY: InputPin<Error = PinErr>,
    PinErr: Debug,
{
    type Error = InterfaceError<SPI::Error, PinErr>;

    fn send_command(&mut self, command: u8) -> InterfaceResult<(), Self::Error> {
        self.dc.set_low().map_err(InterfaceError::Pin)?;
        self.spi.write(&[command]).map_err(InterfaceError::Spi)?;
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> InterfaceResult<(), Self::Error> {
        self.dc.set_high().map_err(InterfaceError::Pin)?;
        self.spi.write(data).map_err(InterfaceError::Spi)?;
        Ok(())
    }

    fn reset<D: DelayNs>(
        &mut self,
        delay: &mut D,
        timing: &ResetTiming,
    ) -> InterfaceResult<(), Self::Error> {
        self.rst.set_high().map_err(InterfaceError::Pin)?;
        delay.delay_ms(timing.high_ms);
        self.rst.set_low().map_err(InterfaceError::Pin)?;
        delay.delay_ms(timing.low_ms);
        self.rst.set_high().map_err(InterfaceError::Pin)?;
        delay.delay_ms(timing.settle_ms);
        Ok(())
    }

    fn busy_wait<D: DelayNs>(
        &mut self,
        delay: &mut D,
        timeout_ms: u32,
    ) -> InterfaceResult<(), Self::Error> {
        if timeout_ms == 0 {
            return Ok(());
        }
        let mut iterations = 0u32;

        loop {
            let is_busy = if self.busy_active_high {
                self.busy.is_high()
            } else {
                self.busy.is_low()
            };

            if !is_busy.map_err(InterfaceError::Pin)? {
                return Ok(());
            }

            delay.delay_ms(1);
            iterations += 1;
            if iterations >= timeout_ms {
                return Err(InterfaceError::Timeout);
            }
        }
    }
}
