//! Error types for the firmware core
//!
//! Every failure class of a wake cycle has its own type so the scheduler can
//! decide, per class, whether to absorb it or change course:
//!
//! - [`DecodeError`] - malformed or unsupported image, aborts only the render
//! - [`CodecError`] - a row that does not fit the frame buffer
//! - [`PanelError`] - hardware/timing fault during a refresh, reported after power-off
//! - [`IoError`] - network or transport failure, absorbed by the scheduler
//! - [`SensorError`] - per-field sensor failure, replaced by "unavailable"
//! - [`ConfigError`] - missing or invalid persisted settings, forces provisioning
//! - [`ArmError`] - a wake source could not be armed, retried with the fallback interval
//! - [`BuilderError`] - invalid static configuration, caught at start-up
//!
//! ## Example
//!
//! ```
//! use reterminal_e100x::{FaultReason, PanelError, PanelStage};
//!
//! let err = PanelError::new(PanelStage::WaitBusy, FaultReason::Timeout);
//! assert_eq!(err.stage, PanelStage::WaitBusy);
//! ```

use core::fmt;

/// Errors raised while decoding or resampling an image
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeError {
    /// The stream does not start with the PNG signature
    BadSignature,
    /// IHDR missing, out of order or with invalid field values
    MalformedHeader,
    /// Valid PNG feature this decoder does not handle (interlacing, odd depth)
    Unsupported,
    /// A chunk failed its CRC-32 check
    ChunkCrc,
    /// Compressed data, filter type or palette index is invalid
    Corrupt,
    /// The stream ended before all scanlines were produced
    Truncated,
    /// Source resolution cannot be mapped onto the panel under the resample policy
    ResolutionMismatch {
        /// Source width in pixels
        width: u32,
        /// Source height in pixels
        height: u32,
    },
    /// The byte source failed
    Source(IoError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadSignature => write!(f, "Not a PNG stream"),
            Self::MalformedHeader => write!(f, "Malformed PNG header"),
            Self::Unsupported => write!(f, "Unsupported PNG format"),
            Self::ChunkCrc => write!(f, "PNG chunk CRC mismatch"),
            Self::Corrupt => write!(f, "Corrupt image data"),
            Self::Truncated => write!(f, "Image stream truncated"),
            Self::ResolutionMismatch { width, height } => {
                write!(f, "Image resolution {width}x{height} out of tolerance")
            }
            Self::Source(e) => write!(f, "Image source failed: {e}"),
        }
    }
}

impl core::error::Error for DecodeError {}

impl From<IoError> for DecodeError {
    fn from(err: IoError) -> Self {
        Self::Source(err)
    }
}

/// Errors raised when packing palette indices into plane buffers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CodecError {
    /// Row index is beyond the logical height
    RowOutOfRange {
        /// Requested row
        row: u32,
        /// Logical height of the frame
        height: u32,
    },
    /// Row slice length differs from the logical width
    RowLength {
        /// Logical width of the frame
        expected: usize,
        /// Provided slice length
        provided: usize,
    },
    /// Index does not belong to the palette
    IndexOutOfRange(u8),
    /// Frame buffer was allocated for another geometry or palette
    FrameMismatch,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowOutOfRange { row, height } => {
                write!(f, "Row {row} out of range (height {height})")
            }
            Self::RowLength { expected, provided } => {
                write!(f, "Row length {provided}, expected {expected}")
            }
            Self::IndexOutOfRange(index) => write!(f, "Palette index {index} out of range"),
            Self::FrameMismatch => write!(f, "Frame buffer does not match panel"),
        }
    }
}

impl core::error::Error for CodecError {}

/// Stage of the panel driver state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelStage {
    /// Reset, init table and charge pump start
    PowerOn,
    /// Streaming plane buffers
    LoadPlanes,
    /// Refresh command
    TriggerRefresh,
    /// Waiting for the busy line after a refresh
    WaitBusy,
    /// Charge pump shutdown and deep sleep
    PowerOff,
}

impl fmt::Display for PanelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PowerOn => "power-on",
            Self::LoadPlanes => "load-planes",
            Self::TriggerRefresh => "trigger-refresh",
            Self::WaitBusy => "wait-busy",
            Self::PowerOff => "power-off",
        };
        f.write_str(name)
    }
}

/// Why a panel stage failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultReason {
    /// SPI transfer failed
    Bus,
    /// GPIO (DC/RST/BUSY) access failed
    Pin,
    /// Busy line did not clear within the step timeout
    Timeout,
    /// Controller did not acknowledge reset or power-on
    NoAck,
    /// Frame geometry or plane count does not match the panel
    FrameMismatch,
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bus => "bus error",
            Self::Pin => "pin error",
            Self::Timeout => "busy timeout",
            Self::NoAck => "no acknowledgment",
            Self::FrameMismatch => "frame mismatch",
        };
        f.write_str(name)
    }
}

/// Hardware or timing fault during a panel refresh
///
/// Only returned after the power-off sequence has been issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelError {
    /// Stage that failed first
    pub stage: PanelStage,
    /// Failure cause
    pub reason: FaultReason,
}

impl PanelError {
    /// Create a new panel error
    pub const fn new(stage: PanelStage, reason: FaultReason) -> Self {
        Self { stage, reason }
    }
}

impl fmt::Display for PanelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Panel fault during {}: {}", self.stage, self.reason)
    }
}

impl core::error::Error for PanelError {}

/// Network or transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// Could not join the network or reach the host
    ConnectFailed,
    /// Operation exceeded its deadline
    Timeout,
    /// Connection closed or reset by the peer
    Closed,
    /// Server answered with a non-success HTTP status
    Status(u16),
    /// Any other transport failure
    Other,
}

impl IoError {
    /// Map an [`embedded_io::ErrorKind`] onto the transport taxonomy
    pub fn from_kind(kind: embedded_io::ErrorKind) -> Self {
        use embedded_io::ErrorKind;
        match kind {
            ErrorKind::TimedOut => Self::Timeout,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                Self::Closed
            }
            ErrorKind::ConnectionRefused | ErrorKind::NotConnected | ErrorKind::AddrNotAvailable => {
                Self::ConnectFailed
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "Connection failed"),
            Self::Timeout => write!(f, "Operation timed out"),
            Self::Closed => write!(f, "Connection closed"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Other => write!(f, "Transport error"),
        }
    }
}

impl core::error::Error for IoError {}

/// Failure of a single sensor read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Bus transaction failed
    Bus,
    /// Conversion did not complete in time
    Timeout,
    /// Checksum mismatch in the sensor response
    Crc,
    /// Sensor not fitted
    Unavailable,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "Sensor bus error"),
            Self::Timeout => write!(f, "Sensor timeout"),
            Self::Crc => write!(f, "Sensor CRC mismatch"),
            Self::Unavailable => write!(f, "Sensor unavailable"),
        }
    }
}

impl core::error::Error for SensorError {}

/// Missing or invalid persisted settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Nothing stored yet
    Missing,
    /// SSID empty or longer than 32 bytes
    InvalidSsid,
    /// PSK shorter than 8 or longer than 63 bytes
    InvalidPsk,
    /// No page URL configured
    NoPages,
    /// More pages than the device can cycle through
    TooManyPages,
    /// Page URL at this index is not http(s)
    InvalidUrl(usize),
    /// Wake interval outside the allowed range
    InvalidInterval(u32),
    /// Backing storage failed
    Storage,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "No settings stored"),
            Self::InvalidSsid => write!(f, "Invalid WiFi SSID"),
            Self::InvalidPsk => write!(f, "Invalid WiFi passphrase"),
            Self::NoPages => write!(f, "No page URL configured"),
            Self::TooManyPages => write!(f, "Too many page URLs"),
            Self::InvalidUrl(index) => write!(f, "Page URL {index} is not http(s)"),
            Self::InvalidInterval(secs) => write!(f, "Wake interval {secs}s out of range"),
            Self::Storage => write!(f, "Settings storage failed"),
        }
    }
}

impl core::error::Error for ConfigError {}

/// The platform could not arm a wake source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmError;

impl fmt::Display for ArmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wake source could not be armed")
    }
}

impl core::error::Error for ArmError {}

/// Errors that can occur when building configuration
///
/// These errors occur before the first wake cycle runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuilderError {
    /// Panel width or height is zero
    InvalidDimensions {
        /// Requested width
        width: u16,
        /// Requested height
        height: u16,
    },
    /// A timing value is zero or inconsistent with another one
    InvalidTiming(&'static str),
    /// The watchdog would fire before the panel finishes a worst-case refresh
    WatchdogBudget {
        /// Configured watchdog timeout
        watchdog_ms: u32,
        /// Worst-case busy time of one refresh
        refresh_budget_ms: u32,
    },
}

impl fmt::Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { width, height } => {
                write!(f, "Invalid panel dimensions {width}x{height}")
            }
            Self::InvalidTiming(field) => write!(f, "Invalid timing value: {field}"),
            Self::WatchdogBudget {
                watchdog_ms,
                refresh_budget_ms,
            } => write!(
                f,
                "Watchdog {watchdog_ms}ms does not cover refresh budget {refresh_budget_ms}ms"
            ),
        }
    }
}

impl core::error::Error for BuilderError {}
