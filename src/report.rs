//! Cycle outcome and its wire encodings
//!
//! Each wake cycle ends with a [`CycleStatus`] that is handed, together with
//! the sensor reading, to a [`ReportSink`]. [`Report`] renders both in the two
//! shapes sinks usually need: TRMNL-style HTTP header pairs and a compact JSON
//! object. Fields whose sensor could not be read are left out.
//!
//! ## Example
//!
//! ```
//! use reterminal_e100x::input::WakeReason;
//! use reterminal_e100x::report::{CycleStatus, FetchStatus, PanelStatus, Report};
//! use reterminal_e100x::sensor::SensorReading;
//!
//! let reading = SensorReading { battery_mv: Some(4012), ..SensorReading::default() };
//! let status = CycleStatus {
//!     reason: WakeReason::TimerExpired,
//!     cycle: 12,
//!     page: 0,
//!     interval_s: 900,
//!     rssi: None,
//!     fetch: FetchStatus::Rendered,
//!     panel: PanelStatus::Refreshed,
//! };
//! let headers = match Report::new(&reading, &status).headers() {
//!     Ok(headers) => headers,
//!     Err(_) => return,
//! };
//! assert_eq!(headers[0].name, "Battery-Voltage");
//! assert_eq!(headers[0].value.as_str(), "4.01");
//! ```

use core::fmt::{self, Write};

use heapless::{String, Vec};

use crate::error::{DecodeError, IoError, PanelError};
use crate::input::WakeReason;
use crate::sensor::SensorReading;

/// Most header pairs a report produces
pub const MAX_HEADERS: usize = 8;

/// Capacity of one header value
pub const HEADER_VALUE_LEN: usize = 32;

/// Capacity of the JSON encoding
pub const JSON_LEN: usize = 320;

/// Why no image reached the panel
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FetchFailure {
    /// Network join failed, nothing was requested
    ConnectFailed(IoError),
    /// Request or body transfer failed
    Fetch(IoError),
    /// Body was not a usable image
    Decode(DecodeError),
    /// Settings have no URL for the selected page
    NoPage,
}

/// Outcome of the fetch-and-render stage
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FetchStatus {
    /// A new frame was rendered
    Rendered,
    /// No fetch this cycle (page change, provisioning)
    Skipped,
    /// Fetch or render failed
    Failed(FetchFailure),
}

impl FetchStatus {
    /// Short name used in reports
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rendered => "rendered",
            Self::Skipped => "skipped",
            Self::Failed(FetchFailure::ConnectFailed(_)) => "connect_failed",
            Self::Failed(FetchFailure::Fetch(_)) => "fetch_failed",
            Self::Failed(FetchFailure::Decode(_)) => "decode_failed",
            Self::Failed(FetchFailure::NoPage) => "no_page",
        }
    }
}

/// Outcome of the panel stage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelStatus {
    /// Frame shown, panel asleep
    Refreshed,
    /// Refresh failed, power-off was still issued
    Faulted(PanelError),
    /// No refresh this cycle
    NotAttempted,
}

impl fmt::Display for PanelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refreshed => f.write_str("refreshed"),
            Self::Faulted(err) => write!(f, "fault:{}", err.stage),
            Self::NotAttempted => f.write_str("idle"),
        }
    }
}

/// What one wake cycle did
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleStatus {
    /// Classified wake reason
    pub reason: WakeReason,
    /// Cycle counter
    pub cycle: u32,
    /// Page selected for this cycle
    pub page: u8,
    /// Configured refresh interval in seconds
    pub interval_s: u32,
    /// Link quality, if the network was joined
    pub rssi: Option<i8>,
    /// Fetch-and-render outcome
    pub fetch: FetchStatus,
    /// Panel outcome
    pub panel: PanelStatus,
}

/// Destination for the end-of-cycle report
pub trait ReportSink {
    /// Deliver one report
    ///
    /// Failures are logged by the caller and never retried.
    fn send(&mut self, reading: &SensorReading, status: &CycleStatus) -> Result<(), IoError>;
}

/// Sink that only logs the report
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn send(&mut self, reading: &SensorReading, status: &CycleStatus) -> Result<(), IoError> {
        match Report::new(reading, status).to_json() {
            Ok(json) => log::info!("report: {}", json.as_str()),
            Err(_) => log::warn!("report: encoding overflow"),
        }
        Ok(())
    }
}

/// One HTTP header pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Header name
    pub name: &'static str,
    /// Header value
    pub value: String<HEADER_VALUE_LEN>,
}

/// Encoder for a reading plus a cycle status
#[derive(Clone, Copy, Debug)]
pub struct Report<'a> {
    reading: &'a SensorReading,
    status: &'a CycleStatus,
}

impl<'a> Report<'a> {
    /// Borrow the parts of a report
    pub fn new(reading: &'a SensorReading, status: &'a CycleStatus) -> Self {
        Self { reading, status }
    }

    /// Render as HTTP header pairs
    ///
    /// # Errors
    ///
    /// Returns `fmt::Error` if a value does not fit its buffer.
    pub fn headers(&self) -> Result<Vec<Header, MAX_HEADERS>, fmt::Error> {
        let mut headers: Vec<Header, MAX_HEADERS> = Vec::new();
        let mut add = |name: &'static str, args: fmt::Arguments<'_>| -> fmt::Result {
            let mut value = String::new();
            value.write_fmt(args)?;
            headers.push(Header { name, value }).map_err(|_| fmt::Error)
        };

        if let Some(mv) = self.reading.battery_mv {
            add("Battery-Voltage", format_args!("{}", Millivolts(mv)))?;
        }
        if let Some(dc) = self.reading.temperature_dc {
            add("Temperature", format_args!("{}", Tenths(i32::from(dc))))?;
        }
        if let Some(dpct) = self.reading.humidity_dpct {
            add("Humidity", format_args!("{}", Tenths(i32::from(dpct))))?;
        }
        if let Some(rssi) = self.status.rssi {
            add("RSSI", format_args!("{rssi}"))?;
        }
        add("Refresh-Rate", format_args!("{}", self.status.interval_s))?;
        add("Wake-Reason", format_args!("{}", self.status.reason))?;
        add("Fetch-Status", format_args!("{}", self.status.fetch.as_str()))?;
        add("Panel-Status", format_args!("{}", self.status.panel))?;
        Ok(headers)
    }

    /// Write the compact JSON encoding into `out`
    pub fn write_json<W: Write>(&self, out: &mut W) -> fmt::Result {
        out.write_char('{')?;
        if let Some(mv) = self.reading.battery_mv {
            write!(out, "\"battery_v\":{},", Millivolts(mv))?;
        }
        if let Some(pct) = self.reading.battery_percentage() {
            write!(out, "\"battery_pct\":{pct},")?;
        }
        if let Some(dc) = self.reading.temperature_dc {
            write!(out, "\"temperature_c\":{},", Tenths(i32::from(dc)))?;
        }
        if let Some(dpct) = self.reading.humidity_dpct {
            write!(out, "\"humidity_pct\":{},", Tenths(i32::from(dpct)))?;
        }
        if let Some(rssi) = self.status.rssi {
            write!(out, "\"rssi\":{rssi},")?;
        }
        write!(
            out,
            "\"wake_reason\":\"{}\",\"cycle\":{},\"page\":{},\"refresh_rate\":{},\"fetch\":\"{}\",\"panel\":\"{}\"}}",
            self.status.reason,
            self.status.cycle,
            self.status.page,
            self.status.interval_s,
            self.status.fetch.as_str(),
            self.status.panel
        )
    }

    /// Render as a compact JSON object
    ///
    /// # Errors
    ///
    /// Returns `fmt::Error` if the encoding exceeds [`JSON_LEN`].
    pub fn to_json(&self) -> Result<String<JSON_LEN>, fmt::Error> {
        let mut json = String::new();
        self.write_json(&mut json)?;
        Ok(json)
    }
}

/// Millivolts shown as volts with two decimals
struct Millivolts(u16);

impl fmt::Display for Millivolts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 1000, (self.0 % 1000) / 10)
    }
}

/// Fixed-point value in tenths
struct Tenths(i32);

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{}", abs / 10, abs % 10)
    }
}
