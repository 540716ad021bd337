//! Wake classification and page navigation
//!
//! The platform reports a raw [`WakeCause`]. For button wakes the scheduler
//! also measures how long the button stayed pressed; [`classify`] turns both
//! into a [`WakeReason`], and [`navigate`] applies the reason to the selected
//! page.
//!
//! ## Example
//!
//! ```
//! use reterminal_e100x::input::{Button, HoldThresholds, WakeCause, WakeReason, classify};
//!
//! let thresholds = HoldThresholds { long_press_ms: 2_000, provisioning_hold_ms: 30_000 };
//! let reason = classify(WakeCause::Button(Button::Left), 2_500, &thresholds);
//! assert_eq!(reason, WakeReason::ButtonLeftLong);
//! ```

use core::fmt;

/// Physical buttons that can wake the device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    /// Green refresh button
    Refresh,
    /// Previous page
    Left,
    /// Next page
    Right,
}

/// Raw wake source reported by the platform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeCause {
    /// Power applied or reset pin
    PowerOn,
    /// Sleep timer expired
    Timer,
    /// A button line woke the chip
    Button(Button),
    /// Watchdog reset
    Watchdog,
    /// Anything the platform cannot attribute
    Unknown,
}

/// Classified reason for this wake cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeReason {
    /// First boot after power loss
    ColdBoot,
    /// Scheduled refresh
    TimerExpired,
    /// Refresh button tapped
    ButtonRefreshShort,
    /// Refresh button held long enough to enter provisioning
    ButtonRefreshLong,
    /// Previous page
    ButtonLeftShort,
    /// Next page
    ButtonRightShort,
    /// Jump to the first page
    ButtonLeftLong,
    /// Jump to the last page
    ButtonRightLong,
    /// Recovery after a watchdog reset
    WatchdogRecovery,
}

impl WakeReason {
    /// Name used in reports
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ColdBoot => "cold_boot",
            Self::TimerExpired => "timer",
            Self::ButtonRefreshShort => "refresh_short",
            Self::ButtonRefreshLong => "refresh_long",
            Self::ButtonLeftShort => "left_short",
            Self::ButtonRightShort => "right_short",
            Self::ButtonLeftLong => "left_long",
            Self::ButtonRightLong => "right_long",
            Self::WatchdogRecovery => "watchdog",
        }
    }

    /// Whether this wake only changes the page, without touching the network
    ///
    /// Long Left/Right presses jump to the first or last page and are page
    /// changes like the short ones.
    pub const fn is_page_change(self) -> bool {
        matches!(
            self,
            Self::ButtonLeftShort
                | Self::ButtonRightShort
                | Self::ButtonLeftLong
                | Self::ButtonRightLong
        )
    }
}

impl fmt::Display for WakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hold durations that separate short and long presses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HoldThresholds {
    /// Left/Right long press
    pub long_press_ms: u32,
    /// Refresh hold that enters provisioning
    pub provisioning_hold_ms: u32,
}

/// Classify a wake cause and the measured button hold time
pub fn classify(cause: WakeCause, held_ms: u32, thresholds: &HoldThresholds) -> WakeReason {
    match cause {
        WakeCause::PowerOn => WakeReason::ColdBoot,
        WakeCause::Timer | WakeCause::Unknown => WakeReason::TimerExpired,
        WakeCause::Watchdog => WakeReason::WatchdogRecovery,
        WakeCause::Button(Button::Refresh) => {
            if held_ms >= thresholds.provisioning_hold_ms {
                WakeReason::ButtonRefreshLong
            } else {
                WakeReason::ButtonRefreshShort
            }
        }
        WakeCause::Button(Button::Left) => {
            if held_ms >= thresholds.long_press_ms {
                WakeReason::ButtonLeftLong
            } else {
                WakeReason::ButtonLeftShort
            }
        }
        WakeCause::Button(Button::Right) => {
            if held_ms >= thresholds.long_press_ms {
                WakeReason::ButtonRightLong
            } else {
                WakeReason::ButtonRightShort
            }
        }
    }
}

/// Page selected after applying `reason` to `page`
///
/// Left/Right wrap around; long presses jump to the first or last page.
/// Every other reason keeps the page, clamped into range.
pub fn navigate(reason: WakeReason, page: u8, count: u8) -> u8 {
    if count == 0 {
        return 0;
    }
    let last = count - 1;
    let page = page.min(last);
    match reason {
        WakeReason::ButtonLeftShort => {
            if page == 0 {
                last
            } else {
                page - 1
            }
        }
        WakeReason::ButtonRightShort => {
            if page == last {
                0
            } else {
                page + 1
            }
        }
        WakeReason::ButtonLeftLong => 0,
        WakeReason::ButtonRightLong => last,
        _ => page,
    }
}
