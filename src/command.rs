//! Panel command tables
//!
//! Both reTerminal panels are driven by UC81xx-family controllers that share
//! one command structure:
//! 1. Set DC low (command mode) and send the command byte
//! 2. Set DC high (data mode) and send the payload, if any
//! 3. Optionally wait for the BUSY line to clear
//!
//! Everything that differs between variants lives in a static [`PanelSpec`],
//! so the driver state machine is the same for every panel.
//!
//! ## Example
//!
//! ```
//! use reterminal_e100x::command::{self, PanelVariant, PlaneTransfer};
//!
//! let spec = PanelVariant::E1002.spec();
//! assert_eq!(spec.refresh.command, command::DISPLAY_REFRESH);
//! assert!(matches!(spec.transfer, PlaneTransfer::Nibble { .. }));
//! ```

use core::fmt;

use crate::color::{MONOCHROME, Palette, SPECTRA6};
use crate::config::PanelGeometry;

// Controller commands

/// Panel setting (PSR)
pub const PANEL_SETTING: u8 = 0x00;

/// Power setting (PWR)
pub const POWER_SETTING: u8 = 0x01;

/// Power off (POF)
///
/// Shuts the charge pump down. Wait for BUSY afterwards.
pub const POWER_OFF: u8 = 0x02;

/// Power off sequence setting (PFS)
pub const POWER_OFF_SEQUENCE: u8 = 0x03;

/// Power on (PON)
///
/// Starts the charge pump. Wait for BUSY afterwards.
pub const POWER_ON: u8 = 0x04;

/// Booster soft start, phase 1
pub const BOOSTER_SOFT_START_1: u8 = 0x05;

/// Booster soft start, phase 2
pub const BOOSTER_SOFT_START_2: u8 = 0x06;

/// Deep sleep (DSLP)
///
/// Needs the check code [`DEEP_SLEEP_CHECK`]. Only a hardware reset wakes the
/// controller again.
pub const DEEP_SLEEP: u8 = 0x07;

/// Booster soft start, phase 3
pub const BOOSTER_SOFT_START_3: u8 = 0x08;

/// Data start transmission 1 (DTM1)
///
/// Old-frame plane on monochrome controllers, the 4-bit pixel stream on
/// Spectra 6 controllers.
pub const DATA_START_TRANSMISSION_1: u8 = 0x10;

/// Display refresh (DRF)
pub const DISPLAY_REFRESH: u8 = 0x12;

/// Data start transmission 2 (DTM2), new-frame plane
pub const DATA_START_TRANSMISSION_2: u8 = 0x13;

/// Dual SPI mode
pub const DUAL_SPI: u8 = 0x15;

/// PLL control
pub const PLL_CONTROL: u8 = 0x30;

/// VCOM and data interval setting (CDI)
pub const VCOM_DATA_INTERVAL: u8 = 0x50;

/// TCON setting
pub const TCON_SETTING: u8 = 0x60;

/// Resolution setting (TRES)
pub const RESOLUTION: u8 = 0x61;

/// VCOM DC setting
pub const VCOM_DC: u8 = 0x84;

/// Power saving (PWS)
pub const POWER_SAVING: u8 = 0xE3;

/// Command header unlock (Spectra 6 only)
pub const COMMAND_HEADER: u8 = 0xAA;

/// Check code for [`DEEP_SLEEP`]
pub const DEEP_SLEEP_CHECK: u8 = 0xA5;

/// One command with its payload and the busy wait that follows it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandStep {
    /// Command byte
    pub command: u8,
    /// Data bytes sent after the command
    pub payload: &'static [u8],
    /// Busy-wait timeout after the step, 0 for no wait
    pub busy_timeout_ms: u32,
}

impl CommandStep {
    /// Step without a busy wait
    pub const fn new(command: u8, payload: &'static [u8]) -> Self {
        Self {
            command,
            payload,
            busy_timeout_ms: 0,
        }
    }

    /// Step followed by a busy wait
    pub const fn wait(command: u8, payload: &'static [u8], busy_timeout_ms: u32) -> Self {
        Self {
            command,
            payload,
            busy_timeout_ms,
        }
    }
}

/// One plane upload on a planar controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneWrite {
    /// Data transmission command
    pub command: u8,
    /// Frame buffer plane to send
    pub plane: u8,
    /// Send the plane bitwise inverted
    pub invert: bool,
}

/// How frame buffer planes reach the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneTransfer {
    /// Each plane is a separate bit-packed upload, in table order
    Planar(&'static [PlaneWrite]),
    /// All planes combined into 4-bit native codes, two pixels per byte
    /// with the left pixel in the high nibble
    Nibble {
        /// Data transmission command
        command: u8,
        /// Code sent for the padding nibble of an odd-width row
        pad: u8,
    },
}

/// Reset pulse timing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResetTiming {
    /// RST held high before the pulse
    pub high_ms: u32,
    /// RST held low
    pub low_ms: u32,
    /// Settle time after release
    pub settle_ms: u32,
}

/// Everything the driver needs to know about one panel variant
#[derive(Clone, Copy, Debug)]
pub struct PanelSpec {
    /// Variant this table describes
    pub variant: PanelVariant,
    /// Native geometry
    pub geometry: PanelGeometry,
    /// Colors the panel renders
    pub palette: Palette<'static>,
    /// BUSY polarity
    pub busy_active_high: bool,
    /// Reset pulse
    pub reset: ResetTiming,
    /// Register setup sent after reset
    pub init: &'static [CommandStep],
    /// Charge pump start
    pub power_on: CommandStep,
    /// Frame upload
    pub transfer: PlaneTransfer,
    /// Refresh trigger, with the long busy wait
    pub refresh: CommandStep,
    /// Charge pump shutdown
    pub power_off: CommandStep,
    /// Deep sleep entry
    pub deep_sleep: CommandStep,
}

impl PanelSpec {
    /// Worst-case time spent waiting on BUSY during one refresh
    pub fn refresh_budget_ms(&self) -> u32 {
        let reset = self.reset.high_ms + self.reset.low_ms + self.reset.settle_ms;
        self.init
            .iter()
            .chain([
                &self.power_on,
                &self.refresh,
                &self.power_off,
                &self.deep_sleep,
            ])
            .fold(reset, |total, step| total.saturating_add(step.busy_timeout_ms))
    }
}

/// Supported reTerminal panels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelVariant {
    /// 7.5" monochrome, UC8179
    E1001,
    /// 7.3" Spectra 6 color, GDEP073E01
    E1002,
}

impl PanelVariant {
    /// Static command table for the variant
    pub fn spec(self) -> &'static PanelSpec {
        match self {
            Self::E1001 => &E1001,
            Self::E1002 => &E1002,
        }
    }
}

impl fmt::Display for PanelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::E1001 => f.write_str("E1001"),
            Self::E1002 => f.write_str("E1002"),
        }
    }
}

const RESET_10MS: ResetTiming = ResetTiming {
    high_ms: 10,
    low_ms: 10,
    settle_ms: 10,
};

static E1001_INIT: [CommandStep; 6] = [
    CommandStep::new(POWER_SETTING, &[0x07, 0x07, 0x3F, 0x3F]),
    CommandStep::new(PANEL_SETTING, &[0x1F]),
    CommandStep::new(RESOLUTION, &[0x03, 0x20, 0x01, 0xE0]),
    CommandStep::new(DUAL_SPI, &[0x00]),
    CommandStep::new(VCOM_DATA_INTERVAL, &[0x10, 0x07]),
    CommandStep::new(TCON_SETTING, &[0x22]),
];

static E1001_PLANES: [PlaneWrite; 1] = [PlaneWrite {
    command: DATA_START_TRANSMISSION_2,
    plane: 0,
    invert: false,
}];

static E1001: PanelSpec = PanelSpec {
    variant: PanelVariant::E1001,
    geometry: PanelGeometry::fixed(800, 480),
    palette: MONOCHROME,
    busy_active_high: false,
    reset: RESET_10MS,
    init: &E1001_INIT,
    power_on: CommandStep::wait(POWER_ON, &[], 1_000),
    transfer: PlaneTransfer::Planar(&E1001_PLANES),
    refresh: CommandStep::wait(DISPLAY_REFRESH, &[], 10_000),
    power_off: CommandStep::wait(POWER_OFF, &[], 1_000),
    deep_sleep: CommandStep::new(DEEP_SLEEP, &[DEEP_SLEEP_CHECK]),
};

static E1002_INIT: [CommandStep; 13] = [
    CommandStep::new(COMMAND_HEADER, &[0x49, 0x55, 0x20, 0x08, 0x09, 0x18]),
    CommandStep::new(POWER_SETTING, &[0x3F]),
    CommandStep::new(PANEL_SETTING, &[0x5F, 0x69]),
    CommandStep::new(POWER_OFF_SEQUENCE, &[0x00, 0x54, 0x00, 0x44]),
    CommandStep::new(BOOSTER_SOFT_START_1, &[0x40, 0x1F, 0x1F, 0x2C]),
    CommandStep::new(BOOSTER_SOFT_START_2, &[0x6F, 0x1F, 0x17, 0x49]),
    CommandStep::new(BOOSTER_SOFT_START_3, &[0x6F, 0x1F, 0x1F, 0x22]),
    CommandStep::new(PLL_CONTROL, &[0x03]),
    CommandStep::new(VCOM_DATA_INTERVAL, &[0x3F]),
    CommandStep::new(TCON_SETTING, &[0x02, 0x00]),
    CommandStep::new(RESOLUTION, &[0x03, 0x20, 0x01, 0xE0]),
    CommandStep::new(VCOM_DC, &[0x01]),
    CommandStep::new(POWER_SAVING, &[0x2F]),
];

static E1002: PanelSpec = PanelSpec {
    variant: PanelVariant::E1002,
    geometry: PanelGeometry::fixed(800, 480),
    palette: SPECTRA6,
    busy_active_high: false,
    reset: RESET_10MS,
    init: &E1002_INIT,
    power_on: CommandStep::wait(POWER_ON, &[], 1_000),
    transfer: PlaneTransfer::Nibble {
        command: DATA_START_TRANSMISSION_1,
        pad: 1,
    },
    refresh: CommandStep::wait(DISPLAY_REFRESH, &[0x00], 40_000),
    power_off: CommandStep::wait(POWER_OFF, &[0x00], 1_000),
    deep_sleep: CommandStep::new(DEEP_SLEEP, &[DEEP_SLEEP_CHECK]),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_match_palettes() {
        let mono = PanelVariant::E1001.spec();
        assert_eq!(mono.palette.plane_count(), 1);
        let PlaneTransfer::Planar(planes) = mono.transfer else {
            unreachable!("E1001 uploads planes");
        };
        assert!(planes.iter().all(|p| usize::from(p.plane) < 1));

        let color = PanelVariant::E1002.spec();
        assert_eq!(color.palette.plane_count(), 3);
        assert_eq!(color.init[0].command, COMMAND_HEADER);
    }

    #[test]
    fn test_resolution_payload_matches_geometry() {
        for variant in [PanelVariant::E1001, PanelVariant::E1002] {
            let spec = variant.spec();
            let step = spec
                .init
                .iter()
                .find(|s| s.command == RESOLUTION)
                .unwrap();
            let width = u16::from_be_bytes([step.payload[0], step.payload[1]]);
            let height = u16::from_be_bytes([step.payload[2], step.payload[3]]);
            assert_eq!(width, spec.geometry.native_width());
            assert_eq!(height, spec.geometry.native_height());
        }
    }

    #[test]
    fn test_refresh_budget() {
        // reset 30 + power on 1000 + refresh 40000 + power off 1000
        assert_eq!(PanelVariant::E1002.spec().refresh_budget_ms(), 42_030);
        assert_eq!(PanelVariant::E1001.spec().refresh_budget_ms(), 12_030);
    }
}
