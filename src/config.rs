//! Panel geometry and wake-cycle configuration

pub use crate::error::BuilderError;
use crate::dither::DiffusionKernel;
use crate::input::HoldThresholds;
use crate::pipeline::ResamplePolicy;

/// Largest panel edge any supported controller can drive
pub const MAX_PANEL_EDGE: u16 = 2048;

/// Order in which the controller scans native pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanOrder {
    /// Image rows map onto native rows
    #[default]
    RowMajor,
    /// Image rows map onto native columns (panel mounted portrait)
    ColumnMajor,
}

/// Immutable panel geometry
///
/// `width` and `height` are the controller's native dimensions. The logical
/// (image) dimensions are the same for [`ScanOrder::RowMajor`] and transposed
/// for [`ScanOrder::ColumnMajor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelGeometry {
    width: u16,
    height: u16,
    scan: ScanOrder,
    mirror_x: bool,
    mirror_y: bool,
}

impl PanelGeometry {
    /// Create a row-major, unmirrored geometry
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::InvalidDimensions` if either edge is zero or
    /// larger than [`MAX_PANEL_EDGE`].
    pub const fn new(width: u16, height: u16) -> Result<Self, BuilderError> {
        if width == 0 || height == 0 || width > MAX_PANEL_EDGE || height > MAX_PANEL_EDGE {
            return Err(BuilderError::InvalidDimensions { width, height });
        }
        Ok(Self::fixed(width, height))
    }

    /// Geometry for static panel tables, dimensions known to be valid
    pub(crate) const fn fixed(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            scan: ScanOrder::RowMajor,
            mirror_x: false,
            mirror_y: false,
        }
    }

    /// Same geometry with a different scan order
    pub const fn with_scan(mut self, scan: ScanOrder) -> Self {
        self.scan = scan;
        self
    }

    /// Same geometry with native mirroring flags
    ///
    /// Mirroring applies after the scan-order transpose.
    pub const fn with_mirror(mut self, mirror_x: bool, mirror_y: bool) -> Self {
        self.mirror_x = mirror_x;
        self.mirror_y = mirror_y;
        self
    }

    /// Native width in pixels
    pub const fn native_width(&self) -> u16 {
        self.width
    }

    /// Native height in pixels
    pub const fn native_height(&self) -> u16 {
        self.height
    }

    /// Scan order
    pub const fn scan(&self) -> ScanOrder {
        self.scan
    }

    /// Whether native X is mirrored
    pub const fn mirror_x(&self) -> bool {
        self.mirror_x
    }

    /// Whether native Y is mirrored
    pub const fn mirror_y(&self) -> bool {
        self.mirror_y
    }

    /// Width of the image the panel shows
    pub const fn logical_width(&self) -> u16 {
        match self.scan {
            ScanOrder::RowMajor => self.width,
            ScanOrder::ColumnMajor => self.height,
        }
    }

    /// Height of the image the panel shows
    pub const fn logical_height(&self) -> u16 {
        match self.scan {
            ScanOrder::RowMajor => self.height,
            ScanOrder::ColumnMajor => self.width,
        }
    }

    /// Bytes per native row in one plane
    pub const fn plane_stride(&self) -> usize {
        (self.width as usize).div_ceil(8)
    }

    /// Bytes in one plane
    pub const fn plane_len(&self) -> usize {
        self.plane_stride() * self.height as usize
    }
}

/// Timing and rendering parameters of a wake cycle
///
/// Use [`Builder`] to create one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleConfig {
    /// Sleep interval when settings are unusable or timer arming failed
    pub fallback_interval_s: u32,
    /// Shortest sleep the scheduler will ever arm
    pub min_sleep_ms: u32,
    /// Hold time separating a short from a long Left/Right press
    pub long_press_ms: u32,
    /// Hold time on the refresh button that enters provisioning
    pub provisioning_hold_ms: u32,
    /// Button sampling period while measuring a hold
    pub hold_poll_ms: u32,
    /// Deadline for joining the network
    pub connect_timeout_ms: u32,
    /// Deadline for a provisioning session
    pub provisioning_timeout_ms: u32,
    /// Hardware watchdog period
    pub watchdog_timeout_ms: u32,
    /// Error-diffusion kernel used for rendering
    pub kernel: DiffusionKernel,
    /// How source images are fitted to the panel
    pub resample: ResamplePolicy,
    /// Clip diffused colors onto the palette's gamut
    pub gamut_clip: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            fallback_interval_s: 3600,
            min_sleep_ms: 30_000,
            long_press_ms: 2_000,
            provisioning_hold_ms: 30_000,
            hold_poll_ms: 50,
            connect_timeout_ms: 15_000,
            provisioning_timeout_ms: 300_000,
            watchdog_timeout_ms: 60_000,
            kernel: DiffusionKernel::FLOYD_STEINBERG,
            resample: ResamplePolicy::default(),
            gamut_clip: false,
        }
    }
}

impl CycleConfig {
    /// Button hold thresholds used to classify wakes
    pub const fn thresholds(&self) -> HoldThresholds {
        HoldThresholds {
            long_press_ms: self.long_press_ms,
            provisioning_hold_ms: self.provisioning_hold_ms,
        }
    }

    /// Fallback interval in milliseconds
    pub const fn fallback_interval_ms(&self) -> u64 {
        self.fallback_interval_s as u64 * 1000
    }
}

/// Builder for constructing a [`CycleConfig`]
///
/// # Example
///
/// ```
/// use reterminal_e100x::{Builder, DiffusionKernel};
///
/// let config = match Builder::new()
///     .kernel(DiffusionKernel::ATKINSON)
///     .min_sleep_ms(60_000)
///     .build()
/// {
///     Ok(config) => config,
///     Err(_) => return,
/// };
/// assert_eq!(config.min_sleep_ms, 60_000);
/// ```
#[must_use]
#[derive(Default)]
pub struct Builder {
    config: CycleConfig,
}

impl Builder {
    /// Create a new Builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback sleep interval in seconds
    pub fn fallback_interval_s(mut self, value: u32) -> Self {
        self.config.fallback_interval_s = value;
        self
    }

    /// Set the minimum sleep duration
    pub fn min_sleep_ms(mut self, value: u32) -> Self {
        self.config.min_sleep_ms = value;
        self
    }

    /// Set the long-press threshold for Left/Right
    pub fn long_press_ms(mut self, value: u32) -> Self {
        self.config.long_press_ms = value;
        self
    }

    /// Set the refresh-button hold that enters provisioning
    pub fn provisioning_hold_ms(mut self, value: u32) -> Self {
        self.config.provisioning_hold_ms = value;
        self
    }

    /// Set the button sampling period
    pub fn hold_poll_ms(mut self, value: u32) -> Self {
        self.config.hold_poll_ms = value;
        self
    }

    /// Set the network join deadline
    pub fn connect_timeout_ms(mut self, value: u32) -> Self {
        self.config.connect_timeout_ms = value;
        self
    }

    /// Set the provisioning session deadline
    pub fn provisioning_timeout_ms(mut self, value: u32) -> Self {
        self.config.provisioning_timeout_ms = value;
        self
    }

    /// Set the watchdog period
    pub fn watchdog_timeout_ms(mut self, value: u32) -> Self {
        self.config.watchdog_timeout_ms = value;
        self
    }

    /// Set the error-diffusion kernel
    pub fn kernel(mut self, kernel: DiffusionKernel) -> Self {
        self.config.kernel = kernel;
        self
    }

    /// Set the resample policy
    pub fn resample(mut self, policy: ResamplePolicy) -> Self {
        self.config.resample = policy;
        self
    }

    /// Enable gamut clipping while dithering
    pub fn gamut_clip(mut self, enabled: bool) -> Self {
        self.config.gamut_clip = enabled;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::InvalidTiming` naming the first field that is
    /// zero or inconsistent with another field.
    pub fn build(self) -> Result<CycleConfig, BuilderError> {
        let c = self.config;
        if c.fallback_interval_s == 0 {
            return Err(BuilderError::InvalidTiming("fallback_interval_s"));
        }
        if c.min_sleep_ms == 0 || u64::from(c.min_sleep_ms) > u64::from(c.fallback_interval_s) * 1000
        {
            return Err(BuilderError::InvalidTiming("min_sleep_ms"));
        }
        if c.hold_poll_ms == 0 {
            return Err(BuilderError::InvalidTiming("hold_poll_ms"));
        }
        if c.long_press_ms == 0 || c.long_press_ms >= c.provisioning_hold_ms {
            return Err(BuilderError::InvalidTiming("long_press_ms"));
        }
        if c.connect_timeout_ms == 0 {
            return Err(BuilderError::InvalidTiming("connect_timeout_ms"));
        }
        if c.provisioning_timeout_ms == 0 {
            return Err(BuilderError::InvalidTiming("provisioning_timeout_ms"));
        }
        if c.watchdog_timeout_ms == 0 {
            return Err(BuilderError::InvalidTiming("watchdog_timeout_ms"));
        }
        if let ResamplePolicy::NearestNeighbor { max_factor: 0 } = c.resample {
            return Err(BuilderError::InvalidTiming("resample.max_factor"));
        }
        Ok(c)
    }
}
