//! Persisted settings and state retained across deep sleep
//!
//! [`Settings`] is what the provisioning portal writes: WiFi credentials, the
//! pages to cycle through and the wake interval. It lives behind a
//! [`ConfigStore`] so the scheduler never touches flash directly.
//!
//! [`RetainedState`] is the small block the scheduler keeps in RTC memory
//! between cycles. It is stored with a magic word and a CRC-32; a block that
//! fails either check decodes as the default state.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::ConfigError;

/// Longest SSID the 802.11 standard allows
pub const MAX_SSID_LEN: usize = 32;

/// WPA2 passphrase bounds
pub const PSK_LEN: core::ops::RangeInclusive<usize> = 8..=63;

/// Pages the buttons can cycle through
pub const MAX_PAGES: usize = 8;

/// Allowed wake interval in seconds
pub const INTERVAL_RANGE_S: core::ops::RangeInclusive<u32> = 60..=86_400;

/// User settings written by provisioning
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Network name
    pub wifi_ssid: String,
    /// Passphrase, empty for open networks
    pub wifi_psk: String,
    /// Image URLs, one per page
    pub page_urls: Vec<String>,
    /// Seconds between scheduled refreshes
    pub wake_interval_s: u32,
}

impl Settings {
    /// Check every field
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wifi_ssid.is_empty() || self.wifi_ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::InvalidSsid);
        }
        if !self.wifi_psk.is_empty() && !PSK_LEN.contains(&self.wifi_psk.len()) {
            return Err(ConfigError::InvalidPsk);
        }
        if self.page_urls.is_empty() {
            return Err(ConfigError::NoPages);
        }
        if self.page_urls.len() > MAX_PAGES {
            return Err(ConfigError::TooManyPages);
        }
        if let Some(index) = self.page_urls.iter().position(|url| !is_http_url(url)) {
            return Err(ConfigError::InvalidUrl(index));
        }
        if !INTERVAL_RANGE_S.contains(&self.wake_interval_s) {
            return Err(ConfigError::InvalidInterval(self.wake_interval_s));
        }
        Ok(())
    }

    /// Number of pages, saturated to `u8`
    pub fn page_count(&self) -> u8 {
        u8::try_from(self.page_urls.len()).unwrap_or(u8::MAX)
    }

    /// URL of `page`, if configured
    pub fn page_url(&self, page: u8) -> Option<&str> {
        self.page_urls.get(usize::from(page)).map(String::as_str)
    }

    /// Wake interval in milliseconds
    pub fn interval_ms(&self) -> u64 {
        u64::from(self.wake_interval_s) * 1000
    }
}

fn is_http_url(url: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        url.strip_prefix(scheme)
            .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'))
    })
}

/// Persistent settings storage
pub trait ConfigStore {
    /// Load the stored settings
    ///
    /// Returns `ConfigError::Missing` when nothing has been stored yet.
    fn get(&mut self) -> Result<Settings, ConfigError>;

    /// Replace the stored settings
    fn set(&mut self, settings: &Settings) -> Result<(), ConfigError>;
}

/// Load settings and validate them in one step
///
/// # Errors
///
/// Returns the store's error or the first invalid field.
pub fn load_valid<S: ConfigStore + ?Sized>(store: &mut S) -> Result<Settings, ConfigError> {
    let settings = store.get()?;
    settings.validate()?;
    Ok(settings)
}

/// Size of an encoded [`RetainedState`]
pub const RETAINED_LEN: usize = 24;

const RETAINED_MAGIC: [u8; 4] = *b"RTE1";
const FLAG_LAST_REFRESH: u8 = 0x01;

/// State carried from one wake cycle to the next
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetainedState {
    /// Completed wake cycles since cold boot
    pub cycle: u32,
    /// Selected page
    pub page: u8,
    /// Wall-clock time of the last successful refresh
    pub last_refresh_ms: Option<u64>,
}

impl RetainedState {
    /// Serialize into the retained-memory layout
    ///
    /// Little endian: magic, cycle, page, flags, two reserved bytes, last
    /// refresh, CRC-32 of everything before it.
    pub fn encode(&self) -> [u8; RETAINED_LEN] {
        let mut block = [0u8; RETAINED_LEN];
        block[0..4].copy_from_slice(&RETAINED_MAGIC);
        block[4..8].copy_from_slice(&self.cycle.to_le_bytes());
        block[8] = self.page;
        if let Some(ms) = self.last_refresh_ms {
            block[9] = FLAG_LAST_REFRESH;
            block[12..20].copy_from_slice(&ms.to_le_bytes());
        }
        let crc = crc32fast::hash(&block[..20]);
        block[20..].copy_from_slice(&crc.to_le_bytes());
        block
    }

    /// Parse a retained block
    ///
    /// Returns `None` when the magic or the CRC does not match, as after a
    /// power loss.
    pub fn decode(block: &[u8; RETAINED_LEN]) -> Option<Self> {
        if block[0..4] != RETAINED_MAGIC {
            return None;
        }
        let crc = u32::from_le_bytes([block[20], block[21], block[22], block[23]]);
        if crc32fast::hash(&block[..20]) != crc {
            log::warn!("retained state CRC mismatch");
            return None;
        }
        let mut cycle = [0u8; 4];
        cycle.copy_from_slice(&block[4..8]);
        let mut last = [0u8; 8];
        last.copy_from_slice(&block[12..20]);
        Some(Self {
            cycle: u32::from_le_bytes(cycle),
            page: block[8],
            last_refresh_ms: (block[9] & FLAG_LAST_REFRESH != 0)
                .then(|| u64::from_le_bytes(last)),
        })
    }

    /// Parse a retained block, falling back to the default state
    pub fn decode_or_default(block: &[u8; RETAINED_LEN]) -> Self {
        Self::decode(block).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    fn settings() -> Settings {
        Settings {
            wifi_ssid: "frame".to_string(),
            wifi_psk: "correct horse".to_string(),
            page_urls: vec![
                "https://example.com/a.png".to_string(),
                "http://10.0.0.2:8080/b.png".to_string(),
            ],
            wake_interval_s: 900,
        }
    }

    #[test]
    fn test_valid_settings() {
        let settings = settings();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.page_count(), 2);
        assert_eq!(settings.page_url(1), Some("http://10.0.0.2:8080/b.png"));
        assert_eq!(settings.page_url(2), None);
        assert_eq!(settings.interval_ms(), 900_000);
    }

    #[test]
    fn test_open_network_allowed() {
        let mut settings = settings();
        settings.wifi_psk.clear();
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn test_credential_bounds() {
        let mut s = settings();
        s.wifi_ssid.clear();
        assert_eq!(s.validate(), Err(ConfigError::InvalidSsid));

        let mut s = settings();
        s.wifi_ssid = "x".repeat(33);
        assert_eq!(s.validate(), Err(ConfigError::InvalidSsid));

        let mut s = settings();
        s.wifi_psk = "short".to_string();
        assert_eq!(s.validate(), Err(ConfigError::InvalidPsk));

        let mut s = settings();
        s.wifi_psk = "p".repeat(64);
        assert_eq!(s.validate(), Err(ConfigError::InvalidPsk));
    }

    #[test]
    fn test_page_rules() {
        let mut s = settings();
        s.page_urls.clear();
        assert_eq!(s.validate(), Err(ConfigError::NoPages));

        let mut s = settings();
        s.page_urls = vec!["https://example.com/x.png".to_string(); 9];
        assert_eq!(s.validate(), Err(ConfigError::TooManyPages));

        let mut s = settings();
        s.page_urls.push("ftp://example.com/c.png".to_string());
        assert_eq!(s.validate(), Err(ConfigError::InvalidUrl(2)));

        let mut s = settings();
        s.page_urls[0] = "https://".to_string();
        assert_eq!(s.validate(), Err(ConfigError::InvalidUrl(0)));
    }

    #[test]
    fn test_interval_bounds() {
        let mut s = settings();
        s.wake_interval_s = 59;
        assert_eq!(s.validate(), Err(ConfigError::InvalidInterval(59)));
        s.wake_interval_s = 86_400;
        assert_eq!(s.validate(), Ok(()));
        s.wake_interval_s = 86_401;
        assert_eq!(s.validate(), Err(ConfigError::InvalidInterval(86_401)));
    }

    #[test]
    fn test_retained_state_round_trip() {
        let state = RetainedState {
            cycle: 41,
            page: 3,
            last_refresh_ms: Some(1_700_000_000_000),
        };
        assert_eq!(RetainedState::decode(&state.encode()), Some(state));

        let state = RetainedState {
            last_refresh_ms: None,
            ..state
        };
        assert_eq!(RetainedState::decode(&state.encode()), Some(state));
    }

    #[test]
    fn test_corrupt_retained_state_is_default() {
        let state = RetainedState {
            cycle: 7,
            page: 1,
            last_refresh_ms: Some(5),
        };
        let mut block = state.encode();
        block[4] ^= 0x01;
        assert_eq!(RetainedState::decode(&block), None);
        assert_eq!(
            RetainedState::decode_or_default(&block),
            RetainedState::default()
        );
        assert_eq!(
            RetainedState::decode_or_default(&[0u8; RETAINED_LEN]),
            RetainedState::default()
        );
    }
}
