//! Hardware and playback configuration for Tunebox
//! RP2040 driving a DFPlayer Mini over UART0

use crate::player::{Equalizer, StorageDevice};

// ===================================================================
// Serial Link - DFPlayer Mini
// ===================================================================

// DFPlayer TX -> RP2040 RX, DFPlayer RX <- RP2040 TX (1k series resistor recommended)
pub const DFPLAYER_TX_PIN: u8 = 16; // UART0 TX
pub const DFPLAYER_RX_PIN: u8 = 17; // UART0 RX
pub const DFPLAYER_BAUDRATE: u32 = 9_600; // Fixed by the module, 8N1

pub const UART_TX_BUF_SIZE: usize = 32;
pub const UART_RX_BUF_SIZE: usize = 64;

// ===================================================================
// Playback Defaults
// ===================================================================

pub const DFPLAYER_DEFAULT_VOLUME: u8 = 20; // 0..=30
pub const DFPLAYER_MAX_VOLUME: u8 = 30;
pub const DFPLAYER_TARGET_TRACK: u16 = 1; // /mp3/0001.mp3
pub const DFPLAYER_DEVICE: StorageDevice = StorageDevice::Sd;
pub const DFPLAYER_EQ: Equalizer = Equalizer::Normal;

// ===================================================================
// Bring-Up Timing
// ===================================================================

pub const POWER_UP_SETTLE_MS: u32 = 1_500; // Some clones need more than 1s
pub const LINK_ATTEMPTS: u32 = 3;
pub const LINK_RETRY_BACKOFF_MS: u32 = 600;
pub const DEVICE_SELECT_SETTLE_MS: u32 = 1_200;
pub const STORAGE_READY_TIMEOUT_MS: u64 = 4_000;
pub const STORAGE_READY_POLL_MS: u32 = 150;
pub const PRE_PLAY_DELAY_MS: u32 = 500;
pub const PLAY_VERIFY_DELAY_MS: u32 = 1_500;
pub const CORRECTIVE_SETTLE_MS: u32 = 200;

// ===================================================================
// Driver Timing
// ===================================================================

pub const REPLY_TIMEOUT_MS: u32 = 1_000; // Per-frame wait for a query reply
pub const HANDSHAKE_TIMEOUT_MS: u32 = 2_000; // Wait for the online notification after reset
pub const EVENT_POLL_WINDOW_MS: u32 = 10;
pub const EVENT_QUEUE_DEPTH: usize = 8;

// ===================================================================
// Supervision
// ===================================================================

pub const STATUS_REPORT_INTERVAL_MS: u64 = 3_000;
pub const ONE_SHOT_RETRY_AFTER_MS: u64 = 5_000; // Measured from boot
pub const SUPERVISE_TICK_MS: u32 = 20;

/// Tunable parameters of the bring-up and supervision sequence
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlaybackConfig {
    pub volume: u8,
    pub track: u16,
    pub device: StorageDevice,
    pub equalizer: Equalizer,
    /// Folder whose file count decides between folder and index playback.
    /// `None` always plays from the mp3 folder.
    pub folder_probe: Option<u8>,
    pub settle_ms: u32,
    pub link_attempts: u32,
    pub link_backoff_ms: u32,
    pub device_settle_ms: u32,
    pub storage_timeout_ms: u64,
    pub storage_poll_ms: u32,
    pub pre_play_ms: u32,
    pub verify_ms: u32,
    pub corrective_settle_ms: u32,
    pub report_interval_ms: u64,
    pub one_shot_after_ms: u64,
    pub tick_ms: u32,
}

impl PlaybackConfig {
    pub fn with_folder_probe(mut self, folder: u8) -> Self {
        self.folder_probe = Some(folder);
        self
    }

    /// Volume limited to what the module accepts
    pub fn clamped_volume(&self) -> u8 {
        self.volume.min(DFPLAYER_MAX_VOLUME)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: DFPLAYER_DEFAULT_VOLUME,
            track: DFPLAYER_TARGET_TRACK,
            device: DFPLAYER_DEVICE,
            equalizer: DFPLAYER_EQ,
            // Folder lookup is opt-in; see `with_folder_probe`
            folder_probe: None,
            settle_ms: POWER_UP_SETTLE_MS,
            link_attempts: LINK_ATTEMPTS,
            link_backoff_ms: LINK_RETRY_BACKOFF_MS,
            device_settle_ms: DEVICE_SELECT_SETTLE_MS,
            storage_timeout_ms: STORAGE_READY_TIMEOUT_MS,
            storage_poll_ms: STORAGE_READY_POLL_MS,
            pre_play_ms: PRE_PLAY_DELAY_MS,
            verify_ms: PLAY_VERIFY_DELAY_MS,
            corrective_settle_ms: CORRECTIVE_SETTLE_MS,
            report_interval_ms: STATUS_REPORT_INTERVAL_MS,
            one_shot_after_ms: ONE_SHOT_RETRY_AFTER_MS,
            tick_ms: SUPERVISE_TICK_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_is_clamped_to_module_range() {
        let config = PlaybackConfig {
            volume: 42,
            ..PlaybackConfig::default()
        };
        assert_eq!(config.clamped_volume(), 30);
        assert_eq!(PlaybackConfig::default().clamped_volume(), 20);
    }

    #[test]
    fn defaults_play_track_one_from_sd() {
        let config = PlaybackConfig::default();
        assert_eq!(config.track, 1);
        assert_eq!(config.device, StorageDevice::Sd);
        assert_eq!(config.folder_probe, None);
        assert_eq!(config.with_folder_probe(1).folder_probe, Some(1));
    }
}
