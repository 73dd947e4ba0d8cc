//! Common types shared by the controller and the firmware binary

use crate::player::{Error, PlayState};

/// Whether the playback module answered the bring-up handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    NotStarted,
    Ready,
    /// All handshake attempts failed; terminal for this boot
    Failed,
}

/// Play command chosen at bring-up and reused for corrective resends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlayRequest {
    /// `/mp3/NNNN.mp3`
    Mp3Folder(u16),
    /// Absolute file index on the medium
    Index(u16),
}

/// Snapshot returned by a periodic status query
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusReport {
    pub state: Result<PlayState, Error>,
    pub volume: Result<u8, Error>,
    pub files: Result<u16, Error>,
    pub current: Result<u16, Error>,
}

/// Application version, taken from the package manifest
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
