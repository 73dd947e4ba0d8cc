//! Playback module abstraction
//!
//! The bring-up controller only talks to the MP3 module through
//! [`PlayerDriver`], so the sequence does not depend on the wire protocol
//! or on the board it runs on.

/// Output device selectable on the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageDevice {
    UDisk = 1,
    Sd = 2,
    Aux = 3,
    Sleep = 4,
    Flash = 5,
}

/// Equalizer presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Equalizer {
    Normal = 0,
    Pop = 1,
    Rock = 2,
    Jazz = 3,
    Classic = 4,
    Bass = 5,
}

/// Play state as reported by the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
    Unknown(u16),
}

impl PlayState {
    /// Decode a state reply. The high byte carries the active device on
    /// some modules (0x0201 while playing from SD), so only the low byte counts.
    pub fn from_raw(raw: u16) -> Self {
        match raw & 0x00FF {
            0 => PlayState::Stopped,
            1 => PlayState::Playing,
            2 => PlayState::Paused,
            _ => PlayState::Unknown(raw),
        }
    }

    pub fn is_playing(self) -> bool {
        self == PlayState::Playing
    }
}

/// Error codes carried by the module's error notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError {
    Busy,
    Sleeping,
    SerialWrongStack,
    ChecksumMismatch,
    FileIndexOut,
    FileMismatch,
    Advertise,
    Unknown(u16),
}

impl DeviceError {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => DeviceError::Busy,
            2 => DeviceError::Sleeping,
            3 => DeviceError::SerialWrongStack,
            4 => DeviceError::ChecksumMismatch,
            5 => DeviceError::FileIndexOut,
            6 => DeviceError::FileMismatch,
            7 => DeviceError::Advertise,
            other => DeviceError::Unknown(other),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            // The module reports "busy" while it has no medium to read
            DeviceError::Busy => "Card not found",
            DeviceError::Sleeping => "Sleeping",
            DeviceError::SerialWrongStack => "Serial Wrong Stack",
            DeviceError::ChecksumMismatch => "Check Sum Not Match",
            DeviceError::FileIndexOut => "File Index Out",
            DeviceError::FileMismatch => "File Mismatch",
            DeviceError::Advertise => "In Advertise",
            DeviceError::Unknown(_) => "Unknown error code",
        }
    }
}

/// Asynchronous notification pushed by the module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    CardInserted,
    CardRemoved,
    CardOnline,
    UsbInserted,
    UsbRemoved,
    UsbOnline,
    PlayFinished { track: u16 },
    Error(DeviceError),
    /// A frame arrived but failed validation
    CorruptFrame,
}

impl Event {
    pub fn describe(&self) -> &'static str {
        match self {
            Event::CardInserted => "Card Inserted",
            Event::CardRemoved => "Card Removed",
            Event::CardOnline => "Card Online",
            Event::UsbInserted => "USB Inserted",
            Event::UsbRemoved => "USB Removed",
            Event::UsbOnline => "USB Online",
            Event::PlayFinished { .. } => "Play Finished",
            Event::Error(e) => e.describe(),
            Event::CorruptFrame => "Wrong Stack",
        }
    }
}

/// Driver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// UART read or write failed
    Serial,
    /// No matching reply within the reply timeout
    Timeout,
    /// The module answered with an error notification
    Device(DeviceError),
}

/// Request/response interface of the MP3 playback module
#[allow(async_fn_in_trait)]
pub trait PlayerDriver {
    /// Link handshake: reset the module and wait for it to come online
    async fn begin(&mut self) -> Result<(), Error>;

    async fn select_device(&mut self, device: StorageDevice) -> Result<(), Error>;

    async fn set_volume(&mut self, volume: u8) -> Result<(), Error>;

    async fn set_equalizer(&mut self, eq: Equalizer) -> Result<(), Error>;

    async fn reset(&mut self) -> Result<(), Error>;

    /// Play by absolute index on the selected device
    async fn play(&mut self, track: u16) -> Result<(), Error>;

    /// Play `/mp3/NNNN.mp3`
    async fn play_mp3_folder(&mut self, track: u16) -> Result<(), Error>;

    /// Total number of files on the selected device
    async fn read_file_count(&mut self) -> Result<u16, Error>;

    async fn read_folder_file_count(&mut self, folder: u8) -> Result<u16, Error>;

    async fn read_state(&mut self) -> Result<PlayState, Error>;

    async fn read_volume(&mut self) -> Result<u8, Error>;

    async fn read_current_track(&mut self) -> Result<u16, Error>;

    /// Next pending notification, if any arrived
    async fn poll_event(&mut self) -> Option<Event>;
}
