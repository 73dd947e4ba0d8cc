//! Tunebox - DFPlayer Mini playback firmware for RP2040
//!
//! Brings up a DFPlayer Mini MP3 module over UART, starts a fixed track and
//! supervises playback, using the Embassy async framework on target.
//!
//! ## Architecture
//! - **Controller**: `supervisor::PlaybackController` runs bring-up, then a flat polling loop
//! - **Driver seam**: `player::PlayerDriver`, implemented by `dfplayer::DfPlayer`
//! - **Single task**: one owner for all state, no channels or locks
//! - **Host testable**: everything except `hardware` builds without the `rp2040` feature

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module
mod fmt;

pub mod config;
pub mod dfplayer;
pub mod player;
pub mod supervisor;
pub mod types;
pub mod wait;

#[cfg(feature = "rp2040")]
pub mod hardware;

#[cfg(feature = "rp2040")]
use embassy_rp::{bind_interrupts, peripherals};

// DFPlayer UART interrupt binding
#[cfg(feature = "rp2040")]
bind_interrupts!(pub struct Irqs {
    UART0_IRQ => embassy_rp::uart::BufferedInterruptHandler<peripherals::UART0>;
});
