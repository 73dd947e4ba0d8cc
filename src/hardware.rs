//! Hardware abstraction and initialization
//!
//! Board-side pieces the firmware binary needs to hand the controller a
//! working serial link: UART settings, static UART buffers and the uptime clock.

use embassy_rp::uart;
use static_cell::StaticCell;

use crate::config::{DFPLAYER_BAUDRATE, UART_RX_BUF_SIZE, UART_TX_BUF_SIZE};
use crate::wait::Clock;

/// Hardware configuration of the board
///
/// The link pins are fixed by the UART0 peripheral singletons the binary
/// takes (`PIN_16`/`PIN_17`, see `DFPLAYER_TX_PIN`/`DFPLAYER_RX_PIN`).
pub struct HardwareConfig {
    pub baudrate: u32,
}

impl HardwareConfig {
    pub const fn pico() -> Self {
        Self {
            baudrate: DFPLAYER_BAUDRATE,
        }
    }

    /// UART settings for the DFPlayer link (8N1)
    pub fn uart_config(&self) -> uart::Config {
        let mut config = uart::Config::default();
        config.baudrate = self.baudrate;
        config
    }
}

static PLAYER_TX_BUF: StaticCell<[u8; UART_TX_BUF_SIZE]> = StaticCell::new();
static PLAYER_RX_BUF: StaticCell<[u8; UART_RX_BUF_SIZE]> = StaticCell::new();

/// Ring buffers backing the buffered DFPlayer UART. Call once.
pub fn player_buffers() -> (&'static mut [u8], &'static mut [u8]) {
    let tx = PLAYER_TX_BUF.init([0; UART_TX_BUF_SIZE]);
    let rx = PLAYER_RX_BUF.init([0; UART_RX_BUF_SIZE]);
    (&mut tx[..], &mut rx[..])
}

/// Milliseconds since boot from the embassy time driver
#[derive(Debug, Clone, Copy, Default)]
pub struct UptimeClock;

impl Clock for UptimeClock {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}
