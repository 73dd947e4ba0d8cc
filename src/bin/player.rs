//! Tunebox - DFPlayer Mini playback firmware
//!
//! Brings the module up on UART0 (GP16/GP17), plays /mp3/0001.mp3 and keeps
//! reporting status over defmt RTT.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::uart::BufferedUart;
use embassy_time::Delay;
use panic_halt as _;
use defmt_rtt as _; // global logger

use tunebox::config::PlaybackConfig;
use tunebox::dfplayer::DfPlayer;
use tunebox::hardware::{self, HardwareConfig, UptimeClock};
use tunebox::supervisor::PlaybackController;
use tunebox::types::LinkState;
use tunebox::Irqs;

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    let hw_config = HardwareConfig::pico();

    let (tx_buf, rx_buf) = hardware::player_buffers();
    let uart = BufferedUart::new(
        p.UART0,
        p.PIN_16, // DFPLAYER_TX_PIN
        p.PIN_17, // DFPLAYER_RX_PIN
        Irqs,
        tx_buf,
        rx_buf,
        hw_config.uart_config(),
    );

    let player = DfPlayer::new(uart, Delay);
    let mut controller =
        PlaybackController::new(player, Delay, UptimeClock, PlaybackConfig::default());
    controller.print_startup_banner();

    match controller.bring_up().await {
        LinkState::Ready => info!("Playback bring-up complete"),
        state => warn!("Continuing without playback (link {:?})", state),
    }

    // No buttons or serial control; just keep reporting
    controller.supervise().await
}
