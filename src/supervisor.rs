//! Playback bring-up and supervision
//!
//! [`PlaybackController`] owns every piece of process state: the link
//! state, the volume sent at bring-up and the one-shot retry flag. It brings
//! the module from power-on to confirmed playback and then watches it forever.

use embedded_hal_async::delay::DelayNs;

use crate::config::{self, PlaybackConfig};
use crate::player::{Event, PlayState, PlayerDriver};
use crate::types::{LinkState, PlayRequest, StatusReport, APP_VERSION};
use crate::wait::{Clock, Poller};

pub struct PlaybackController<P, D, C> {
    player: P,
    delay: D,
    clock: C,
    config: PlaybackConfig,
    link: LinkState,
    volume: u8,
    retry_done: bool,
    request: PlayRequest,
    last_report_ms: u64,
}

impl<P, D, C> PlaybackController<P, D, C>
where
    P: PlayerDriver,
    D: DelayNs,
    C: Clock,
{
    pub fn new(player: P, delay: D, clock: C, config: PlaybackConfig) -> Self {
        Self {
            player,
            delay,
            clock,
            volume: config.clamped_volume(),
            request: PlayRequest::Mp3Folder(config.track),
            config,
            link: LinkState::NotStarted,
            retry_done: false,
            last_report_ms: 0,
        }
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn retry_done(&self) -> bool {
        self.retry_done
    }

    pub fn play_request(&self) -> PlayRequest {
        self.request
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    /// Print application startup banner with wiring information
    pub fn print_startup_banner(&self) {
        info!("========================================");
        info!("Tunebox v{}", APP_VERSION);
        info!("DFPlayer Mini playback demo");
        info!("========================================");
        info!("Hardware: RP2040 (Raspberry Pi Pico)");
        info!(
            "DFPlayer UART: TX=GP{} RX=GP{} @ {} baud",
            config::DFPLAYER_TX_PIN,
            config::DFPLAYER_RX_PIN,
            config::DFPLAYER_BAUDRATE
        );
        info!(
            "Volume: {} Track: {}",
            self.config.clamped_volume(),
            self.config.track
        );
        info!("========================================");
    }

    /// Bring the module from power-on to playback of the target track
    pub async fn bring_up(&mut self) -> LinkState {
        // Module needs time to power up before it answers
        self.delay.delay_ms(self.config.settle_ms).await;

        if !self.establish_link().await {
            self.link = LinkState::Failed;
            error!("DFPlayer not responding. Check wiring and SD.");
            error!(
                "Wiring: DF TX->GP{}, DF RX<-GP{} (1k series resistor). 5V on VCC.",
                config::DFPLAYER_RX_PIN,
                config::DFPLAYER_TX_PIN
            );
            return self.link;
        }

        self.link = LinkState::Ready;
        info!("DFPlayer initialized.");

        if let Err(e) = self.player.select_device(self.config.device).await {
            warn!("Output device select failed: {:?}", e);
        }
        self.delay.delay_ms(self.config.device_settle_ms).await;

        if let Err(e) = self.player.set_volume(self.volume).await {
            warn!("Volume set failed: {:?}", e);
        }
        if let Err(e) = self.player.set_equalizer(self.config.equalizer).await {
            warn!("EQ set failed: {:?}", e);
        }

        // Play requests are ignored until storage enumeration completes
        match self.wait_for_storage().await {
            Some(files) => info!("SD ready: yes, files={}", files),
            None => warn!("SD ready: no, files=-1"),
        }

        self.request = self.choose_request().await;
        self.delay.delay_ms(self.config.pre_play_ms).await;
        info!("Attempting: {:?}", self.request);
        self.issue_play().await;
        self.delay.delay_ms(self.config.verify_ms).await;

        let state = self.player.read_state().await;
        let current = self.player.read_current_track().await;
        info!("Initial play state: {:?}, current={:?}", state, current);

        if !matches!(state, Ok(PlayState::Playing)) {
            warn!("Playback didn't start; reselecting SD and resending");
            self.corrective_resend().await;
        }

        self.link
    }

    async fn establish_link(&mut self) -> bool {
        let mut poller = Poller::attempts(self.config.link_attempts, self.config.link_backoff_ms);
        loop {
            match self.player.begin().await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        "DFPlayer begin failed (try {}): {:?}. Retrying...",
                        poller.failures() + 1,
                        e
                    );
                }
            }
            if !poller.retry(&mut self.delay, &self.clock).await {
                return false;
            }
        }
    }

    async fn wait_for_storage(&mut self) -> Option<u16> {
        let mut poller = Poller::timeout(
            self.config.storage_timeout_ms,
            self.config.storage_poll_ms,
            self.clock.now_ms(),
        );
        loop {
            if let Ok(files) = self.player.read_file_count().await {
                return Some(files);
            }
            if !poller.retry(&mut self.delay, &self.clock).await {
                return None;
            }
        }
    }

    async fn choose_request(&mut self) -> PlayRequest {
        let track = self.config.track;
        let Some(folder) = self.config.folder_probe else {
            return PlayRequest::Mp3Folder(track);
        };

        match self.player.read_folder_file_count(folder).await {
            Ok(0) => {
                info!("Folder {} is empty; using root index {}", folder, track);
                PlayRequest::Index(track)
            }
            Ok(_) => PlayRequest::Mp3Folder(track),
            Err(e) => {
                warn!("Folder {} lookup failed: {:?}", folder, e);
                PlayRequest::Mp3Folder(track)
            }
        }
    }

    async fn issue_play(&mut self) {
        let result = match self.request {
            PlayRequest::Mp3Folder(track) => self.player.play_mp3_folder(track).await,
            PlayRequest::Index(track) => self.player.play(track).await,
        };
        if let Err(e) = result {
            warn!("Play command failed: {:?}", e);
        }
    }

    /// Reselect storage and reissue the play request
    async fn corrective_resend(&mut self) {
        if let Err(e) = self.player.select_device(self.config.device).await {
            warn!("Output device select failed: {:?}", e);
        }
        self.delay.delay_ms(self.config.corrective_settle_ms).await;
        self.issue_play().await;
    }

    /// Run the supervision loop forever
    pub async fn supervise(&mut self) -> ! {
        info!("Playback supervisor started");
        loop {
            self.step().await;
        }
    }

    /// One supervision iteration followed by the tick pause
    pub async fn step(&mut self) {
        if self.link == LinkState::Ready {
            self.drain_events().await;
        }

        let now = self.clock.now_ms();
        if now.saturating_sub(self.last_report_ms) > self.config.report_interval_ms {
            self.last_report_ms = now;
            if let Some(status) = self.query_status().await {
                info!(
                    "Status: state={:?} volume={:?} files={:?} current={:?}",
                    status.state,
                    status.volume,
                    status.files,
                    status.current
                );
            }
        }

        if self.link == LinkState::Ready
            && !self.retry_done
            && self.clock.now_ms() >= self.config.one_shot_after_ms
        {
            self.one_shot_retry().await;
        }

        self.delay.delay_ms(self.config.tick_ms).await;
    }

    /// Query the module for a status snapshot; `None` unless the link is up
    pub async fn query_status(&mut self) -> Option<StatusReport> {
        if self.link != LinkState::Ready {
            return None;
        }
        Some(StatusReport {
            state: self.player.read_state().await,
            volume: self.player.read_volume().await,
            files: self.player.read_file_count().await,
            current: self.player.read_current_track().await,
        })
    }

    async fn drain_events(&mut self) {
        while let Some(event) = self.player.poll_event().await {
            report_event(&event);
        }
    }

    async fn one_shot_retry(&mut self) {
        let state = self.player.read_state().await;
        if !matches!(state, Ok(PlayState::Playing)) {
            warn!(
                "Not playing after {}ms; reselecting SD and retrying",
                self.config.one_shot_after_ms
            );
            self.corrective_resend().await;
        }
        self.retry_done = true;
    }
}

fn report_event(event: &Event) {
    match event {
        Event::PlayFinished { track } => info!("DFPlayer: Play Finished track {}", track),
        Event::Error(e) => warn!("DFPlayer: Error - {} ({:?})", e.describe(), e),
        other => info!("DFPlayer: {}", other.describe()),
    }
}
