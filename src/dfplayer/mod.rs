//! DFPlayer Mini serial driver
//!
//! Implements [`PlayerDriver`] over any `embedded-io-async` byte stream. Replies
//! are matched by command byte; unsolicited notifications that arrive while a
//! reply is awaited are queued and handed out by `poll_event`.

pub mod frame;

use embassy_futures::select::{select, Either};
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Read, Write};
use heapless::Deque;

use crate::config::{
    EVENT_POLL_WINDOW_MS, EVENT_QUEUE_DEPTH, HANDSHAKE_TIMEOUT_MS, REPLY_TIMEOUT_MS,
};
use crate::player::{
    DeviceError, Equalizer, Error, Event, PlayState, PlayerDriver, StorageDevice,
};
use frame::{Frame, FrameError, FrameParser};

/// Command and notification bytes
pub mod cmd {
    pub const PLAY_INDEX: u8 = 0x03;
    pub const VOLUME: u8 = 0x06;
    pub const EQ: u8 = 0x07;
    pub const OUTPUT_DEVICE: u8 = 0x09;
    pub const RESET: u8 = 0x0C;
    pub const PLAY_MP3_FOLDER: u8 = 0x12;

    pub const INSERTED: u8 = 0x3A;
    pub const REMOVED: u8 = 0x3B;
    pub const FINISHED_USB: u8 = 0x3C;
    pub const FINISHED_SD: u8 = 0x3D;
    pub const FINISHED_FLASH: u8 = 0x3E;
    pub const ONLINE: u8 = 0x3F;
    pub const ERROR: u8 = 0x40;
    pub const ACK: u8 = 0x41;

    pub const QUERY_STATE: u8 = 0x42;
    pub const QUERY_VOLUME: u8 = 0x43;
    pub const QUERY_FILES_USB: u8 = 0x47;
    pub const QUERY_FILES_SD: u8 = 0x48;
    pub const QUERY_FILES_FLASH: u8 = 0x49;
    pub const QUERY_CURRENT_USB: u8 = 0x4B;
    pub const QUERY_CURRENT_SD: u8 = 0x4C;
    pub const QUERY_CURRENT_FLASH: u8 = 0x4D;
    pub const QUERY_FOLDER_FILES: u8 = 0x4E;
}

const USB_BIT: u16 = 0x01;
const CARD_BIT: u16 = 0x02;

/// Classify a frame the module sent on its own
pub fn event_from_frame(frame: &Frame) -> Option<Event> {
    let p = frame.param;
    match frame.command {
        cmd::INSERTED if p & USB_BIT != 0 => Some(Event::UsbInserted),
        cmd::INSERTED if p & CARD_BIT != 0 => Some(Event::CardInserted),
        cmd::REMOVED if p & USB_BIT != 0 => Some(Event::UsbRemoved),
        cmd::REMOVED if p & CARD_BIT != 0 => Some(Event::CardRemoved),
        cmd::ONLINE if p & CARD_BIT != 0 => Some(Event::CardOnline),
        cmd::ONLINE if p & USB_BIT != 0 => Some(Event::UsbOnline),
        cmd::FINISHED_USB | cmd::FINISHED_SD | cmd::FINISHED_FLASH => {
            Some(Event::PlayFinished { track: p })
        }
        cmd::ERROR => Some(Event::Error(DeviceError::from_code(p))),
        _ => None,
    }
}

type Inbox = Deque<Result<Frame, FrameError>, EVENT_QUEUE_DEPTH>;

pub struct DfPlayer<U, D> {
    uart: U,
    delay: D,
    parser: FrameParser,
    inbox: Inbox,
    events: Deque<Event, EVENT_QUEUE_DEPTH>,
    device: StorageDevice,
}

impl<U, D> DfPlayer<U, D>
where
    U: Read + Write,
    D: DelayNs,
{
    pub fn new(uart: U, delay: D) -> Self {
        Self {
            uart,
            delay,
            parser: FrameParser::new(),
            inbox: Deque::new(),
            events: Deque::new(),
            device: StorageDevice::Sd,
        }
    }

    pub fn into_inner(self) -> U {
        self.uart
    }

    async fn send(&mut self, command: u8, param: u16) -> Result<(), Error> {
        let bytes = Frame::new(command, param).encode();
        self.uart.write_all(&bytes).await.map_err(|_| Error::Serial)?;
        self.uart.flush().await.map_err(|_| Error::Serial)
    }

    /// Next parsed frame, waiting at most `timeout_ms` for one to arrive
    async fn receive(&mut self, timeout_ms: u32) -> Result<Result<Frame, FrameError>, Error> {
        if let Some(frame) = self.inbox.pop_front() {
            return Ok(frame);
        }

        let read = fill_inbox(&mut self.uart, &mut self.parser, &mut self.inbox);
        let outcome = select(read, self.delay.delay_ms(timeout_ms)).await;
        match outcome {
            Either::First(res) => {
                res?;
                self.inbox.pop_front().ok_or(Error::Timeout)
            }
            Either::Second(()) => Err(Error::Timeout),
        }
    }

    fn stash(&mut self, received: Result<Frame, FrameError>) {
        let event = match received {
            Ok(frame) => event_from_frame(&frame),
            Err(e) => {
                debug!("DFPlayer: dropped frame {:?}", e);
                Some(Event::CorruptFrame)
            }
        };
        if let Some(event) = event {
            if self.events.is_full() {
                self.events.pop_front();
            }
            let _ = self.events.push_back(event);
        }
    }

    async fn query(&mut self, command: u8, param: u16) -> Result<u16, Error> {
        self.send(command, param).await?;
        loop {
            match self.receive(REPLY_TIMEOUT_MS).await? {
                Ok(frame) if frame.command == command => return Ok(frame.param),
                Ok(frame) if frame.command == cmd::ERROR => {
                    return Err(Error::Device(DeviceError::from_code(frame.param)))
                }
                Ok(frame) if frame.command == cmd::ACK => {}
                other => self.stash(other),
            }
        }
    }

    /// Drain frames buffered before the handshake. A power-on online frame
    /// is dropped; anything else is queued as a notification.
    async fn discard_stale(&mut self) {
        loop {
            match self.receive(EVENT_POLL_WINDOW_MS).await {
                Ok(Ok(frame)) if frame.command == cmd::ONLINE => {
                    debug!("DFPlayer: dropped stale online frame");
                }
                Ok(received) => self.stash(received),
                Err(_) => return,
            }
        }
    }
}

async fn fill_inbox<U: Read>(
    uart: &mut U,
    parser: &mut FrameParser,
    inbox: &mut Inbox,
) -> Result<(), Error> {
    let mut chunk = [0u8; frame::FRAME_LEN];
    while inbox.is_empty() {
        let n = uart.read(&mut chunk).await.map_err(|_| Error::Serial)?;
        if n == 0 {
            return Err(Error::Serial);
        }
        for &byte in &chunk[..n] {
            if let Some(parsed) = parser.push(byte) {
                if inbox.is_full() {
                    inbox.pop_front();
                }
                let _ = inbox.push_back(parsed);
            }
        }
    }
    Ok(())
}

impl<U, D> PlayerDriver for DfPlayer<U, D>
where
    U: Read + Write,
    D: DelayNs,
{
    async fn begin(&mut self) -> Result<(), Error> {
        self.discard_stale().await;
        self.send(cmd::RESET, 0).await?;
        loop {
            match self.receive(HANDSHAKE_TIMEOUT_MS).await? {
                Ok(frame) if frame.command == cmd::ONLINE => return Ok(()),
                Ok(frame) if frame.command == cmd::ERROR => {
                    return Err(Error::Device(DeviceError::from_code(frame.param)))
                }
                Ok(frame) if frame.command == cmd::ACK => {}
                other => self.stash(other),
            }
        }
    }

    async fn select_device(&mut self, device: StorageDevice) -> Result<(), Error> {
        self.send(cmd::OUTPUT_DEVICE, device as u16).await?;
        self.device = device;
        Ok(())
    }

    async fn set_volume(&mut self, volume: u8) -> Result<(), Error> {
        let volume = volume.min(crate::config::DFPLAYER_MAX_VOLUME);
        self.send(cmd::VOLUME, volume as u16).await
    }

    async fn set_equalizer(&mut self, eq: Equalizer) -> Result<(), Error> {
        self.send(cmd::EQ, eq as u16).await
    }

    async fn reset(&mut self) -> Result<(), Error> {
        self.send(cmd::RESET, 0).await
    }

    async fn play(&mut self, track: u16) -> Result<(), Error> {
        self.send(cmd::PLAY_INDEX, track).await
    }

    async fn play_mp3_folder(&mut self, track: u16) -> Result<(), Error> {
        self.send(cmd::PLAY_MP3_FOLDER, track).await
    }

    async fn read_file_count(&mut self) -> Result<u16, Error> {
        let command = match self.device {
            StorageDevice::UDisk => cmd::QUERY_FILES_USB,
            StorageDevice::Flash => cmd::QUERY_FILES_FLASH,
            _ => cmd::QUERY_FILES_SD,
        };
        self.query(command, 0).await
    }

    async fn read_folder_file_count(&mut self, folder: u8) -> Result<u16, Error> {
        self.query(cmd::QUERY_FOLDER_FILES, folder as u16).await
    }

    async fn read_state(&mut self) -> Result<PlayState, Error> {
        self.query(cmd::QUERY_STATE, 0).await.map(PlayState::from_raw)
    }

    async fn read_volume(&mut self) -> Result<u8, Error> {
        self.query(cmd::QUERY_VOLUME, 0).await.map(|v| v as u8)
    }

    async fn read_current_track(&mut self) -> Result<u16, Error> {
        let command = match self.device {
            StorageDevice::UDisk => cmd::QUERY_CURRENT_USB,
            StorageDevice::Flash => cmd::QUERY_CURRENT_FLASH,
            _ => cmd::QUERY_CURRENT_SD,
        };
        self.query(command, 0).await
    }

    async fn poll_event(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            // Stray replies and ACKs are dropped; keep reading until the window closes
            match self.receive(EVENT_POLL_WINDOW_MS).await {
                Ok(received) => self.stash(received),
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::testing::{FakeClock, FakeDelay};
    use crate::wait::Clock;
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use std::collections::VecDeque;

    /// Replays scripted bytes, then pends forever. Frames in `replies` are
    /// released one batch per write, after the driver has sent something.
    #[derive(Default)]
    struct ScriptedUart {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
        replies: VecDeque<Vec<Frame>>,
    }

    impl ScriptedUart {
        fn with_frames(frames: &[Frame]) -> Self {
            let mut uart = Self::default();
            for f in frames {
                uart.rx.extend(f.encode());
            }
            uart
        }

        fn replying(mut self, batch: &[Frame]) -> Self {
            self.replies.push_back(batch.to_vec());
            self
        }

        fn sent(&self) -> Vec<Frame> {
            let mut parser = FrameParser::new();
            self.tx
                .iter()
                .filter_map(|&b| parser.push(b))
                .map(|r| r.expect("driver sent a malformed frame"))
                .collect()
        }
    }

    impl embedded_io_async::ErrorType for ScriptedUart {
        type Error = Infallible;
    }

    impl Read for ScriptedUart {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
            if self.rx.is_empty() {
                core::future::pending::<()>().await;
            }
            let n = buf.len().min(self.rx.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.rx.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for ScriptedUart {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            self.tx.extend_from_slice(buf);
            if let Some(batch) = self.replies.pop_front() {
                for f in batch {
                    self.rx.extend(f.encode());
                }
            }
            Ok(buf.len())
        }
    }

    type TestPlayer = DfPlayer<ScriptedUart, FakeDelay>;

    fn player(frames: &[Frame]) -> (TestPlayer, FakeClock) {
        with_uart(ScriptedUart::with_frames(frames))
    }

    fn with_uart(uart: ScriptedUart) -> (TestPlayer, FakeClock) {
        let clock = FakeClock::default();
        (DfPlayer::new(uart, clock.delay()), clock)
    }

    #[test]
    fn begin_succeeds_on_card_online() {
        let uart = ScriptedUart::default().replying(&[Frame::new(cmd::ONLINE, 0x02)]);
        let (mut df, _) = with_uart(uart);
        assert_eq!(block_on(df.begin()), Ok(()));
        assert_eq!(df.into_inner().sent(), vec![Frame::new(cmd::RESET, 0)]);
    }

    #[test]
    fn begin_times_out_when_module_is_silent() {
        let (mut df, clock) = player(&[]);
        assert_eq!(block_on(df.begin()), Err(Error::Timeout));
        assert_eq!(
            clock.now_ms(),
            (EVENT_POLL_WINDOW_MS + HANDSHAKE_TIMEOUT_MS) as u64
        );
    }

    #[test]
    fn begin_ignores_online_frame_sent_before_reset() {
        let (mut df, _) = player(&[Frame::new(cmd::ONLINE, 0x02), Frame::new(cmd::INSERTED, 0x02)]);
        assert_eq!(block_on(df.begin()), Err(Error::Timeout));
        // Other early notifications are still reported
        assert_eq!(block_on(df.poll_event()), Some(Event::CardInserted));
        assert_eq!(block_on(df.poll_event()), None);
    }

    #[test]
    fn begin_fails_on_error_frame() {
        let uart = ScriptedUart::default().replying(&[Frame::new(cmd::ERROR, 1)]);
        let (mut df, _) = with_uart(uart);
        assert_eq!(block_on(df.begin()), Err(Error::Device(DeviceError::Busy)));
    }

    #[test]
    fn full_notification_queue_drops_oldest() {
        let mut frames: Vec<Frame> = (0..10).map(|t| Frame::new(cmd::FINISHED_SD, t)).collect();
        frames.push(Frame::new(cmd::QUERY_STATE, 1));
        let (mut df, _) = player(&frames);

        assert_eq!(block_on(df.read_state()), Ok(PlayState::Playing));
        let tracks: Vec<u16> = core::iter::from_fn(|| block_on(df.poll_event()))
            .map(|e| match e {
                Event::PlayFinished { track } => track,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        let dropped = 10 - EVENT_QUEUE_DEPTH as u16;
        assert_eq!(tracks, (dropped..10).collect::<Vec<_>>());
    }

    #[test]
    fn query_reply_is_matched_and_notifications_queued() {
        let (mut df, _) = player(&[
            Frame::new(cmd::ACK, 0),
            Frame::new(cmd::FINISHED_SD, 3),
            Frame::new(cmd::QUERY_FILES_SD, 12),
        ]);

        assert_eq!(block_on(df.read_file_count()), Ok(12));
        assert_eq!(block_on(df.poll_event()), Some(Event::PlayFinished { track: 3 }));
        assert_eq!(block_on(df.poll_event()), None);
    }

    #[test]
    fn query_reports_device_error() {
        let (mut df, _) = player(&[Frame::new(cmd::ERROR, 5)]);
        assert_eq!(
            block_on(df.read_state()),
            Err(Error::Device(DeviceError::FileIndexOut))
        );
    }

    #[test]
    fn play_state_query_decodes_reply() {
        let (mut df, _) = player(&[Frame::new(cmd::QUERY_STATE, 0x0201)]);
        assert_eq!(block_on(df.read_state()), Ok(PlayState::Playing));
    }

    #[test]
    fn queries_follow_selected_device() {
        let (mut df, _) = player(&[
            Frame::new(cmd::QUERY_FILES_USB, 4),
            Frame::new(cmd::QUERY_CURRENT_USB, 2),
        ]);
        block_on(df.select_device(StorageDevice::UDisk)).unwrap();
        assert_eq!(block_on(df.read_file_count()), Ok(4));
        assert_eq!(block_on(df.read_current_track()), Ok(2));
        assert_eq!(
            df.into_inner().sent(),
            vec![
                Frame::new(cmd::OUTPUT_DEVICE, 1),
                Frame::new(cmd::QUERY_FILES_USB, 0),
                Frame::new(cmd::QUERY_CURRENT_USB, 0),
            ]
        );
    }

    #[test]
    fn commands_are_encoded_with_parameters() {
        let (mut df, _) = player(&[Frame::new(cmd::QUERY_FOLDER_FILES, 0)]);
        block_on(df.reset()).unwrap();
        block_on(df.set_volume(99)).unwrap();
        block_on(df.set_equalizer(Equalizer::Rock)).unwrap();
        block_on(df.play_mp3_folder(1)).unwrap();
        block_on(df.play(7)).unwrap();
        assert_eq!(block_on(df.read_folder_file_count(3)), Ok(0));
        assert_eq!(
            df.into_inner().sent(),
            vec![
                Frame::new(cmd::RESET, 0),
                Frame::new(cmd::VOLUME, 30),
                Frame::new(cmd::EQ, 2),
                Frame::new(cmd::PLAY_MP3_FOLDER, 1),
                Frame::new(cmd::PLAY_INDEX, 7),
                Frame::new(cmd::QUERY_FOLDER_FILES, 3),
            ]
        );
    }

    #[test]
    fn corrupt_frame_surfaces_as_event() {
        let mut bytes = Frame::new(cmd::REMOVED, CARD_BIT).encode().to_vec();
        bytes[8] ^= 0xFF;
        let clock = FakeClock::default();
        let mut uart = ScriptedUart::default();
        uart.rx.extend(bytes);
        uart.rx.extend(Frame::new(cmd::INSERTED, CARD_BIT).encode());
        let mut df = DfPlayer::new(uart, clock.delay());

        assert_eq!(block_on(df.poll_event()), Some(Event::CorruptFrame));
        assert_eq!(block_on(df.poll_event()), Some(Event::CardInserted));
        assert_eq!(block_on(df.poll_event()), None);
    }

    #[test]
    fn notification_bits_are_classified() {
        let classify = |command, param| event_from_frame(&Frame::new(command, param));
        assert_eq!(classify(cmd::INSERTED, 1), Some(Event::UsbInserted));
        assert_eq!(classify(cmd::REMOVED, 2), Some(Event::CardRemoved));
        assert_eq!(classify(cmd::ONLINE, 3), Some(Event::CardOnline));
        assert_eq!(
            event_from_frame(&Frame::new(cmd::ERROR, 2)),
            Some(Event::Error(DeviceError::Sleeping))
        );
        assert_eq!(event_from_frame(&Frame::new(cmd::QUERY_STATE, 1)), None);
    }
}
