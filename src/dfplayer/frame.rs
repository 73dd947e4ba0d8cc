//! DFPlayer serial frame format
//!
//! `7E FF 06 CMD FB PH PL CH CL EF`: start, version, length, command,
//! feedback flag, 16-bit parameter, 16-bit checksum, end. The checksum is the
//! two's complement of the sum of the version..parameter bytes.

pub const FRAME_LEN: usize = 10;

const START: u8 = 0x7E;
const VERSION: u8 = 0xFF;
const LENGTH: u8 = 0x06;
const END: u8 = 0xEF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub command: u8,
    pub feedback: bool,
    pub param: u16,
}

impl Frame {
    pub const fn new(command: u8, param: u16) -> Self {
        Self {
            command,
            feedback: false,
            param,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let [param_hi, param_lo] = self.param.to_be_bytes();
        let mut bytes = [
            START,
            VERSION,
            LENGTH,
            self.command,
            self.feedback as u8,
            param_hi,
            param_lo,
            0,
            0,
            END,
        ];
        let [sum_hi, sum_lo] = checksum(&bytes[1..7]).to_be_bytes();
        bytes[7] = sum_hi;
        bytes[8] = sum_lo;
        bytes
    }
}

pub fn checksum(body: &[u8]) -> u16 {
    let sum = body
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
    0u16.wrapping_sub(sum)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    BadHeader,
    BadEnd,
    BadChecksum,
}

/// Incremental frame parser fed one byte at a time
#[derive(Debug)]
pub struct FrameParser {
    buf: [u8; FRAME_LEN],
    len: usize,
}

impl FrameParser {
    pub const fn new() -> Self {
        Self {
            buf: [0; FRAME_LEN],
            len: 0,
        }
    }

    /// Feed one byte; yields a result once a full frame has been collected
    pub fn push(&mut self, byte: u8) -> Option<Result<Frame, FrameError>> {
        // Hunt for the start marker between frames
        if self.len == 0 && byte != START {
            return None;
        }

        self.buf[self.len] = byte;
        self.len += 1;
        if self.len < FRAME_LEN {
            return None;
        }
        self.len = 0;
        Some(self.decode())
    }

    fn decode(&self) -> Result<Frame, FrameError> {
        let b = &self.buf;
        if b[1] != VERSION || b[2] != LENGTH {
            return Err(FrameError::BadHeader);
        }
        if b[9] != END {
            return Err(FrameError::BadEnd);
        }
        if u16::from_be_bytes([b[7], b[8]]) != checksum(&b[1..7]) {
            return Err(FrameError::BadChecksum);
        }
        Ok(Frame {
            command: b[3],
            feedback: b[4] != 0,
            param: u16::from_be_bytes([b[5], b[6]]),
        })
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_volume_command() {
        // Volume 20: checksum = -(FF + 06 + 06 + 00 + 00 + 14) = 0xFEE1
        let bytes = Frame::new(0x06, 20).encode();
        assert_eq!(
            bytes,
            [0x7E, 0xFF, 0x06, 0x06, 0x00, 0x00, 0x14, 0xFE, 0xE1, 0xEF]
        );
    }

    #[test]
    fn parses_card_online_after_noise() {
        let mut parser = FrameParser::new();
        let online = [0x7E, 0xFF, 0x06, 0x3F, 0x00, 0x00, 0x02, 0xFE, 0xBA, 0xEF];

        assert_eq!(parser.push(0x00), None);
        assert_eq!(parser.push(0x55), None);
        let mut out = None;
        for &b in &online {
            out = parser.push(b);
        }
        assert_eq!(
            out,
            Some(Ok(Frame {
                command: 0x3F,
                feedback: false,
                param: 2
            }))
        );
    }

    #[test]
    fn rejects_corrupted_frames() {
        let mut parser = FrameParser::new();
        let mut bytes = Frame::new(0x48, 7).encode();
        bytes[6] ^= 0x01;
        let results: Vec<_> = bytes.iter().filter_map(|&b| parser.push(b)).collect();
        assert_eq!(results, vec![Err(FrameError::BadChecksum)]);

        let mut bytes = Frame::new(0x48, 7).encode();
        bytes[9] = 0x00;
        let results: Vec<_> = bytes.iter().filter_map(|&b| parser.push(b)).collect();
        assert_eq!(results, vec![Err(FrameError::BadEnd)]);

        // Parser is back in sync for the next good frame
        let good = Frame::new(0x42, 1);
        let results: Vec<_> = good.encode().iter().filter_map(|&b| parser.push(b)).collect();
        assert_eq!(results, vec![Ok(good)]);
    }
}
