//! Wire frame codec
//!
//! Every message to and from the controller is one fixed 8-byte unit:
//!
//! ```text
//! ┌──────────┬──────────┬────────────────────┬──────────┬─────────────┐
//! │ Length   │ Control  │ Payload            │ Checksum │ Zero pad    │
//! │ (1B)     │ (1B)     │ (Length - 2 bytes) │ (1B)     │ to 8 bytes  │
//! └──────────┴──────────┴────────────────────┴──────────┴─────────────┘
//! ```
//!
//! `Length` counts the header and payload, not the checksum.

use recon_core::{ReconError, Result};

/// Size of one transport unit in bytes
pub const FRAME_SIZE: usize = 8;

/// Length byte + control byte
pub const HEADER_SIZE: usize = 2;

/// Largest payload that still leaves room for the checksum
pub const MAX_PAYLOAD: usize = FRAME_SIZE - HEADER_SIZE - 1;

/// Constant folded into every checksum
const CHECKSUM_OFFSET: u8 = 0x01;

/// A single protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header plus payload length, as carried on the wire
    pub length: u8,
    /// Command/response identifier
    pub control: u8,
    /// Raw payload bytes
    pub payload: Vec<u8>,
    /// Checksum byte as received (recomputed on encode)
    pub checksum: u8,
}

impl Frame {
    /// Create an outbound frame
    pub fn new(control: u8, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        let mut frame = Self {
            length: (payload.len() + HEADER_SIZE) as u8,
            control,
            payload,
            checksum: 0,
        };
        frame.checksum = frame.compute_checksum();
        frame
    }

    /// Create an outbound frame with no payload
    pub fn request(control: u8) -> Self {
        Self::new(control, Vec::new())
    }

    /// Checksum derived from length, control byte and payload
    pub fn compute_checksum(&self) -> u8 {
        let sum = self
            .payload
            .iter()
            .fold(
                self.length
                    .wrapping_add(CHECKSUM_OFFSET)
                    .wrapping_add(self.control),
                |acc, b| acc.wrapping_add(*b),
            );
        ((sum ^ 0xFF).wrapping_add(1)).wrapping_add(1)
    }

    /// Decode one transport unit.
    ///
    /// The checksum is carried through but not verified; see
    /// [`Frame::verify_checksum`].
    pub fn decode(buf: &[u8; FRAME_SIZE]) -> Result<Self> {
        let length = buf[0];
        let len = length as usize;
        if len < HEADER_SIZE || len > FRAME_SIZE - 1 {
            return Err(ReconError::MalformedFrame(format!(
                "length byte {} outside {}..={}",
                length,
                HEADER_SIZE,
                FRAME_SIZE - 1
            )));
        }

        Ok(Self {
            length,
            control: buf[1],
            payload: buf[HEADER_SIZE..len].to_vec(),
            checksum: buf[len],
        })
    }

    /// Check the received checksum against the frame contents
    pub fn verify_checksum(&self) -> Result<()> {
        let expected = self.compute_checksum();
        if expected != self.checksum {
            return Err(ReconError::ChecksumMismatch {
                expected,
                actual: self.checksum,
            });
        }
        Ok(())
    }

    /// Encode into one zero-padded transport unit, recomputing length and
    /// checksum.
    pub fn encode(&mut self) -> Result<[u8; FRAME_SIZE]> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(ReconError::InvalidInput(format!(
                "Payload must be at most {} bytes, got {}",
                MAX_PAYLOAD,
                self.payload.len()
            )));
        }

        self.length = (self.payload.len() + HEADER_SIZE) as u8;
        self.checksum = self.compute_checksum();

        let mut buf = [0u8; FRAME_SIZE];
        buf[0] = self.length;
        buf[1] = self.control;
        let end = HEADER_SIZE + self.payload.len();
        buf[HEADER_SIZE..end].copy_from_slice(&self.payload);
        buf[end] = self.checksum;
        Ok(buf)
    }

    /// Channel index carried in the control byte's low nibble
    pub fn channel(&self) -> usize {
        (self.control & 0x0F) as usize
    }
}
