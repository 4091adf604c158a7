//! Length-prefixed framing for the native messaging channel.
//! Each frame is a 4-byte little-endian payload length followed by that many
//! bytes of UTF-8 JSON. Both directions of the channel use the same pair.

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Encode one payload as a length-prefixed frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Incremental decoder over an arbitrarily chunked byte stream. Partial
/// frames are buffered indefinitely; no maximum frame size is enforced here
/// because payload size is bounded upstream by the text length cap.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every complete payload it unlocked. A chunk
    /// may end anywhere, including inside the header, and may carry several
    /// frames at once.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }
            let declared =
                u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
            if self.buf.len() < HEADER_LEN + declared {
                break;
            }
            payloads.push(self.buf[HEADER_LEN..HEADER_LEN + declared].to_vec());
            self.buf.drain(..HEADER_LEN + declared);
        }
        payloads
    }

    /// Bytes buffered while waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
