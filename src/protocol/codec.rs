use crate::error::JudgeError;
use crate::message::{Value, MAX_NESTING_DEPTH};
use bincode::Options;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Width of the big-endian length prefix in front of every payload.
pub const HEADER_SIZE: usize = 16;

/// Default upper bound on a single payload (64 MiB). Frames carry image blobs,
/// so this is generous, but a corrupt header must not trigger a huge allocation.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Codec for length-prefixed `Value` frames.
///
/// Wire layout: `[16-byte big-endian payload length][bincode(Value)]`.
#[derive(Debug)]
pub struct FrameCodec {
  decoding_state: DecodingState,
  max_frame_size: usize,
}

#[derive(Debug, Default, Clone, Copy)]
enum DecodingState {
  #[default]
  ReadHeader, // Waiting for the 16 length octets
  ReadBody(usize), // Waiting for this many payload bytes
}

impl Default for FrameCodec {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_FRAME_SIZE)
  }
}

impl FrameCodec {
  pub fn new(max_frame_size: usize) -> Self {
    Self {
      decoding_state: DecodingState::default(),
      max_frame_size,
    }
  }

  pub fn max_frame_size(&self) -> usize {
    self.max_frame_size
  }

  fn payload_options(&self) -> impl Options {
    bincode::DefaultOptions::new()
      .with_limit(self.max_frame_size as u64)
      .reject_trailing_bytes()
  }

  fn check_nesting(value: &Value) -> Result<(), JudgeError> {
    if value.nesting_exceeds(MAX_NESTING_DEPTH) {
      return Err(JudgeError::InvalidMessage(format!(
        "value nests deeper than {} levels",
        MAX_NESTING_DEPTH
      )));
    }
    Ok(())
  }

  /// Serializes a value into a standalone payload (no header).
  pub fn serialize_payload(&self, value: &Value) -> Result<Vec<u8>, JudgeError> {
    Self::check_nesting(value)?;
    Ok(self.payload_options().serialize(value)?)
  }

  /// Checks that `value` would encode into a frame this codec accepts,
  /// without building the payload.
  pub fn check_encodable(&self, value: &Value) -> Result<(), JudgeError> {
    Self::check_nesting(value)?;
    let size = bincode::DefaultOptions::new().serialized_size(value)?;
    if size > self.max_frame_size as u64 {
      return Err(JudgeError::FrameTooLarge {
        size: size as u128,
        max: self.max_frame_size,
      });
    }
    Ok(())
  }

  /// Deserializes a standalone payload (no header). Lists and maps nested
  /// deeper than `MAX_NESTING_DEPTH` are an `InvalidMessage`.
  pub fn deserialize_payload(&self, payload: &[u8]) -> Result<Value, JudgeError> {
    Ok(self.payload_options().deserialize(payload)?)
  }
}

// --- Encoder Implementation (Value -> BytesMut) ---
impl Encoder<Value> for FrameCodec {
  type Error = JudgeError;

  fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
    let payload = self.serialize_payload(&item)?;
    if payload.len() > self.max_frame_size {
      return Err(JudgeError::FrameTooLarge {
        size: payload.len() as u128,
        max: self.max_frame_size,
      });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u128(payload.len() as u128);
    dst.put_slice(&payload);
    Ok(())
  }
}

// --- Decoder Implementation (BytesMut -> Value) ---
impl Decoder for FrameCodec {
  type Item = Value;
  type Error = JudgeError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    loop {
      match self.decoding_state {
        DecodingState::ReadHeader => {
          if src.len() < HEADER_SIZE {
            src.reserve(HEADER_SIZE - src.len());
            return Ok(None); // Need more data for header
          }

          let size = src.get_u128();
          if size > self.max_frame_size as u128 {
            tracing::warn!(size = %size, max = self.max_frame_size, "Rejecting oversized frame");
            return Err(JudgeError::FrameTooLarge {
              size,
              max: self.max_frame_size,
            });
          }
          self.decoding_state = DecodingState::ReadBody(size as usize);
          // Continue loop to try decoding body immediately if possible
        }

        DecodingState::ReadBody(size) => {
          if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
          }

          let body = src.split_to(size);
          self.decoding_state = DecodingState::ReadHeader;
          let value = self.deserialize_payload(&body)?;
          tracing::trace!(payload_len = size, "Decoded frame");
          return Ok(Some(value));
        }
      }
    }
  }

  /// A peer that closes mid-header or mid-payload has simply finished;
  /// the partial frame is dropped and the stream ends cleanly.
  fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    match self.decode(buf)? {
      Some(frame) => Ok(Some(frame)),
      None => {
        if !buf.is_empty() || matches!(self.decoding_state, DecodingState::ReadBody(_)) {
          tracing::debug!(
            buffered = buf.len(),
            state = ?self.decoding_state,
            "Stream closed inside a frame; treating as end of stream"
          );
          buf.clear();
          self.decoding_state = DecodingState::ReadHeader;
        }
        Ok(None)
      }
    }
  }
}
