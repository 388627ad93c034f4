use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum JudgeError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error), // Allows easy conversion from std::io::Error

  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),

  // --- Connection/Binding Errors ---
  #[error("Address already in use: {0}")]
  AddrInUse(String),
  #[error("Address not available: {0}")]
  AddrNotAvailable(String),
  #[error("Connection refused by peer: {0}")]
  ConnectionRefused(String),
  #[error("Connection closed by peer or transport")]
  ConnectionClosed,
  #[error("Permission denied for endpoint: {0}")]
  PermissionDenied(String),
  #[error("Invalid endpoint format: {0}")]
  InvalidEndpoint(String),

  // --- Framing Errors ---
  #[error("Frame of {size} bytes exceeds the limit of {max} bytes")]
  FrameTooLarge { size: u128, max: usize },
  #[error("Invalid message payload: {0}")]
  InvalidMessage(String),

  // --- Protocol Errors ---
  #[error("Protocol violation: {0}")]
  ProtocolViolation(String),
  #[error("Unknown request type: {0}")]
  UnknownRequestType(String),

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl JudgeError {
  /// Maps common `std::io::Error` kinds raised while binding or connecting to `endpoint`.
  pub fn from_io_endpoint(e: io::Error, endpoint: &str) -> Self {
    match e.kind() {
      io::ErrorKind::AddrInUse => JudgeError::AddrInUse(endpoint.to_string()),
      io::ErrorKind::AddrNotAvailable => JudgeError::AddrNotAvailable(endpoint.to_string()),
      io::ErrorKind::ConnectionRefused => JudgeError::ConnectionRefused(endpoint.to_string()),
      io::ErrorKind::PermissionDenied => JudgeError::PermissionDenied(endpoint.to_string()),
      io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => JudgeError::ConnectionClosed,
      _ => JudgeError::Io(e), // Default fallback
    }
  }

  /// True for faults that must tear down the connection without a reply:
  /// the peer is speaking something other than this protocol.
  pub fn is_protocol_fault(&self) -> bool {
    matches!(
      self,
      JudgeError::ProtocolViolation(_)
        | JudgeError::UnknownRequestType(_)
        | JudgeError::InvalidMessage(_)
        | JudgeError::FrameTooLarge { .. }
    )
  }
}

impl From<bincode::Error> for JudgeError {
  fn from(e: bincode::Error) -> Self {
    JudgeError::InvalidMessage(e.to_string())
  }
}
