//! Client side of the wire protocol, as used by a judge harness.

use crate::error::JudgeError;
use crate::message::{Map, Value};
use crate::protocol::{FrameCodec, Request, Response, DEFAULT_MAX_FRAME_SIZE};
use crate::session::QuestionId;

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

/// One connection to an evaluation server. Requests are strictly
/// request/response: each call waits for its reply before returning.
#[derive(Debug)]
pub struct JudgeClient {
  framed: Framed<TcpStream, FrameCodec>,
  peer: SocketAddr,
}

impl JudgeClient {
  pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, JudgeError> {
    Self::connect_with_limit(addr, DEFAULT_MAX_FRAME_SIZE).await
  }

  pub async fn connect_with_limit<A: ToSocketAddrs>(addr: A, max_frame_size: usize) -> Result<Self, JudgeError> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    tracing::debug!(%peer, "Connected to evaluation server");
    Ok(Self {
      framed: Framed::new(stream, FrameCodec::new(max_frame_size)),
      peer,
    })
  }

  pub fn peer_addr(&self) -> SocketAddr {
    self.peer
  }

  /// Sends a `start` request carrying `fields` and returns the reply.
  pub async fn start(&mut self, question_id: impl Into<QuestionId>, fields: Map) -> Result<Response, JudgeError> {
    self
      .request(Request::Start {
        question_id: question_id.into(),
        fields,
      })
      .await
  }

  /// Sends a `continue` request with the answer to the last action.
  pub async fn resume(
    &mut self,
    question_id: impl Into<QuestionId>,
    response: impl Into<Value>,
  ) -> Result<Response, JudgeError> {
    self
      .request(Request::Continue {
        question_id: question_id.into(),
        response: response.into(),
      })
      .await
  }

  pub async fn request(&mut self, request: Request) -> Result<Response, JudgeError> {
    self.send_raw(request.into_value()).await?;
    Response::from_value(self.recv().await?)
  }

  /// Sends an arbitrary value as one frame, bypassing request validation.
  pub async fn send_raw(&mut self, value: Value) -> Result<(), JudgeError> {
    self.framed.send(value).await
  }

  /// Reads the next frame. A closed connection is [`JudgeError::ConnectionClosed`].
  pub async fn recv(&mut self) -> Result<Value, JudgeError> {
    match self.framed.next().await {
      Some(frame) => frame,
      None => Err(JudgeError::ConnectionClosed),
    }
  }

  pub async fn close(self) -> Result<(), JudgeError> {
    let mut framed = self.framed;
    SinkExt::<Value>::close(&mut framed).await
  }
}
