use super::dispatcher::Dispatcher;
use crate::error::JudgeError;
use crate::message::Value;
use crate::protocol::{FrameCodec, Request, Response};

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

/// Serves one client until it disconnects or breaks the protocol.
///
/// Requests on a connection are handled strictly in order: the next frame is
/// not read until the reply to the current one has been written. A clean
/// disconnect (including one mid-frame) returns `Ok`. A malformed frame or
/// request closes the connection without a reply and returns the fault.
/// A reply too large or too deep to frame is replaced by an error reply; the
/// session it came from stays as the dispatcher left it.
pub async fn serve_connection<S>(
  stream: S,
  peer: SocketAddr,
  dispatcher: &Dispatcher,
  max_frame_size: usize,
) -> Result<(), JudgeError>
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  let mut framed = Framed::new(stream, FrameCodec::new(max_frame_size));
  let mut served: u64 = 0;

  while let Some(frame) = framed.next().await {
    let value = match frame {
      Ok(value) => value,
      Err(e) => {
        tracing::warn!(%peer, error = %e, "Dropping connection after unreadable frame");
        return Err(e);
      }
    };
    let request = match Request::from_value(value) {
      Ok(request) => request,
      Err(e) => {
        tracing::warn!(%peer, error = %e, "Dropping connection after malformed request");
        return Err(e);
      }
    };
    tracing::debug!(%peer, kind = request.type_name(), question_id = %request.question_id(), "Request received");

    let response = dispatcher.dispatch(request).await;
    let reply = deliverable(framed.codec(), response, peer);
    if let Err(e) = framed.send(reply).await {
      tracing::debug!(%peer, error = %e, "Peer went away before reply was written");
      return Err(e);
    }
    served += 1;
  }

  tracing::debug!(%peer, served, "Connection closed by peer");
  Ok(())
}

fn deliverable(codec: &FrameCodec, response: Response, peer: SocketAddr) -> Value {
  let reply = response.into_value();
  match codec.check_encodable(&reply) {
    Ok(()) => reply,
    Err(e) => {
      tracing::warn!(%peer, error = %e, "Reply cannot be framed; sending an error instead");
      Response::error(format!("Reply not sent: {}", e)).into_value()
    }
  }
}
