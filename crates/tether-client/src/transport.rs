//! Transport seam and the WebSocket connector.
//!
//! The runtime only sees a [`Transport`]: a sink of outbound text frames and
//! a stream of inbound items. [`WsConnector`] provides one over
//! `tokio-tungstenite`; tests plug in in-memory connectors.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tether_core::{FatalKind, TetherError};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, instrument};

use crate::config::Endpoint;

/// Header carrying the client's protocol version.
pub const PROTOCOL_VERSION_HEADER: &str = "x-tether-protocol-version";

/// One item read from the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame.
    Frame(String),
    /// Ping/pong or other liveness traffic.
    Keepalive,
}

/// Outbound half.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TetherError> + Send>>;
/// Inbound half. The stream ending means the peer closed.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Inbound, TetherError>> + Send>>;

/// An open, bidirectional transport.
pub struct Transport {
    /// Outbound half.
    pub sink: FrameSink,
    /// Inbound half.
    pub stream: FrameStream,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Handshake parameters beyond the endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol version to announce.
    pub protocol_version: String,
    /// Give up on the handshake after this long.
    pub timeout: Duration,
}

/// Opens transports.
///
/// Errors must be classified: [`TetherError::Fatal`] stops reconnection,
/// anything else is retried.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint, handshake: &Handshake) -> Result<Transport, TetherError>;
}

/// WebSocket connector.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    #[instrument(skip_all, fields(url = %endpoint.url))]
    async fn connect(&self, endpoint: &Endpoint, handshake: &Handshake) -> Result<Transport, TetherError> {
        let request = build_request(endpoint, handshake)?;

        let (ws, response) = tokio::time::timeout(
            handshake.timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| TetherError::transport(format!("handshake timed out after {:?}", handshake.timeout)))?
        .map_err(classify_ws_error)?;
        debug!(status = %response.status(), "websocket handshake complete");

        let (ws_tx, ws_rx) = ws.split();

        let sink = ws_tx
            .with(|text: String| future::ready(Ok::<_, tungstenite::Error>(Message::text(text))))
            .sink_map_err(|e| TetherError::transport(e.to_string()));

        let stream = ws_rx.filter_map(|msg| future::ready(inbound(msg)));

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn build_request(
    endpoint: &Endpoint,
    handshake: &Handshake,
) -> Result<tungstenite::handshake::client::Request, TetherError> {
    let invalid = |e: &dyn std::fmt::Display| TetherError::fatal(FatalKind::InvalidEndpoint, e.to_string());

    let mut request = endpoint
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| invalid(&e))?;
    let headers = request.headers_mut();
    if let Some(token) = &endpoint.auth_token {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| invalid(&e))?;
        let _ = headers.insert("authorization", value);
    }
    let version = HeaderValue::from_str(&handshake.protocol_version).map_err(|e| invalid(&e))?;
    let _ = headers.insert(PROTOCOL_VERSION_HEADER, version);
    Ok(request)
}

/// Map a tungstenite message to a transport item. `None` skips it.
fn inbound(msg: Result<Message, tungstenite::Error>) -> Option<Result<Inbound, TetherError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(Inbound::Frame(text.as_str().to_owned()))),
        Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Some(Ok(Inbound::Frame(text))),
            Err(_) => {
                info!(len = data.len(), "dropping non-UTF8 binary frame");
                None
            }
        },
        Ok(Message::Ping(_) | Message::Pong(_)) => Some(Ok(Inbound::Keepalive)),
        Ok(Message::Close(frame)) => {
            let reason = frame.map_or_else(|| "no reason".to_string(), |f| f.reason.as_str().to_owned());
            Some(Err(TetherError::transport(format!("closed by peer: {reason}"))))
        }
        Ok(Message::Frame(_)) => None,
        Err(e) => Some(Err(classify_ws_error(e))),
    }
}

/// Classify a handshake or stream error.
pub fn classify_ws_error(error: tungstenite::Error) -> TetherError {
    match &error {
        tungstenite::Error::Http(response) => classify_status(response.status())
            .map_or_else(
                || TetherError::transport(format!("handshake rejected: {}", response.status())),
                |kind| TetherError::fatal(kind, format!("handshake rejected: {}", response.status())),
            ),
        tungstenite::Error::Url(e) => TetherError::fatal(FatalKind::InvalidEndpoint, e.to_string()),
        _ => TetherError::transport(error.to_string()),
    }
}

/// HTTP statuses that end reconnection.
pub fn classify_status(status: StatusCode) -> Option<FatalKind> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(FatalKind::AuthRejected),
        StatusCode::UPGRADE_REQUIRED => Some(FatalKind::VersionMismatch),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn handshake() -> Handshake {
        Handshake {
            protocol_version: "1".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn request_carries_auth_and_version() {
        let endpoint = Endpoint::new("ws://localhost:9/ws").with_auth_token("secret");
        let request = build_request(&endpoint, &handshake()).unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer secret");
        assert_eq!(request.headers()[PROTOCOL_VERSION_HEADER], "1");
    }

    #[test]
    fn bad_url_is_fatal() {
        let err = build_request(&Endpoint::new("not a url"), &handshake()).unwrap_err();
        assert_matches!(err, TetherError::Fatal { kind: FatalKind::InvalidEndpoint, .. });
    }

    #[test]
    fn bad_token_is_fatal() {
        let endpoint = Endpoint::new("ws://localhost:9/ws").with_auth_token("line\nbreak");
        let err = build_request(&endpoint, &handshake()).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn auth_statuses_are_fatal() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), Some(FatalKind::AuthRejected));
        assert_eq!(classify_status(StatusCode::FORBIDDEN), Some(FatalKind::AuthRejected));
        assert_eq!(classify_status(StatusCode::UPGRADE_REQUIRED), Some(FatalKind::VersionMismatch));
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), None);
    }

    #[test]
    fn text_and_binary_become_frames() {
        assert_eq!(
            inbound(Ok(Message::text("{}"))),
            Some(Ok(Inbound::Frame("{}".into())))
        );
        assert_eq!(
            inbound(Ok(Message::binary(b"{\"a\":1}".to_vec()))),
            Some(Ok(Inbound::Frame("{\"a\":1}".into())))
        );
        assert_eq!(inbound(Ok(Message::binary(vec![0xff, 0xfe]))), None);
    }

    #[test]
    fn ping_is_keepalive() {
        assert_eq!(
            inbound(Ok(Message::Ping(Vec::new().into()))),
            Some(Ok(Inbound::Keepalive))
        );
    }

    #[test]
    fn close_is_transport_loss() {
        assert_matches!(inbound(Ok(Message::Close(None))), Some(Err(TetherError::Transport(_))));
    }

    #[tokio::test]
    async fn refused_connection_is_retryable() {
        let err = WsConnector
            .connect(&Endpoint::new("ws://127.0.0.1:1/ws"), &handshake())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
