//! WebSocket play client.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::ClientError;
use crate::objects::{ClientMessage, ServerMessage};

/// A player's connection to `GET /api/v1/play/ws`.
///
/// Each connection is a fresh session on the server; reconnecting yields a
/// new session that may re-bind the same participant address.
pub struct PlayerConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PlayerConnection {
    /// Connect to the play endpoint under `base_url` (a `ws://` or `wss://`
    /// root URL).
    pub async fn connect(base_url: &Url) -> Result<Self, ClientError> {
        let url = base_url.join("/api/v1/play/ws")?;
        let (stream, _) = connect_async(url.as_str()).await?;
        Ok(Self { stream })
    }

    /// Send one client message as a text frame.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let json = serde_json::to_string(message)?;
        self.stream.send(Message::Text(json)).await?;
        Ok(())
    }

    /// Wait for the next server message.
    ///
    /// Returns `Ok(None)` once the server closes the connection.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                Message::Text(text) => return Ok(Some(serde_json::from_str(&text)?)),
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }

    /// Close the connection. The server treats this as a disconnect.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
