use anyhow::Result;
use futures::{SinkExt, Stream, StreamExt};
use guardian_proto::encode_frame;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use super::handler::MessageRouter;
use super::session::Session;
use crate::registry::ConnectionHandle;

/// WebSocket listener for validator connections
pub struct Gateway {
    listener: TcpListener,
    router: Arc<MessageRouter>,
}

impl Gateway {
    pub async fn bind(addr: SocketAddr, router: Arc<MessageRouter>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, router })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<()> {
        info!("Gateway listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        serve_connection(stream, addr, router).await;
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            }
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

async fn serve_connection(stream: TcpStream, addr: SocketAddr, router: Arc<MessageRouter>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%addr, "WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut sink, mut frames) = ws.split();
    let (handle, mut rx) = ConnectionHandle::channel(addr);
    let mut session = Session::new(handle);
    debug!(conn = %session.id(), %addr, "Connection opened");

    // Single writer per socket; everything outbound goes through the channel
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match encode_frame(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode outbound frame: {}", e);
                    continue;
                }
            };

            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("Write failed, closing writer: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    drive(&mut frames, writer, &mut session, &router).await;
}

/// Route inbound frames until either half of the socket is gone, then
/// drop the connection from the registry.
async fn drive<S>(frames: &mut S, mut writer: JoinHandle<()>, session: &mut Session, router: &MessageRouter)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let conn = session.id();

    tokio::select! {
        () = read_frames(frames, session, router) => {}
        _ = &mut writer => debug!(%conn, "Writer stopped, ending session"),
    }

    router.on_disconnect(session).await;
    writer.abort();
}

async fn read_frames<S>(frames: &mut S, session: &mut Session, router: &MessageRouter)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                router.handle_text(session, &text).await;
            }
            Ok(Message::Binary(bytes)) => {
                router.handle_binary(session, &bytes).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(conn = %session.id(), "Read failed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::handler::tests::{fixture, register, session};
    use crate::gateway::FrameOutcome;
    use guardian_proto::crypto::generate_keypair;
    use std::time::Duration;

    type Frames = Result<Message, tungstenite::Error>;

    #[tokio::test]
    async fn test_dead_writer_ends_session() {
        let f = fixture();
        let (mut s, _rx) = session();
        assert!(matches!(register(&f, &mut s, &generate_keypair()).await, FrameOutcome::Registered { .. }));

        // Peer still "sending" but the write half already failed
        let mut frames = futures::stream::pending::<Frames>();
        let writer = tokio::spawn(async {});

        tokio::time::timeout(Duration::from_secs(5), drive(&mut frames, writer, &mut s, &f.router))
            .await
            .expect("session should end with its writer");
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_closed_read_half_ends_session() {
        let f = fixture();
        let (mut s, _rx) = session();
        register(&f, &mut s, &generate_keypair()).await;

        let mut frames = futures::stream::iter(vec![Ok::<_, tungstenite::Error>(Message::Close(None))]);
        let writer = tokio::spawn(std::future::pending::<()>());

        tokio::time::timeout(Duration::from_secs(5), drive(&mut frames, writer, &mut s, &f.router))
            .await
            .expect("session should end on close");
        assert!(f.registry.is_empty().await);
    }
}
