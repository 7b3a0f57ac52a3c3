// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Byte-stream plumbing for the proxy.
//!
//! Reader tasks decode each direction's byte stream through its own
//! [`FrameParser`] and feed events into the engine's single select loop;
//! writer tasks drain outbound byte channels. All mutation of engine state
//! stays on the loop.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::mcp::codec::FrameParser;
use crate::mcp::message::WireMessage;

/// Events produced by a stream reader.
#[derive(Debug)]
pub enum StreamEvent {
    Message(WireMessage),
    /// Recoverable frame error (overflow or malformed line); the stream
    /// continues.
    FrameError(String),
    /// EOF or unrecoverable read failure.
    Closed,
}

const READ_CHUNK: usize = 8 * 1024;

/// Spawn a task reading one direction of traffic into `tx`.
pub fn spawn_stream_reader<R>(mut stream: R, tx: mpsc::Sender<StreamEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut parser = FrameParser::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = parser.append(&buf[..n]) {
                        if tx.send(StreamEvent::FrameError(e.to_string())).await.is_err() {
                            return;
                        }
                        continue;
                    }
                    loop {
                        match parser.read_message() {
                            Ok(Some(msg)) => {
                                if tx.send(StreamEvent::Message(msg)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                if tx
                                    .send(StreamEvent::FrameError(e.to_string()))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("stream read error: {}", e);
                    break;
                }
            }
        }
        let _ = tx.send(StreamEvent::Closed).await;
    });
}

/// Spawn a task draining a byte channel into a writer. The writer is flushed
/// after every line; backpressure is the channel's bound.
pub fn spawn_stream_writer<W>(mut writer: W) -> mpsc::Sender<Vec<u8>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(512);
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = writer.write_all(&bytes).await {
                error!("write error: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("flush error: {}", e);
                break;
            }
        }
        debug!("writer task finished");
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_emits_messages_then_closed() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel(16);
        spawn_stream_reader(client, tx);

        server
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        drop(server);

        assert!(matches!(
            rx.recv().await,
            Some(StreamEvent::Message(WireMessage::Request(_)))
        ));
        assert!(matches!(rx.recv().await, Some(StreamEvent::Closed)));
    }

    #[tokio::test]
    async fn reader_reports_malformed_lines_and_continues() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel(16);
        spawn_stream_reader(client, tx);

        server.write_all(b"garbage\n").await.unwrap();
        server
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"n\"}\n")
            .await
            .unwrap();
        drop(server);

        assert!(matches!(rx.recv().await, Some(StreamEvent::FrameError(_))));
        assert!(matches!(
            rx.recv().await,
            Some(StreamEvent::Message(WireMessage::Notification(_)))
        ));
    }

    #[tokio::test]
    async fn writer_round_trips() {
        let (a, mut b) = tokio::io::duplex(1024);
        let tx = spawn_stream_writer(a);
        tx.send(b"hello\n".to_vec()).await.unwrap();

        let mut buf = [0u8; 6];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");
    }
}
