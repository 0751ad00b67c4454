// ABOUTME: SSH reverse TCP forwarding (remote listener, local target).
// ABOUTME: Requests tcpip-forward and pumps forwarded-tcpip channels to a local address.

use super::client::SshHandler;
use super::error::{Error, Result};
use parking_lot::Mutex;
use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Remote listening port to local target, shared with the client handler.
pub(crate) type ForwardTable = Arc<Mutex<HashMap<u32, SocketAddr>>>;

/// An active reverse forward. Cancelled explicitly or unregistered on drop.
pub struct ReverseForward {
    bind_address: String,
    remote_port: u32,
    handle: Arc<Handle<SshHandler>>,
    table: ForwardTable,
}

impl ReverseForward {
    /// Port the remote host is listening on.
    pub fn remote_port(&self) -> u32 {
        self.remote_port
    }

    /// Ask the server to stop listening and stop accepting forwarded channels.
    pub async fn cancel(self) -> Result<()> {
        self.table.lock().remove(&self.remote_port);
        self.handle
            .cancel_tcpip_forward(self.bind_address.clone(), self.remote_port)
            .await
            .map_err(Error::Protocol)
    }
}

impl Drop for ReverseForward {
    fn drop(&mut self) {
        self.table.lock().remove(&self.remote_port);
    }
}

/// Request a remote listener on `bind_address:remote_port` that forwards to `local`.
pub(crate) async fn request(
    handle: Arc<Handle<SshHandler>>,
    table: ForwardTable,
    bind_address: &str,
    remote_port: u16,
    local: SocketAddr,
) -> Result<ReverseForward> {
    let bound = handle
        .tcpip_forward(bind_address.to_string(), u32::from(remote_port))
        .await
        .map_err(|e| Error::ForwardRefused {
            port: remote_port,
            reason: e.to_string(),
        })?;

    // Servers only report the port when one was allocated for a zero request.
    let remote_port = if bound == 0 {
        u32::from(remote_port)
    } else {
        bound
    };
    table.lock().insert(remote_port, local);
    tracing::debug!(remote_port, %local, "reverse forward established");

    Ok(ReverseForward {
        bind_address: bind_address.to_string(),
        remote_port,
        handle,
        table,
    })
}

/// Pump one forwarded-tcpip channel to a fresh TCP connection to `target`.
pub(crate) async fn pump(mut channel: Channel<Msg>, target: SocketAddr) -> Result<()> {
    let mut local_stream = match TcpStream::connect(target).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = channel.close().await;
            return Err(Error::Io(e));
        }
    };

    let mut stream_closed = false;
    let mut channel_closed = false;
    let mut buf = vec![0u8; 65536];

    loop {
        tokio::select! {
            r = local_stream.read(&mut buf), if !stream_closed => {
                match r {
                    Ok(0) => {
                        stream_closed = true;
                        let _ = channel.eof().await;
                        if channel_closed {
                            break;
                        }
                    }
                    Ok(n) => {
                        if let Err(e) = channel.data(&buf[..n]).await {
                            tracing::debug!("channel data error: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("local stream read error: {}", e);
                        break;
                    }
                }
            }

            msg = channel.wait(), if !channel_closed => {
                match msg {
                    Some(ChannelMsg::Data { ref data }) => {
                        if let Err(e) = local_stream.write_all(data).await {
                            tracing::debug!("local stream write error: {}", e);
                            break;
                        }
                    }
                    Some(ChannelMsg::Eof) => {
                        channel_closed = true;
                        let _ = local_stream.shutdown().await;
                        if stream_closed {
                            break;
                        }
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                }
            }

            else => break,
        }
    }

    let _ = channel.close().await;
    Ok(())
}
