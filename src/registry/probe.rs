// ABOUTME: Registry readiness probe over the distribution API.
// ABOUTME: Any HTTP answer to GET /v2/ (200 or 401) counts as ready.

use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("HTTP exchange with {addr} failed: {reason}")]
    Http { addr: SocketAddr, reason: String },

    #[error("no answer from {addr} within {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },
}

/// A single readiness check against a registry endpoint.
#[async_trait]
pub trait RegistryProbe: Send + Sync {
    /// Returns the HTTP status of `GET /v2/`.
    async fn probe(&self, addr: SocketAddr) -> Result<u16, ProbeError>;
}

/// Plain-HTTP probe using hyper over a fresh TCP connection.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn get_v2(&self, addr: SocketAddr) -> Result<u16, ProbeError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ProbeError::Connect { addr, source })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| ProbeError::Http {
                addr,
                reason: e.to_string(),
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("probe connection error: {}", e);
            }
        });

        let req = hyper::Request::builder()
            .method("GET")
            .uri("/v2/")
            .header("Host", addr.to_string())
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| ProbeError::Http {
                addr,
                reason: e.to_string(),
            })?;

        let resp = sender.send_request(req).await.map_err(|e| ProbeError::Http {
            addr,
            reason: e.to_string(),
        })?;

        Ok(resp.status().as_u16())
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl RegistryProbe for HttpProbe {
    async fn probe(&self, addr: SocketAddr) -> Result<u16, ProbeError> {
        match tokio::time::timeout(self.timeout, self.get_v2(addr)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout {
                addr,
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(response: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn auth_rejection_counts_as_answer() {
        let addr =
            serve_once("HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n").await;
        let status = HttpProbe::default().probe(addr).await.unwrap();
        assert_eq!(status, 401);
    }

    #[tokio::test]
    async fn ok_answer() {
        let addr = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}").await;
        let status = HttpProbe::default().probe(addr).await.unwrap();
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn closed_port_is_a_connect_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let err = HttpProbe::default().probe(addr).await.unwrap_err();
        assert!(matches!(err, ProbeError::Connect { .. }));
    }
}
