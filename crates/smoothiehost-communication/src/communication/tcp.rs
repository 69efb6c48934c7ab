//! TCP transport
//!
//! Smoothieware exposes its console on a telnet-style TCP port. The send
//! buffer is kept small so a fast stream cannot park a whole file in the
//! host's socket buffer, which would make pause and abort sluggish.

use smoothiehost_core::{ConnectionError, Result};
use tokio::net::{lookup_host, TcpSocket, TcpStream};

/// Socket send buffer size in bytes
const SEND_BUFFER_SIZE: u32 = 2048;

/// Connect to a controller console
pub async fn open_tcp(host: &str, port: u16) -> Result<TcpStream> {
    let failed = |reason: String| ConnectionError::FailedToOpen {
        endpoint: format!("{}:{}", host, port),
        reason,
    };

    let addr = lookup_host((host, port))
        .await
        .map_err(|e| failed(e.to_string()))?
        .next()
        .ok_or_else(|| failed("host did not resolve".to_string()))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| failed(e.to_string()))?;

    if let Err(e) = socket.set_send_buffer_size(SEND_BUFFER_SIZE) {
        tracing::debug!("Could not shrink send buffer: {}", e);
    }

    let stream = socket.connect(addr).await.map_err(|e| {
        tracing::warn!("Failed to connect to {}: {}", addr, e);
        failed(e.to_string())
    })?;
    stream.set_nodelay(true).map_err(|e| failed(e.to_string()))?;

    tracing::info!("Connected to {}", addr);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 8];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"ok\n").await.unwrap();
            buf[..n].to_vec()
        });

        let mut stream = open_tcp("127.0.0.1", port).await.unwrap();
        stream.write_all(b"?").await.unwrap();
        let mut reply = [0u8; 3];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"ok\n");
        assert_eq!(server.await.unwrap(), b"?".to_vec());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let err = open_tcp("127.0.0.1", port).await.unwrap_err();
        assert!(err.is_connection_error());
    }
}
