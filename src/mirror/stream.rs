//! # Video Stream Connector
//!
//! TCP connection to the forwarded mirror port.
//!
//! The stream starts with a fixed-size device information header followed by
//! the encoded video elementary stream. Decoding that stream into a frame is
//! not implemented: [`VideoStream::read_frame`] consumes the header and then
//! reports no frame, which sends every capture to the screencap fallback.
//! It is the hook point for a codec decoder.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use image::DynamicImage;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Size of the device information header preceding the video stream.
pub const DEVICE_INFO_LEN: usize = 69;

/// Open connection to the mirror server's video socket.
#[derive(Debug)]
pub struct VideoStream {
    stream: TcpStream,
    peer: SocketAddr,
    header: Vec<u8>,
}

impl VideoStream {
    /// Connects to `127.0.0.1:<port>`.
    ///
    /// Returns `None` on refusal or timeout, which is expected right after the
    /// server launch while the remote process is still binding.
    pub async fn connect(port: u16, timeout: Duration) -> Option<Self> {
        let peer = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match tokio::time::timeout(timeout, TcpStream::connect(peer)).await {
            Ok(Ok(stream)) => {
                log::debug!("connected to mirror stream at {}", peer);
                Some(Self {
                    stream,
                    peer,
                    header: Vec::with_capacity(DEVICE_INFO_LEN),
                })
            }
            Ok(Err(e)) => {
                log::debug!("mirror stream connect to {} failed: {}", peer, e);
                None
            }
            Err(_) => {
                log::debug!(
                    "mirror stream connect to {} timed out after {}ms",
                    peer,
                    timeout.as_millis()
                );
                None
            }
        }
    }

    /// Address of the forwarded port.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the device information header has been fully read.
    pub fn header_received(&self) -> bool {
        self.header.len() == DEVICE_INFO_LEN
    }

    /// Attempts to read one frame.
    ///
    /// `Ok(None)` means no frame is available: the header has not arrived
    /// within `timeout`, or the video payload could not be decoded. `Err` is a
    /// transport failure (reset, or the server closed the socket).
    pub async fn read_frame(&mut self, timeout: Duration) -> io::Result<Option<DynamicImage>> {
        if !self.header_received() {
            match tokio::time::timeout(timeout, self.fill_header()).await {
                Ok(result) => result?,
                Err(_) => {
                    log::debug!(
                        "no device header from {} within {}ms ({} of {} bytes)",
                        self.peer,
                        timeout.as_millis(),
                        self.header.len(),
                        DEVICE_INFO_LEN
                    );
                    return Ok(None);
                }
            }
        }

        // TODO: decode the H.264 elementary stream into a frame.
        log::debug!("mirror frame decoding is not implemented; reporting no frame");
        Ok(None)
    }

    /// Reads header bytes until complete. Only appends after each read
    /// finishes, so a timeout never loses data.
    async fn fill_header(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; DEVICE_INFO_LEN];
        while self.header.len() < DEVICE_INFO_LEN {
            let wanted = DEVICE_INFO_LEN - self.header.len();
            let n = self.stream.read(&mut chunk[..wanted]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "mirror server closed the stream before the device header",
                ));
            }
            self.header.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Shuts the connection down. Errors are ignored.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            log::debug!("ignoring mirror stream shutdown error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const SHORT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_connect_refused_returns_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(VideoStream::connect(port, SHORT).await.is_none());
    }

    #[tokio::test]
    async fn test_header_then_no_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[0u8; 40]).await.unwrap();
            socket.write_all(&[0u8; DEVICE_INFO_LEN - 40]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut stream = VideoStream::connect(port, SHORT).await.unwrap();
        assert!(stream.read_frame(SHORT).await.unwrap().is_none());
        assert!(stream.header_received());
        assert!(stream.read_frame(SHORT).await.unwrap().is_none());

        stream.close().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_silent_server_is_no_frame_not_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut stream = VideoStream::connect(port, SHORT).await.unwrap();
        let frame = stream.read_frame(Duration::from_millis(50)).await.unwrap();
        assert!(frame.is_none());
        assert!(!stream.header_received());

        server.abort();
    }

    #[tokio::test]
    async fn test_closed_socket_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut stream = VideoStream::connect(port, SHORT).await.unwrap();
        server.await.unwrap();
        let err = stream.read_frame(SHORT).await.unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset
        ));
    }
}
