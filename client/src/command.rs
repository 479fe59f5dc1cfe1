//! Command channel: one socket, one request/response exchange at a time.
//!
//! Every request holds the channel's mutex from the first byte written to
//! the last byte of the response read. Multi-step operations (a request
//! followed by a secondary payload) take the lock once through
//! [`CommandChannel::lock`] and run every step on the returned guard.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use protocol_pigpio::{Extent, RESPONSE_LEN, Request, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::error::ClientError;
use crate::latency::ClientLatency;

/// A request/response connection to the daemon.
///
/// Generic over the socket so tests can run it over an in-memory pipe.
pub struct CommandChannel<S = TcpStream> {
    stream: Mutex<Option<S>>,
    max_payload_len: usize,
    latency: Arc<ClientLatency>,
}

impl CommandChannel<TcpStream> {
    /// Connect to the daemon.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        tcp_nodelay: bool,
        max_payload_len: usize,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(tcp_nodelay)?;
        debug!(peer = ?stream.peer_addr().ok(), "command channel connected");
        Ok(Self::new(stream, max_payload_len))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> CommandChannel<S> {
    /// Wrap an already-connected socket.
    pub fn new(stream: S, max_payload_len: usize) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
            max_payload_len,
            latency: Arc::new(ClientLatency::new()),
        }
    }

    /// Run a fixed request and return the signed result.
    pub async fn send_command(
        &self,
        cmd: impl Into<u32>,
        p1: u32,
        p2: u32,
    ) -> Result<i32, ClientError> {
        self.lock().await?.send_command(cmd, p1, p2).await
    }

    /// Run a request carrying extents and return the signed result.
    pub async fn send_extended_command(
        &self,
        cmd: impl Into<u32>,
        p1: u32,
        p2: u32,
        extents: &[Extent<'_>],
    ) -> Result<i32, ClientError> {
        self.lock()
            .await?
            .send_extended_command(cmd, p1, p2, extents)
            .await
    }

    /// Take exclusive use of the channel.
    ///
    /// No other request can interleave until the guard is dropped.
    pub async fn lock(&self) -> Result<CommandGuard<'_, S>, ClientError> {
        let stream = self.stream.lock().await;
        if stream.is_none() {
            return Err(ClientError::Closed);
        }
        Ok(CommandGuard {
            stream,
            max_payload_len: self.max_payload_len,
            latency: &self.latency,
        })
    }

    /// Shut the socket down. Later requests fail with `ClientError::Closed`.
    pub async fn close(&self) -> Result<(), ClientError> {
        let stream = self.stream.lock().await.take();
        if let Some(mut stream) = stream {
            debug!("closing command channel");
            stream.shutdown().await?;
        }
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.stream.lock().await.is_none()
    }

    /// Round-trip latency histograms for this channel.
    pub fn latency(&self) -> &ClientLatency {
        &self.latency
    }

    pub fn max_payload_len(&self) -> usize {
        self.max_payload_len
    }
}

/// Exclusive access to a [`CommandChannel`].
///
/// The socket is taken out of the channel for the duration of each step and
/// only put back once the step has read everything the daemon sent. A
/// transport error, or a step future dropped part way through, leaves the
/// socket position unknown, so the socket is dropped and the channel closed.
pub struct CommandGuard<'a, S> {
    stream: MutexGuard<'a, Option<S>>,
    max_payload_len: usize,
    latency: &'a ClientLatency,
}

impl<S: AsyncRead + AsyncWrite + Unpin> CommandGuard<'_, S> {
    /// Run a fixed request without releasing the channel.
    pub async fn send_command(
        &mut self,
        cmd: impl Into<u32>,
        p1: u32,
        p2: u32,
    ) -> Result<i32, ClientError> {
        let request = Request::new(cmd, p1, p2);
        let (result, elapsed) = self.exchange(&request).await?;
        let _ = self.latency.fixed().increment(elapsed);
        Ok(result)
    }

    /// Run a request carrying extents without releasing the channel.
    pub async fn send_extended_command(
        &mut self,
        cmd: impl Into<u32>,
        p1: u32,
        p2: u32,
        extents: &[Extent<'_>],
    ) -> Result<i32, ClientError> {
        let request = Request::new(cmd, p1, p2).extents(extents.iter().copied());
        let (result, elapsed) = self.exchange(&request).await?;
        let _ = self.latency.extended().increment(elapsed);
        Ok(result)
    }

    /// Read a secondary payload of `len` bytes that follows a response.
    ///
    /// Payloads above the configured limit are read and discarded so the
    /// next request starts on a frame boundary, then rejected.
    pub async fn read_payload(&mut self, len: usize) -> Result<Bytes, ClientError> {
        let max = self.max_payload_len;
        let started = Instant::now();
        let mut stream = self.stream.take().ok_or(ClientError::Closed)?;

        if len > max {
            warn!(len, max, "discarding oversized payload");
            let mut remaining = (&mut stream).take(len as u64);
            let drained = tokio::io::copy(&mut remaining, &mut tokio::io::sink()).await?;
            if drained != len as u64 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            *self.stream = Some(stream);
            return Err(ClientError::PayloadTooLarge { len, max });
        }

        let mut buf = BytesMut::zeroed(len);
        stream.read_exact(&mut buf).await?;
        *self.stream = Some(stream);

        let _ = self
            .latency
            .payload()
            .increment(started.elapsed().as_nanos() as u64);
        Ok(buf.freeze())
    }

    async fn exchange(&mut self, request: &Request<'_>) -> Result<(i32, u64), ClientError> {
        let mut buf = Vec::with_capacity(request.encoded_len()?);
        request.encode(&mut buf)?;

        let mut stream = self.stream.take().ok_or(ClientError::Closed)?;
        let sent_at = Instant::now();
        let mut response = [0u8; RESPONSE_LEN];
        stream.write_all(&buf).await?;
        stream.read_exact(&mut response).await?;
        *self.stream = Some(stream);

        let elapsed = sent_at.elapsed().as_nanos() as u64;
        let _ = self.latency.request().increment(elapsed);

        let (response, _) = Response::parse(&response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        trace!(
            cmd = request.cmd(),
            result = response.result(),
            "command complete"
        );
        Ok((response.result(), elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol_pigpio::Opcode;
    use std::time::Duration;
    use tokio::io::{DuplexStream, duplex};
    use tokio::time::{sleep, timeout};

    /// Read one request header plus `extra` bytes, then answer with `result`.
    async fn answer(peer: &mut DuplexStream, extra: usize, result: i32) -> Vec<u8> {
        let mut request = vec![0u8; 16 + extra];
        peer.read_exact(&mut request).await.unwrap();
        let mut response = [0u8; RESPONSE_LEN];
        Response::new(result).encode(&mut response);
        peer.write_all(&response).await.unwrap();
        request
    }

    #[tokio::test]
    async fn test_send_command_frames_request() {
        let (client, mut peer) = duplex(1024);
        let channel = CommandChannel::new(client, 1024);

        let daemon = tokio::spawn(async move { answer(&mut peer, 0, -24).await });
        let result = channel.send_command(Opcode::Modes, 17, 1).await.unwrap();
        let request = daemon.await.unwrap();

        assert_eq!(result, -24);
        assert_eq!(
            request,
            [0, 0, 0, 0, 17, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert!(channel.latency().fixed().load().is_some());
    }

    #[tokio::test]
    async fn test_send_extended_command_appends_extents() {
        let (client, mut peer) = duplex(1024);
        let channel = CommandChannel::new(client, 1024);

        let daemon = tokio::spawn(async move { answer(&mut peer, 7, 3).await });
        let level = 1u32.to_le_bytes();
        let result = channel
            .send_extended_command(
                Opcode::Trig,
                23,
                10,
                &[Extent::Binary(&level), Extent::Text("abc")],
            )
            .await
            .unwrap();
        let request = daemon.await.unwrap();

        assert_eq!(result, 3);
        assert_eq!(&request[12..16], &7u32.to_le_bytes());
        assert_eq!(&request[16..], &[1, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_guard_reads_secondary_payload() {
        let (client, mut peer) = duplex(1024);
        let channel = CommandChannel::new(client, 1024);

        let daemon = tokio::spawn(async move {
            answer(&mut peer, 0, 4).await;
            peer.write_all(b"wxyz").await.unwrap();
            answer(&mut peer, 0, 0).await;
        });

        {
            let mut guard = channel.lock().await.unwrap();
            let len = guard.send_command(Opcode::Procp, 1, 0).await.unwrap();
            let payload = guard.read_payload(len as usize).await.unwrap();
            assert_eq!(&payload[..], b"wxyz");
        }
        assert_eq!(channel.send_command(Opcode::Tick, 0, 0).await.unwrap(), 0);
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_payload_is_drained() {
        let (client, mut peer) = duplex(4096);
        let channel = CommandChannel::new(client, 8);

        let daemon = tokio::spawn(async move {
            answer(&mut peer, 0, 100).await;
            peer.write_all(&[0x55; 100]).await.unwrap();
            answer(&mut peer, 0, 7).await;
        });

        {
            let mut guard = channel.lock().await.unwrap();
            let len = guard.send_command(Opcode::I2crd, 0, 100).await.unwrap();
            let err = guard.read_payload(len as usize).await.unwrap_err();
            assert!(matches!(
                err,
                ClientError::PayloadTooLarge { len: 100, max: 8 }
            ));
        }
        // The channel is still aligned on a frame boundary.
        assert_eq!(channel.send_command(Opcode::Tick, 0, 0).await.unwrap(), 7);
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_extent_writes_nothing() {
        let (client, mut peer) = duplex(1024);
        let channel = CommandChannel::new(client, 1024);

        let err = channel
            .send_extended_command(Opcode::Proc, 0, 0, &[Extent::Text("λ")])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Extent(_)));

        // The channel stays usable and the bad request never hit the wire.
        let daemon = tokio::spawn(async move { answer(&mut peer, 0, 1).await });
        assert_eq!(channel.send_command(Opcode::Br1, 0, 0).await.unwrap(), 1);
        let request = daemon.await.unwrap();
        assert_eq!(&request[0..4], &10u32.to_le_bytes());
    }

    #[tokio::test]
    async fn test_eof_closes_channel() {
        let (client, peer) = duplex(1024);
        let channel = CommandChannel::new(client, 1024);
        drop(peer);

        let err = channel.send_command(Opcode::Tick, 0, 0).await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
        assert!(channel.is_closed().await);
        assert!(matches!(
            channel.send_command(Opcode::Tick, 0, 0).await,
            Err(ClientError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _peer) = duplex(1024);
        let channel = CommandChannel::new(client, 1024);
        channel.close().await.unwrap();
        channel.close().await.unwrap();
        assert!(matches!(channel.lock().await, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn test_dropped_exchange_closes_channel() {
        let (client, mut peer) = duplex(1024);
        let channel = CommandChannel::new(client, 1024);

        // The daemon answers the first request late, then would answer the
        // next one with 42.
        let daemon = tokio::spawn(async move {
            let mut request = [0u8; 16];
            if peer.read_exact(&mut request).await.is_err() {
                return;
            }
            sleep(Duration::from_millis(100)).await;
            for result in [-1, 42] {
                let mut response = [0u8; RESPONSE_LEN];
                Response::new(result).encode(&mut response);
                if peer.write_all(&response).await.is_err() {
                    return;
                }
            }
        });

        let first = timeout(
            Duration::from_millis(20),
            channel.send_command(Opcode::Read, 4, 0),
        )
        .await;
        assert!(first.is_err());

        // The late reply must never be read as the answer to a new request.
        assert!(channel.is_closed().await);
        assert!(matches!(
            channel.send_command(Opcode::Tick, 0, 0).await,
            Err(ClientError::Closed)
        ));
        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_payload_read_closes_channel() {
        let (client, mut peer) = duplex(1024);
        let channel = CommandChannel::new(client, 1024);

        let daemon = tokio::spawn(async move {
            answer(&mut peer, 0, 8).await;
            // Half the payload, then stall.
            peer.write_all(b"abcd").await.unwrap();
            sleep(Duration::from_millis(100)).await;
            let _ = peer.write_all(b"efgh").await;
        });

        {
            let mut guard = channel.lock().await.unwrap();
            let len = guard.send_command(Opcode::Procp, 0, 0).await.unwrap();
            let read = timeout(Duration::from_millis(20), guard.read_payload(len as usize)).await;
            assert!(read.is_err());
        }
        assert!(matches!(channel.lock().await, Err(ClientError::Closed)));
        daemon.await.unwrap();
    }
}
