//! TCP transport
//!
//! Talks to the module through a serial-to-TCP bridge. The bridge forwards
//! bytes verbatim, so frames arrive exactly as the UART delivers them,
//! possibly split across reads.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{Transport, error::*};

/// TCP transport for bridged sensor modules
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Create a transport from a `host:port` string
    ///
    /// # Examples
    ///
    /// ```
    /// use fingerlink_transport::{TcpTransport, Transport};
    ///
    /// let transport = TcpTransport::parse("raspberrypi.local:4001").unwrap();
    /// assert_eq!(transport.remote_addr(), "raspberrypi.local:4001");
    /// ```
    pub fn parse(addr: &str) -> Result<Self> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidAddress(format!("{}: missing port", addr)))?;

        let port = port
            .parse::<u16>()
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr, e)))?;

        Ok(Self::new(host, port))
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to sensor bridge at {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Frames are small; don't let Nagle hold them back
        stream.set_nodelay(true)?;

        debug!("Connected to sensor bridge at {}", addr);

        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            let _ = stream.shutdown().await;
        }

        self.socket_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {}", data.len(), hex::encode(data));

        if let Err(e) = stream.write_all(data).await {
            self.stream = None;
            return Err(Error::Io(e));
        }
        stream.flush().await?;

        Ok(())
    }

    async fn receive(&mut self, read_timeout: Duration) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::with_capacity(512);

        let n = match timeout(read_timeout, stream.read_buf(&mut buf)).await {
            Err(_) => return Err(Error::ReadTimeout),
            Ok(Err(e)) => {
                warn!("Read error: {}", e);
                self.stream = None;
                return Err(Error::Io(e));
            }
            Ok(Ok(n)) => n,
        };

        if n == 0 {
            warn!("Sensor bridge closed the connection");
            self.stream = None;
            return Err(Error::ConnectionClosed);
        }

        trace!("Received {} bytes: {}", n, hex::encode(&buf[..n]));

        Ok(buf)
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            debug!("TCP transport dropped while still connected");
        }
    }
}
