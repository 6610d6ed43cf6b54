//! Sensor link
//!
//! Owns the byte channel to one module and turns it into a
//! command/acknowledge exchange. Exchanges are serialized by an internal
//! lock, so at most one is ever outstanding on the wire.
//!
//! Acknowledges carry no request id. An exchange abandoned between send and
//! reply leaves its acknowledge on the wire, so the next exchange reopens the
//! channel before sending rather than read that stale reply as its own.

use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use fingerlink_core::constants::{DEFAULT_ADDRESS, DEFAULT_CAPACITY, DEFAULT_PASSWORD};
use fingerlink_core::{Confirmation, Instruction, Packet, Response, Session, SystemParameters};
use fingerlink_transport::Transport;

use crate::error::{Error, Result};

/// Framed channel to the sensor module
///
/// # Examples
///
/// ```no_run
/// use fingerlink::SensorLink;
/// use fingerlink::transport::TcpTransport;
/// use fingerlink_core::Instruction;
///
/// #[tokio::main]
/// async fn main() -> fingerlink::Result<()> {
///     let link = SensorLink::new(TcpTransport::new("192.168.1.40", 2000));
///
///     let params = link.connect().await?;
///     println!("{}", params);
///
///     let response = link.exchange(Instruction::TemplateNum, &[]).await?;
///     println!("{} templates", response.u16_at(0)?);
///     Ok(())
/// }
/// ```
pub struct SensorLink {
    channel: Mutex<Channel>,
    session: Session,
    address: u32,
    password: u32,
    timeout: Duration,
    parameters: parking_lot::RwLock<Option<SystemParameters>>,
}

impl SensorLink {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_boxed(Box::new(transport))
    }

    pub fn from_boxed(transport: Box<dyn Transport>) -> Self {
        Self {
            channel: Mutex::new(Channel {
                transport,
                in_flight: false,
            }),
            session: Session::new(),
            address: DEFAULT_ADDRESS,
            password: DEFAULT_PASSWORD,
            timeout: Duration::from_secs(2),
            parameters: parking_lot::RwLock::new(None),
        }
    }

    /// Set the per-exchange timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the module address
    pub fn with_address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    /// Set the handshake password (default: 0)
    pub fn with_password(mut self, password: u32) -> Self {
        self.password = password;
        self
    }

    /// Check if the last exchange reached the sensor
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Library capacity (reported by the module once connected)
    pub fn capacity(&self) -> u16 {
        self.session.capacity()
    }

    /// Parameters read during the last handshake
    pub fn parameters(&self) -> Option<SystemParameters> {
        *self.parameters.read()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Open the channel and run the module handshake
    ///
    /// Verifies the password, then reads the system parameters and adopts
    /// the reported library capacity.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The channel cannot be opened
    /// - The module doesn't respond
    /// - The module rejects the password
    pub async fn connect(&self) -> Result<SystemParameters> {
        {
            let mut channel = self.channel.lock().await;
            info!("Connecting to sensor at {}...", channel.transport.remote_addr());

            if !channel.transport.is_connected() {
                channel.transport.connect().await?;
            }
        }

        let response = self
            .exchange(Instruction::VfyPwd, &self.password.to_be_bytes())
            .await?;

        match response.confirmation {
            Confirmation::Ok => self.session.verify()?,
            Confirmation::WrongPassword => return Err(Error::WrongPassword),
            code => {
                return Err(Error::Sensor {
                    instruction: Instruction::VfyPwd,
                    code,
                });
            }
        }

        let response = self.exchange(Instruction::ReadSysPara, &[]).await?;
        if !response.confirmation.is_ok() {
            return Err(Error::Sensor {
                instruction: Instruction::ReadSysPara,
                code: response.confirmation,
            });
        }

        let params = SystemParameters::parse(&response.payload)?;
        let capacity = if params.capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            params.capacity
        };

        self.session.set_capacity(capacity);
        *self.parameters.write() = Some(params);

        info!(capacity, security_level = params.security_level, "Sensor connected");

        Ok(params)
    }

    /// Close the channel
    pub async fn disconnect(&self) -> Result<()> {
        let mut channel = self.channel.lock().await;
        channel.in_flight = false;

        if channel.transport.is_connected() {
            info!("Disconnecting from {}...", channel.transport.remote_addr());
            channel.transport.disconnect().await?;
        }

        self.session.close();
        Ok(())
    }

    /// Send one instruction and wait for its acknowledge
    ///
    /// Non-zero confirmation codes are returned, not raised; interpreting
    /// them is up to the caller. A transport or frame failure marks the
    /// link stale and drops the channel so the next exchange starts clean.
    /// The same happens when the previous exchange was dropped before its
    /// reply arrived.
    pub async fn exchange(&self, instruction: Instruction, params: &[u8]) -> Result<Response> {
        let mut channel = self.channel.lock().await;
        let exchange_id = self.session.next_exchange_id();

        let packet = Packet::command(self.address, instruction, params)?;

        if channel.in_flight {
            warn!(exchange_id, "Previous exchange abandoned before its reply, reopening channel");
            self.session.mark_stale();
            channel.drop_transport().await;
        }

        channel.in_flight = true;
        let result = self.round_trip(&mut *channel.transport, &packet).await;
        channel.in_flight = false;

        match result {
            Ok(response) => {
                self.session.record_success();

                trace!(
                    exchange_id,
                    %instruction,
                    confirmation = %response.confirmation,
                    "Exchange complete"
                );

                Ok(response)
            }
            Err(e) => {
                warn!(exchange_id, %instruction, error = %e, "Exchange failed");

                self.session.mark_stale();
                channel.drop_transport().await;

                Err(e)
            }
        }
    }

    // Helper methods

    async fn round_trip(&self, transport: &mut dyn Transport, packet: &Packet) -> Result<Response> {
        if !transport.is_connected() {
            debug!("Channel closed, reopening {}", transport.remote_addr());
            transport.connect().await?;
        }

        let frame = packet.encode();
        trace!("Sending: {}", hex::encode(&frame));
        transport.send(&frame).await?;

        let reply = self.receive_packet(transport).await?;

        if reply.address != self.address && self.address != DEFAULT_ADDRESS {
            return Err(fingerlink_core::Error::AddressMismatch {
                expected: self.address,
                actual: reply.address,
            }
            .into());
        }

        Ok(Response::try_from(reply)?)
    }

    /// Accumulate reads until one frame decodes or the deadline passes
    async fn receive_packet(&self, transport: &mut dyn Transport) -> Result<Packet> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = BytesMut::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::LinkTimeout);
            }

            let chunk = match transport.receive(remaining).await {
                Ok(chunk) => chunk,
                Err(fingerlink_transport::Error::ReadTimeout) => return Err(Error::LinkTimeout),
                Err(e) => return Err(e.into()),
            };

            trace!("Received: {}", hex::encode(&chunk));
            buf.extend_from_slice(&chunk);

            if let Some(packet) = Packet::parse(&mut buf)? {
                if !buf.is_empty() {
                    debug!(trailing = buf.len(), "Discarding bytes after frame");
                }
                return Ok(packet);
            }
        }
    }
}

/// Transport plus whether a request on it still awaits its reply
struct Channel {
    transport: Box<dyn Transport>,
    in_flight: bool,
}

impl Channel {
    async fn drop_transport(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!("Failed to drop channel: {}", e);
        }
        self.in_flight = false;
    }
}
