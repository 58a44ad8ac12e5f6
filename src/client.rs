use log::{debug, trace, warn};
use rand::Rng;
use tokio::{io::AsyncWriteExt, net::TcpStream};

use crate::{
    config::{with_deadline, ClientConfig},
    error::RconError,
    packet::{Packet, PacketType},
};

/// Simple asynchronous rcon client. Call `connect()` to establish a connection
/// and authenticate. The client should be `mut` as it owns the socket and the
/// request id of the current exchange.
///
/// Only one command may be in flight at a time; the client does no locking,
/// so it must not be shared between tasks without external synchronization.
/// Responses split over several packets are not reassembled.
///
/// ## Example
/// ```no_run
/// use source_rcon::client::Client;
/// use std::error::Error;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn Error>> {
///     let mut client = Client::connect("127.0.0.1", 27015, "<put rcon password here>").await?;
///     let response = client.command("echo hi").await?;
///
///     assert_eq!(response.as_deref(), Some("hi"));
///     client.close().await?;
///     Ok(())
/// }
/// ```
pub struct Client {
    host: String,
    port: u16,
    password: String,
    config: ClientConfig,
    stream: Option<TcpStream>,
    request_id: i32,
    // set while a request is on the wire and its reply has not been read
    in_exchange: bool,
}

impl Client {
    pub async fn connect(host: &str, port: u16, password: &str) -> Result<Self, RconError> {
        Self::connect_with(host, port, password, ClientConfig::default()).await
    }

    /// Opens the connection and authenticates. A client returned from here
    /// is always authenticated; on any failure the socket is dropped.
    pub async fn connect_with(
        host: &str,
        port: u16,
        password: &str,
        config: ClientConfig,
    ) -> Result<Self, RconError> {
        let mut client = Client {
            host: host.to_owned(),
            port,
            password: password.to_owned(),
            config,
            stream: None,
            request_id: 0,
            in_exchange: false,
        };
        client.reconnect().await?;

        Ok(client)
    }

    /// Run a rcon command and return its output as ASCII text, or `None` if
    /// the reply was not a response to this command.
    pub async fn command(&mut self, command: &str) -> Result<Option<String>, RconError> {
        let response = self.command_raw(command).await?;
        Ok(response.map(|packet| packet.body()))
    }

    /// Run a rcon command and return the raw response packet. Replies with
    /// the wrong type or request id are discarded and yield `None`.
    ///
    /// If the connection was closed, it is reopened and authenticated first.
    /// The same happens if an earlier call was dropped before its reply was
    /// read, since that reply may still be in flight.
    pub async fn command_raw(&mut self, command: &str) -> Result<Option<Packet>, RconError> {
        if self.in_exchange && self.stream.is_some() {
            debug!(
                "previous exchange with {}:{} was abandoned, dropping connection",
                self.host, self.port
            );
            self.stream = None;
        }
        if self.stream.is_none() {
            debug!("connection to {}:{} is closed, reconnecting", self.host, self.port);
            self.reconnect().await?;
        }

        let request = Packet::new(self.request_id, PacketType::Exec, command);
        self.in_exchange = true;
        self.send(&request).await?;
        let response = self.receive().await?;
        self.in_exchange = false;

        if response.is(PacketType::Response) && response.request_id() == self.request_id {
            Ok(Some(response))
        } else {
            warn!(
                "discarding reply with id {} type {}, expected id {}",
                response.request_id(),
                response.packet_type(),
                self.request_id
            );
            Ok(None)
        }
    }

    /// Shut down and release the connection. Closing a closed client does
    /// nothing; the next command will reconnect.
    pub async fn close(&mut self) -> Result<(), RconError> {
        if let Some(mut stream) = self.stream.take() {
            debug!("closing connection to {}:{}", self.host, self.port);
            stream.shutdown().await.map_err(RconError::SendError)?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Correlation id used for the current exchange. It is chosen during
    /// authentication and reused by every command that follows.
    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    async fn reconnect(&mut self) -> Result<(), RconError> {
        self.in_exchange = true;
        let address = (self.host.as_str(), self.port);
        let stream = with_deadline(self.config.connect_timeout, async {
            TcpStream::connect(address)
                .await
                .map_err(RconError::UnreachableHost)
        })
        .await?;
        self.stream = Some(stream);

        trace!("opened tcp stream to {}:{}, attempting auth", self.host, self.port);

        match self.authenticate().await {
            Ok(true) => {
                trace!("auth complete");
                self.in_exchange = false;
                Ok(())
            }
            Ok(false) => {
                warn!("authentication to {}:{} rejected", self.host, self.port);
                self.stream = None;
                Err(RconError::AuthenticationError)
            }
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }

    /// The server answers an auth packet with an empty response value
    /// followed by an auth response, both carrying our request id. Anything
    /// else is a rejected login rather than an error.
    async fn authenticate(&mut self) -> Result<bool, RconError> {
        self.request_id = rand::rng().random_range(1..=i32::MAX);
        let auth_packet = Packet::new(self.request_id, PacketType::Auth, &self.password);

        trace!("sending auth packet to server");
        self.send(&auth_packet).await?;

        let ack = self.receive().await?;
        if !ack.is(PacketType::Response) || ack.request_id() != self.request_id {
            trace!("unexpected auth acknowledgement: {}", ack);
            return Ok(false);
        }

        let result = self.receive().await?;
        Ok(result.is(PacketType::AuthResponse) && result.request_id() == self.request_id)
    }

    async fn send(&mut self, packet: &Packet) -> Result<(), RconError> {
        let stream = self.stream.as_mut().ok_or(RconError::NotConnected)?;
        let result = with_deadline(self.config.write_timeout, packet.write_to(stream)).await;
        self.discard_on_error(result)
    }

    async fn receive(&mut self) -> Result<Packet, RconError> {
        let stream = self.stream.as_mut().ok_or(RconError::NotConnected)?;
        let result = with_deadline(self.config.read_timeout, Packet::read_from(stream)).await;
        self.discard_on_error(result)
    }

    // after a failed read or write the stream is out of sync with the server
    fn discard_on_error<T>(&mut self, result: Result<T, RconError>) -> Result<T, RconError> {
        if let Err(ref e) = result {
            debug!("dropping connection to {}:{}: {}", self.host, self.port, e);
            self.stream = None;
        }
        result
    }
}
