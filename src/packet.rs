use std::fmt;
use std::io::ErrorKind;

use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RconError;

/// Message kinds of the protocol. `Exec` and `AuthResponse` share the same
/// wire value, so a decoded [Packet] keeps its raw type and is matched with
/// [Packet::is].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    // SERVERDATA_AUTH
    Auth,
    // SERVERDATA_EXECCOMMAND
    Exec,
    // SERVERDATA_AUTH_RESPONSE
    AuthResponse,
    // SERVERDATA_RESPONSE_VALUE
    Response,
}

impl PacketType {
    pub fn value(&self) -> i32 {
        match self {
            PacketType::Auth => 3,
            PacketType::Exec => 2,
            PacketType::AuthResponse => 2,
            PacketType::Response => 0,
        }
    }
}

/// One protocol message. Equality and hashing are by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    request_id: i32,
    packet_type: i32,
    payload: Vec<u8>,
}

impl Packet {
    /// Size of everything counted by the size field except the payload:
    /// request id, type and the two terminator bytes.
    pub const BASE_PACKET_SIZE: i32 = 10;
    /// Size, request id and type.
    pub const HEADER_LEN: usize = 12;
    const TERMINATOR: [u8; 2] = [0, 0];

    /// Builds a packet with an ASCII body. Characters outside the ASCII
    /// range are sent as `?`.
    pub fn new(request_id: i32, packet_type: PacketType, body: &str) -> Self {
        Self::from_parts(request_id, packet_type.value(), encode_ascii(body))
    }

    pub fn from_parts(request_id: i32, packet_type: i32, payload: Vec<u8>) -> Self {
        Packet {
            request_id,
            packet_type,
            payload,
        }
    }

    // Since the only one of these values that can change in length is the body,
    // an easy way to calculate the size of a packet is to find the byte-length
    // of the body, then add 10 to it.
    /// Fails with [RconError::PacketTooLarge] if the size does not fit the
    /// signed 32-bit size field.
    pub fn size(&self) -> Result<i32, RconError> {
        declared_size(self.payload.len())
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn packet_type(&self) -> i32 {
        self.packet_type
    }

    pub fn is(&self, packet_type: PacketType) -> bool {
        self.packet_type == packet_type.value()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload decoded as ASCII; bytes above 0x7f become U+FFFD.
    pub fn body(&self) -> String {
        decode_ascii(&self.payload)
    }

    pub fn pack(&self) -> Result<Vec<u8>, RconError> {
        let size = self.size()?;
        // Size, ID, Type, Body, Terminator
        let mut bytes = Vec::with_capacity(Self::HEADER_LEN + self.payload.len() + 2);
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.extend_from_slice(&self.request_id.to_le_bytes());
        bytes.extend_from_slice(&self.packet_type.to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        // null terminate the body, then null terminate the entire packet
        bytes.extend_from_slice(&Self::TERMINATOR);
        Ok(bytes)
    }

    /// Decodes one packet from the front of `incoming`. Bytes after the
    /// terminator are ignored.
    pub fn unpack(mut incoming: &[u8]) -> Result<Self, RconError> {
        let header = split(&mut incoming, Self::HEADER_LEN, "header")?;
        let (size, request_id, packet_type) = parse_header(header);
        let payload = split(&mut incoming, body_len(size)?, "body")?.to_vec();
        split(&mut incoming, Self::TERMINATOR.len(), "terminator")?;

        Ok(Self::from_parts(request_id, packet_type, payload))
    }

    /// Writes the packet in a single write and flushes it.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), RconError>
    where
        W: AsyncWrite + Unpin,
    {
        trace!(
            "send packet id {} type {} ({} bytes)",
            self.request_id,
            self.packet_type,
            self.payload.len()
        );
        let bytes = self.pack()?;
        writer
            .write_all(&bytes)
            .await
            .map_err(RconError::SendError)?;
        writer.flush().await.map_err(RconError::SendError)
    }

    /// Reads exactly one packet. Any short read is a framing error.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, RconError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; Self::HEADER_LEN];
        read_section(reader.read_exact(&mut header).await, "header")?;
        let (size, request_id, packet_type) = parse_header(&header);

        // read through `take` so a bogus size can't make us allocate it upfront
        let len = body_len(size)?;
        let mut payload = Vec::new();
        let body = (&mut *reader).take(len as u64).read_to_end(&mut payload).await;
        read_section(body, "body")?;
        if payload.len() < len {
            return Err(short_read("body", len, payload.len()));
        }

        let mut terminator = [0u8; 2];
        read_section(reader.read_exact(&mut terminator).await, "terminator")?;

        trace!(
            "receive packet id {} type {} ({} bytes)",
            request_id,
            packet_type,
            payload.len()
        );
        Ok(Self::from_parts(request_id, packet_type, payload))
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet{{requestId={}, type={}, payload={}}}",
            self.request_id,
            self.packet_type,
            self.body()
        )
    }
}

fn parse_header(header: &[u8]) -> (i32, i32, i32) {
    let field = |at: usize| {
        i32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
    };
    (field(0), field(4), field(8))
}

fn declared_size(payload_len: usize) -> Result<i32, RconError> {
    i32::try_from(payload_len)
        .ok()
        .and_then(|len| len.checked_add(Packet::BASE_PACKET_SIZE))
        .ok_or(RconError::PacketTooLarge(payload_len))
}

fn body_len(size: i32) -> Result<usize, RconError> {
    if size < Packet::BASE_PACKET_SIZE {
        return Err(RconError::InvalidPacketSize(size));
    }
    Ok((size - Packet::BASE_PACKET_SIZE) as usize)
}

fn split<'a>(
    buf: &mut &'a [u8],
    len: usize,
    section: &'static str,
) -> Result<&'a [u8], RconError> {
    if buf.len() < len {
        return Err(short_read(section, len, buf.len()));
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn read_section<T>(result: std::io::Result<T>, section: &'static str) -> Result<T, RconError> {
    result.map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => RconError::TruncatedPacket { section, source: e },
        _ => RconError::ReceiveError(e),
    })
}

fn short_read(section: &'static str, expected: usize, received: usize) -> RconError {
    RconError::TruncatedPacket {
        section,
        source: std::io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("expected {} bytes, received {}", expected, received),
        ),
    }
}

fn encode_ascii(body: &str) -> Vec<u8> {
    body.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                b as char
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect()
}
