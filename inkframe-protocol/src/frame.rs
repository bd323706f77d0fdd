//! MQTT 3.1.1 packet encoding and decoding.
//!
//! Packet format:
//! - FIXED HEADER (1 byte): packet type in the high nibble, flags in the low
//! - REMAINING LENGTH (1-4 bytes): 7 bits per byte, high bit = continuation
//! - VARIABLE HEADER + PAYLOAD (REMAINING LENGTH bytes)
//!
//! Only QoS 0 is used in either direction. Outbound packets are encoded
//! straight into a caller buffer; inbound packets go through
//! [`PacketParser`] one byte at a time, the same way they arrive off the
//! socket.

use heapless::{String, Vec};

use crate::MAX_TOPIC_LEN;

/// Largest inbound body (variable header + payload) the parser buffers
pub const MAX_BODY_SIZE: usize = 768;

/// Largest inbound PUBLISH payload
pub const MAX_INBOUND_PAYLOAD: usize = 512;

/// Largest value representable in four remaining-length bytes
const MAX_REMAINING_LENGTH: usize = 268_435_455;

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4;

// Packet types (high nibble of the fixed header)
const CONNECT: u8 = 1;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;
const SUBACK: u8 = 9;
const PINGREQ: u8 = 12;
const PINGRESP: u8 = 13;
const DISCONNECT: u8 = 14;

// CONNECT flags
const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// Errors that can occur during packet parsing or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Packet or field exceeds what the frame can hold
    PacketTooLarge,
    /// Remaining length used more than four bytes
    MalformedLength,
    /// Body does not match its packet type
    MalformedPacket,
    /// Buffer too small for encoding
    BufferTooSmall,
}

/// Last-will message registered with CONNECT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Will<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub retain: bool,
}

/// CONNECT parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    pub keep_alive_s: u16,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub will: Option<Will<'a>>,
}

/// Inbound PUBLISH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String<MAX_TOPIC_LEN>,
    pub payload: Vec<u8, MAX_INBOUND_PAYLOAD>,
    pub retain: bool,
}

/// Packets the frame expects from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Connection acknowledged; `return_code` 0 means accepted
    ConnAck { session_present: bool, return_code: u8 },
    /// Subscription acknowledged; `granted_qos` 0x80 means refused
    SubAck { packet_id: u16, granted_qos: u8 },
    /// Application message
    Publish(Publish),
    /// Keep-alive answer
    PingResp,
    /// Well-formed packet of a type the frame ignores
    Unsupported(u8),
}

/// Bounds-checked writer over a caller buffer
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self, value: u8) -> Result<(), FrameError> {
        let slot = self.buf.get_mut(self.pos).ok_or(FrameError::BufferTooSmall)?;
        *slot = value;
        self.pos += 1;
        Ok(())
    }

    fn u16(&mut self, value: u16) -> Result<(), FrameError> {
        self.bytes(&value.to_be_bytes())
    }

    fn bytes(&mut self, data: &[u8]) -> Result<(), FrameError> {
        let end = self.pos + data.len();
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(FrameError::BufferTooSmall)?;
        dst.copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    /// Length-prefixed string or binary field
    fn field(&mut self, data: &[u8]) -> Result<(), FrameError> {
        let len = u16::try_from(data.len()).map_err(|_| FrameError::PacketTooLarge)?;
        self.u16(len)?;
        self.bytes(data)
    }

    fn fixed_header(&mut self, first: u8, remaining: usize) -> Result<(), FrameError> {
        if remaining > MAX_REMAINING_LENGTH {
            return Err(FrameError::PacketTooLarge);
        }
        self.u8(first)?;
        let mut len = remaining;
        loop {
            let mut byte = (len % 128) as u8;
            len /= 128;
            if len > 0 {
                byte |= 0x80;
            }
            self.u8(byte)?;
            if len == 0 {
                return Ok(());
            }
        }
    }

    fn finish(self) -> usize {
        self.pos
    }
}

fn field_len(data: &[u8]) -> usize {
    2 + data.len()
}

/// Encode a CONNECT packet with a clean session
///
/// Returns the number of bytes written
pub fn encode_connect(connect: &Connect<'_>, buffer: &mut [u8]) -> Result<usize, FrameError> {
    let mut flags = FLAG_CLEAN_SESSION;
    // protocol name + level + flags + keep-alive
    let mut remaining = field_len(PROTOCOL_NAME) + 1 + 1 + 2;
    remaining += field_len(connect.client_id.as_bytes());

    if let Some(will) = &connect.will {
        flags |= FLAG_WILL;
        if will.retain {
            flags |= FLAG_WILL_RETAIN;
        }
        remaining += field_len(will.topic.as_bytes()) + field_len(will.payload);
    }
    if let Some(username) = connect.username {
        flags |= FLAG_USERNAME;
        remaining += field_len(username.as_bytes());
    }
    if let Some(password) = connect.password {
        flags |= FLAG_PASSWORD;
        remaining += field_len(password.as_bytes());
    }

    let mut w = Writer::new(buffer);
    w.fixed_header(CONNECT << 4, remaining)?;
    w.field(PROTOCOL_NAME)?;
    w.u8(PROTOCOL_LEVEL)?;
    w.u8(flags)?;
    w.u16(connect.keep_alive_s)?;
    w.field(connect.client_id.as_bytes())?;
    if let Some(will) = &connect.will {
        w.field(will.topic.as_bytes())?;
        w.field(will.payload)?;
    }
    if let Some(username) = connect.username {
        w.field(username.as_bytes())?;
    }
    if let Some(password) = connect.password {
        w.field(password.as_bytes())?;
    }
    Ok(w.finish())
}

/// Encode a QoS 0 PUBLISH
pub fn encode_publish(
    topic: &str,
    payload: &[u8],
    retain: bool,
    buffer: &mut [u8],
) -> Result<usize, FrameError> {
    let remaining = field_len(topic.as_bytes()) + payload.len();
    let first = (PUBLISH << 4) | u8::from(retain);

    let mut w = Writer::new(buffer);
    w.fixed_header(first, remaining)?;
    w.field(topic.as_bytes())?;
    w.bytes(payload)?;
    Ok(w.finish())
}

/// Encode a SUBSCRIBE for one topic filter at QoS 0
pub fn encode_subscribe(
    packet_id: u16,
    filter: &str,
    buffer: &mut [u8],
) -> Result<usize, FrameError> {
    let remaining = 2 + field_len(filter.as_bytes()) + 1;

    let mut w = Writer::new(buffer);
    // SUBSCRIBE carries the mandatory 0b0010 flags
    w.fixed_header((SUBSCRIBE << 4) | 0x02, remaining)?;
    w.u16(packet_id)?;
    w.field(filter.as_bytes())?;
    w.u8(0)?;
    Ok(w.finish())
}

/// Encode a PINGREQ
pub fn encode_pingreq(buffer: &mut [u8]) -> Result<usize, FrameError> {
    let mut w = Writer::new(buffer);
    w.fixed_header(PINGREQ << 4, 0)?;
    Ok(w.finish())
}

/// Encode a DISCONNECT
pub fn encode_disconnect(buffer: &mut [u8]) -> Result<usize, FrameError> {
    let mut w = Writer::new(buffer);
    w.fixed_header(DISCONNECT << 4, 0)?;
    Ok(w.finish())
}

/// State machine for parsing incoming packets
#[derive(Debug, Clone)]
pub struct PacketParser {
    state: ParseState,
    header: u8,
    remaining: usize,
    length_bytes: u8,
    body: Vec<u8, MAX_BODY_SIZE>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Waiting for the fixed header byte
    Header,
    /// Reading remaining-length bytes
    Length,
    /// Buffering the body
    Body,
    /// Skipping the body of an oversized packet
    Discard,
}

impl Default for PacketParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketParser {
    /// Create a new packet parser
    pub fn new() -> Self {
        Self {
            state: ParseState::Header,
            header: 0,
            remaining: 0,
            length_bytes: 0,
            body: Vec::new(),
        }
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.state = ParseState::Header;
        self.header = 0;
        self.remaining = 0;
        self.length_bytes = 0;
        self.body.clear();
    }

    /// Feed a single byte to the parser
    ///
    /// Returns `Ok(Some(packet))` when a complete packet is parsed,
    /// `Ok(None)` when more bytes are needed, or `Err` on parse error.
    /// Oversized packets are skipped in full and then reported as
    /// [`FrameError::PacketTooLarge`], leaving the stream aligned.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Incoming>, FrameError> {
        match self.state {
            ParseState::Header => {
                self.header = byte;
                self.remaining = 0;
                self.length_bytes = 0;
                self.state = ParseState::Length;
                Ok(None)
            }
            ParseState::Length => {
                self.remaining |= ((byte & 0x7F) as usize) << (7 * self.length_bytes as usize);
                self.length_bytes += 1;

                if byte & 0x80 != 0 {
                    if self.length_bytes == 4 {
                        self.reset();
                        return Err(FrameError::MalformedLength);
                    }
                    return Ok(None);
                }

                if self.remaining == 0 {
                    return self.complete().map(Some);
                }
                if self.remaining > MAX_BODY_SIZE {
                    self.state = ParseState::Discard;
                } else {
                    self.body.clear();
                    self.state = ParseState::Body;
                }
                Ok(None)
            }
            ParseState::Body => {
                // Cannot overflow: remaining was checked against MAX_BODY_SIZE
                let _ = self.body.push(byte);
                if self.body.len() == self.remaining {
                    return self.complete().map(Some);
                }
                Ok(None)
            }
            ParseState::Discard => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.reset();
                    return Err(FrameError::PacketTooLarge);
                }
                Ok(None)
            }
        }
    }

    /// Feed multiple bytes to the parser
    ///
    /// Stops after the first complete packet or error and reports how many
    /// bytes were consumed, so the caller can feed the rest afterwards.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> (usize, Result<Option<Incoming>, FrameError>) {
        for (i, &byte) in bytes.iter().enumerate() {
            match self.feed(byte) {
                Ok(None) => {}
                other => return (i + 1, other),
            }
        }
        (bytes.len(), Ok(None))
    }

    fn complete(&mut self) -> Result<Incoming, FrameError> {
        let result = decode(self.header, &self.body);
        self.reset();
        result
    }
}

fn decode(header: u8, body: &[u8]) -> Result<Incoming, FrameError> {
    match header >> 4 {
        CONNACK => match body {
            [ack_flags, code] => Ok(Incoming::ConnAck {
                session_present: ack_flags & 0x01 != 0,
                return_code: *code,
            }),
            _ => Err(FrameError::MalformedPacket),
        },
        SUBACK => match body {
            [hi, lo, granted, ..] => Ok(Incoming::SubAck {
                packet_id: u16::from_be_bytes([*hi, *lo]),
                granted_qos: *granted,
            }),
            _ => Err(FrameError::MalformedPacket),
        },
        PUBLISH => decode_publish(header, body).map(Incoming::Publish),
        PINGRESP => Ok(Incoming::PingResp),
        other => Ok(Incoming::Unsupported(other)),
    }
}

fn decode_publish(header: u8, body: &[u8]) -> Result<Publish, FrameError> {
    let qos = (header >> 1) & 0x03;
    let retain = header & 0x01 != 0;

    let (len, rest) = body.split_first_chunk::<2>().ok_or(FrameError::MalformedPacket)?;
    let topic_len = u16::from_be_bytes(*len) as usize;
    if rest.len() < topic_len {
        return Err(FrameError::MalformedPacket);
    }
    let (topic_bytes, mut rest) = rest.split_at(topic_len);
    let topic_str = core::str::from_utf8(topic_bytes).map_err(|_| FrameError::MalformedPacket)?;

    if qos > 0 {
        // Packet identifier; the frame never acknowledges, it only reads
        rest = rest.get(2..).ok_or(FrameError::MalformedPacket)?;
    }

    let mut topic = String::new();
    topic
        .push_str(topic_str)
        .map_err(|_| FrameError::PacketTooLarge)?;
    let payload = Vec::from_slice(rest).map_err(|_| FrameError::PacketTooLarge)?;

    Ok(Publish {
        topic,
        payload,
        retain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(bytes: &[u8]) -> Result<Option<Incoming>, FrameError> {
        let mut parser = PacketParser::new();
        let (used, result) = parser.feed_bytes(bytes);
        assert_eq!(used, bytes.len());
        result
    }

    #[test]
    fn test_connect_minimal() {
        let connect = Connect {
            client_id: "frame",
            keep_alive_s: 60,
            username: None,
            password: None,
            will: None,
        };
        let mut buffer = [0u8; 64];
        let len = encode_connect(&connect, &mut buffer).unwrap();

        assert_eq!(
            &buffer[..len],
            &[
                0x10, 17, // fixed header
                0, 4, b'M', b'Q', b'T', b'T', // protocol name
                4,    // level
                0x02, // clean session
                0, 60, // keep alive
                0, 5, b'f', b'r', b'a', b'm', b'e',
            ]
        );
    }

    #[test]
    fn test_connect_with_credentials_and_will() {
        let connect = Connect {
            client_id: "f",
            keep_alive_s: 30,
            username: Some("u"),
            password: Some("p"),
            will: Some(Will {
                topic: "t",
                payload: b"offline",
                retain: true,
            }),
        };
        let mut buffer = [0u8; 64];
        let len = encode_connect(&connect, &mut buffer).unwrap();

        assert_eq!(buffer[0], 0x10);
        assert_eq!(buffer[1] as usize, len - 2);
        // clean + will + will retain + password + username
        assert_eq!(buffer[9], 0x02 | 0x04 | 0x20 | 0x40 | 0x80);
        assert_eq!(&buffer[len - 6..len], &[0, 1, b'u', 0, 1, b'p']);
    }

    #[test]
    fn test_publish_retained() {
        let mut buffer = [0u8; 32];
        let len = encode_publish("a/b", b"hi", true, &mut buffer).unwrap();
        assert_eq!(&buffer[..len], &[0x31, 7, 0, 3, b'a', b'/', b'b', b'h', b'i']);
    }

    #[test]
    fn test_publish_long_remaining_length() {
        let payload = [0x55u8; 300];
        let mut buffer = [0u8; 400];
        let len = encode_publish("t", &payload, false, &mut buffer).unwrap();

        // 3 + 300 = 303 = 0b10_0101111 -> 0xAF 0x02
        assert_eq!(&buffer[..3], &[0x30, 0xAF, 0x02]);
        assert_eq!(len, 3 + 303);
    }

    #[test]
    fn test_subscribe() {
        let mut buffer = [0u8; 32];
        let len = encode_subscribe(7, "x/cmd", &mut buffer).unwrap();
        assert_eq!(
            &buffer[..len],
            &[0x82, 10, 0, 7, 0, 5, b'x', b'/', b'c', b'm', b'd', 0]
        );
    }

    #[test]
    fn test_ping_and_disconnect() {
        let mut buffer = [0u8; 2];
        assert_eq!(encode_pingreq(&mut buffer), Ok(2));
        assert_eq!(buffer, [0xC0, 0]);
        assert_eq!(encode_disconnect(&mut buffer), Ok(2));
        assert_eq!(buffer, [0xE0, 0]);
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let mut buffer = [0u8; 4];
        assert_eq!(
            encode_publish("topic", b"payload", false, &mut buffer),
            Err(FrameError::BufferTooSmall)
        );
    }

    #[test]
    fn test_parse_connack() {
        assert_eq!(
            parse_all(&[0x20, 2, 0x01, 0]),
            Ok(Some(Incoming::ConnAck {
                session_present: true,
                return_code: 0
            }))
        );
        assert_eq!(parse_all(&[0x20, 1, 0]), Err(FrameError::MalformedPacket));
    }

    #[test]
    fn test_parse_suback_and_pingresp() {
        assert_eq!(
            parse_all(&[0x90, 3, 0, 7, 0]),
            Ok(Some(Incoming::SubAck {
                packet_id: 7,
                granted_qos: 0
            }))
        );
        assert_eq!(parse_all(&[0xD0, 0]), Ok(Some(Incoming::PingResp)));
    }

    #[test]
    fn test_parse_publish() {
        let mut buffer = [0u8; 64];
        let len = encode_publish("frame/command", b"{}", false, &mut buffer).unwrap();

        match parse_all(&buffer[..len]) {
            Ok(Some(Incoming::Publish(p))) => {
                assert_eq!(p.topic.as_str(), "frame/command");
                assert_eq!(p.payload.as_slice(), b"{}");
                assert!(!p.retain);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_publish_qos1_skips_packet_id() {
        let bytes = [0x32, 7, 0, 1, b't', 0x12, 0x34, b'o', b'k'];
        match parse_all(&bytes) {
            Ok(Some(Incoming::Publish(p))) => {
                assert_eq!(p.topic.as_str(), "t");
                assert_eq!(p.payload.as_slice(), b"ok");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_publish_topic_overrun() {
        assert_eq!(
            parse_all(&[0x30, 3, 0, 9, b't']),
            Err(FrameError::MalformedPacket)
        );
    }

    #[test]
    fn test_unsupported_packet_type() {
        // PUBACK
        assert_eq!(parse_all(&[0x40, 2, 0, 1]), Ok(Some(Incoming::Unsupported(4))));
    }

    #[test]
    fn test_malformed_length() {
        assert_eq!(
            parse_all(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF]),
            Err(FrameError::MalformedLength)
        );
    }

    #[test]
    fn test_oversized_packet_is_skipped() {
        let payload = [b'x'; MAX_BODY_SIZE + 10];
        let mut buffer = [0u8; MAX_BODY_SIZE + 32];
        let len = encode_publish("t", &payload, false, &mut buffer).unwrap();
        // Follow it with a PINGRESP
        buffer[len] = 0xD0;
        buffer[len + 1] = 0;

        let mut parser = PacketParser::new();
        let (used, result) = parser.feed_bytes(&buffer[..len + 2]);
        assert_eq!(used, len);
        assert_eq!(result, Err(FrameError::PacketTooLarge));

        let (_, result) = parser.feed_bytes(&buffer[len..len + 2]);
        assert_eq!(result, Ok(Some(Incoming::PingResp)));
    }

    #[test]
    fn test_feed_bytes_stops_after_first_packet() {
        let bytes = [0xD0, 0, 0xD0, 0];
        let mut parser = PacketParser::new();
        let (used, result) = parser.feed_bytes(&bytes);
        assert_eq!(used, 2);
        assert_eq!(result, Ok(Some(Incoming::PingResp)));
        let (used, result) = parser.feed_bytes(&bytes[2..]);
        assert_eq!(used, 2);
        assert_eq!(result, Ok(Some(Incoming::PingResp)));
    }

    #[test]
    fn test_split_delivery() {
        let mut buffer = [0u8; 64];
        let len = encode_publish("a", b"payload", false, &mut buffer).unwrap();

        let mut parser = PacketParser::new();
        let mut found = None;
        for chunk in buffer[..len].chunks(3) {
            let (_, result) = parser.feed_bytes(chunk);
            if let Some(packet) = result.unwrap() {
                found = Some(packet);
            }
        }
        assert!(matches!(found, Some(Incoming::Publish(_))));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parser_reads_back_any_publish(
                topic in "[a-z/]{1,40}",
                payload in proptest::collection::vec(any::<u8>(), 0..MAX_INBOUND_PAYLOAD),
                retain in any::<bool>(),
            ) {
                let mut buffer = [0u8; 1024];
                let len = encode_publish(&topic, &payload, retain, &mut buffer).unwrap();

                let mut parser = PacketParser::new();
                let (used, result) = parser.feed_bytes(&buffer[..len]);
                prop_assert_eq!(used, len);
                match result {
                    Ok(Some(Incoming::Publish(p))) => {
                        prop_assert_eq!(p.topic.as_str(), topic.as_str());
                        prop_assert_eq!(p.payload.as_slice(), payload.as_slice());
                        prop_assert_eq!(p.retain, retain);
                    }
                    other => prop_assert!(false, "unexpected {:?}", other),
                }
            }
        }
    }
}
