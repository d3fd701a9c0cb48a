//! Pseudo-NMEA0183 framing used to carry raw or decoded NMEA 2000 frames
//! over a text-oriented transport (serial line, TCP stream): `!PDGY`,
//! `!PGNST` and the Shipmodul `$MXPGN` sentence, all terminated by `<CR><LF>`
//! with a trailing `*HH` XOR checksum over everything between `!`/`$` and `*`.
use crate::error::Sentence0183Error;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;

/// A CAN frame recovered from a pseudo-0183 sentence, ready for the router
/// to treat exactly like a frame read off a physical bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw2000 {
    pub pgn: u32,
    pub priority: u8,
    pub source_address: u8,
    pub destination: u8,
    pub timestamp_ms: u64,
    pub payload: Vec<u8>,
}

impl Raw2000 {
    /// Rebuilds a [`CanFrame`] suitable for the Fast Packet/ISO Transport
    /// reassemblers, discarding the pseudo-0183 timestamp.
    pub fn to_can_frame(&self) -> Result<CanFrame, Sentence0183Error> {
        if self.payload.len() > 8 {
            return Err(Sentence0183Error::PayloadTooLong { len: self.payload.len() });
        }
        let mut builder = CanId::builder(self.pgn, self.source_address).with_priority(self.priority);
        if self.destination != 255 {
            builder = builder.to_destination(self.destination);
        }
        let id = builder.build().map_err(Sentence0183Error::CanId)?;
        let mut data = [0xFFu8; 8];
        data[..self.payload.len()].copy_from_slice(&self.payload);
        Ok(CanFrame { id, data, len: self.payload.len() })
    }
}

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, byte| acc ^ byte)
}

/// Splits a line on its trailing `*HH` checksum and verifies it, returning
/// the body (without the leading `!`/`$` and without the checksum suffix).
fn strip_and_verify_checksum(line: &str) -> Result<&str, Sentence0183Error> {
    let line = line.trim_end_matches(['\r', '\n']);
    let body_with_prefix = line
        .strip_prefix('!')
        .or_else(|| line.strip_prefix('$'))
        .ok_or(Sentence0183Error::MissingLeadCharacter)?;

    let star = body_with_prefix
        .rfind('*')
        .ok_or(Sentence0183Error::MissingChecksum)?;
    let (body, checksum_hex) = body_with_prefix.split_at(star);
    let checksum_hex = &checksum_hex[1..];

    let expected = u8::from_str_radix(checksum_hex, 16)
        .map_err(|_| Sentence0183Error::MalformedChecksum)?;
    let actual = xor_checksum(body.as_bytes());
    if actual != expected {
        return Err(Sentence0183Error::ChecksumMismatch { expected, actual });
    }
    Ok(body)
}

fn append_checksum(body: &str) -> String {
    let checksum = xor_checksum(body.as_bytes());
    format!("{body}*{checksum:02X}\r\n")
}

//==================================================================================PDGY
/// Decodes a `!PDGY,<pgn>,<priority>,<sa>,<da>,<timestamp_ms>,<base64>*HH` line.
pub fn decode_pdgy(line: &str) -> Result<Raw2000, Sentence0183Error> {
    let body = strip_and_verify_checksum(line)?;
    let mut fields = body.split(',');
    let tag = fields.next().ok_or(Sentence0183Error::MissingField { field: "tag" })?;
    if tag != "PDGY" {
        return Err(Sentence0183Error::WrongTag { expected: "PDGY", got: tag.to_string() });
    }
    let pgn = next_u32(&mut fields, "pgn")?;
    let priority = next_u8(&mut fields, "priority")?;
    let source_address = next_u8(&mut fields, "sa")?;
    let destination = next_u8(&mut fields, "da")?;
    let timestamp_ms = next_u64(&mut fields, "timestamp_ms")?;
    let encoded = fields.next().ok_or(Sentence0183Error::MissingField { field: "payload" })?;
    use base64::Engine;
    let payload = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| Sentence0183Error::MalformedPayload)?;

    Ok(Raw2000 { pgn, priority, source_address, destination, timestamp_ms, payload })
}

/// Encodes a [`Raw2000`] as a `!PDGY` sentence, including the trailing checksum.
pub fn encode_pdgy(frame: &Raw2000) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&frame.payload);
    let body = format!(
        "PDGY,{},{},{},{},{},{}",
        frame.pgn, frame.priority, frame.source_address, frame.destination, frame.timestamp_ms, encoded
    );
    append_checksum(&body)
}

//==================================================================================PGNST
/// Decodes a `!PGNST,<pgn>,<priority>,<sa>,<da>,<timestamp_ms>,<hex>*HH` line.
pub fn decode_pgnst(line: &str) -> Result<Raw2000, Sentence0183Error> {
    let body = strip_and_verify_checksum(line)?;
    let mut fields = body.split(',');
    let tag = fields.next().ok_or(Sentence0183Error::MissingField { field: "tag" })?;
    if tag != "PGNST" {
        return Err(Sentence0183Error::WrongTag { expected: "PGNST", got: tag.to_string() });
    }
    let pgn = next_u32(&mut fields, "pgn")?;
    let priority = next_u8(&mut fields, "priority")?;
    let source_address = next_u8(&mut fields, "sa")?;
    let destination = next_u8(&mut fields, "da")?;
    let timestamp_ms = next_u64(&mut fields, "timestamp_ms")?;
    let hex_payload = fields.next().ok_or(Sentence0183Error::MissingField { field: "payload" })?;
    let payload = hex::decode(hex_payload).map_err(|_| Sentence0183Error::MalformedPayload)?;

    Ok(Raw2000 { pgn, priority, source_address, destination, timestamp_ms, payload })
}

/// Encodes a [`Raw2000`] as a `!PGNST` sentence, including the trailing checksum.
pub fn encode_pgnst(frame: &Raw2000) -> String {
    let body = format!(
        "PGNST,{},{},{},{},{},{}",
        frame.pgn,
        frame.priority,
        frame.source_address,
        frame.destination,
        frame.timestamp_ms,
        hex::encode_upper(&frame.payload)
    );
    append_checksum(&body)
}

//==================================================================================MXPGN
/// Attribute word layout of `$MXPGN`: DLC in bits 0-3, source address in
/// bits 4-11, priority in bits 12-14, "is send" flag in bit 15.
struct MxpgnAttributes {
    dlc: u8,
    source_address: u8,
    priority: u8,
}

impl MxpgnAttributes {
    fn from_word(word: u16) -> Self {
        Self {
            dlc: (word & 0x0F) as u8,
            source_address: ((word >> 4) & 0xFF) as u8,
            priority: ((word >> 12) & 0x07) as u8,
        }
    }

    fn to_word(&self) -> u16 {
        (self.dlc as u16 & 0x0F) | ((self.source_address as u16) << 4) | ((self.priority as u16) << 12)
    }
}

/// Decodes a `$MXPGN,<pgn-hex>,<attr-hex>,<hex>*HH` Shipmodul sentence. The
/// destination is always broadcast (255): Shipmodul adapters do not carry
/// a destination address in the attribute word.
pub fn decode_mxpgn(line: &str, timestamp_ms: u64) -> Result<Raw2000, Sentence0183Error> {
    let body = strip_and_verify_checksum(line)?;
    let mut fields = body.split(',');
    let tag = fields.next().ok_or(Sentence0183Error::MissingField { field: "tag" })?;
    if tag != "MXPGN" {
        return Err(Sentence0183Error::WrongTag { expected: "MXPGN", got: tag.to_string() });
    }
    let pgn_hex = fields.next().ok_or(Sentence0183Error::MissingField { field: "pgn" })?;
    let pgn = u32::from_str_radix(pgn_hex, 16).map_err(|_| Sentence0183Error::MalformedField { field: "pgn" })?;
    let attr_hex = fields.next().ok_or(Sentence0183Error::MissingField { field: "attributes" })?;
    let attr_word =
        u16::from_str_radix(attr_hex, 16).map_err(|_| Sentence0183Error::MalformedField { field: "attributes" })?;
    let attributes = MxpgnAttributes::from_word(attr_word);
    let hex_payload = fields.next().ok_or(Sentence0183Error::MissingField { field: "payload" })?;
    let payload = hex::decode(hex_payload).map_err(|_| Sentence0183Error::MalformedPayload)?;
    if payload.len() != attributes.dlc as usize {
        return Err(Sentence0183Error::DlcMismatch {
            declared: attributes.dlc,
            actual: payload.len(),
        });
    }

    Ok(Raw2000 {
        pgn,
        priority: attributes.priority,
        source_address: attributes.source_address,
        destination: 255,
        timestamp_ms,
        payload,
    })
}

/// Encodes a [`Raw2000`] as a `$MXPGN` sentence, including the trailing checksum.
pub fn encode_mxpgn(frame: &Raw2000) -> String {
    let attributes = MxpgnAttributes {
        dlc: frame.payload.len() as u8,
        source_address: frame.source_address,
        priority: frame.priority,
    };
    let body = format!(
        "MXPGN,{:05X},{:04X},{}",
        frame.pgn,
        attributes.to_word(),
        hex::encode_upper(&frame.payload)
    );
    append_checksum(&body)
}

fn next_u8<'a>(fields: &mut impl Iterator<Item = &'a str>, field: &'static str) -> Result<u8, Sentence0183Error> {
    fields
        .next()
        .ok_or(Sentence0183Error::MissingField { field })?
        .parse()
        .map_err(|_| Sentence0183Error::MalformedField { field })
}

fn next_u32<'a>(fields: &mut impl Iterator<Item = &'a str>, field: &'static str) -> Result<u32, Sentence0183Error> {
    fields
        .next()
        .ok_or(Sentence0183Error::MissingField { field })?
        .parse()
        .map_err(|_| Sentence0183Error::MalformedField { field })
}

fn next_u64<'a>(fields: &mut impl Iterator<Item = &'a str>, field: &'static str) -> Result<u64, Sentence0183Error> {
    fields
        .next()
        .ok_or(Sentence0183Error::MissingField { field })?
        .parse()
        .map_err(|_| Sentence0183Error::MalformedField { field })
}
