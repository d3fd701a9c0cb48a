//! Reflective PGN record. Rather than a hand-written (or build-time
//! generated) struct per PGN, [`DecodedFields`] carries a cloned
//! [`PgnDescriptor`] alongside a map of decoded values and implements
//! [`FieldAccess`] against that descriptor — the same trait the codec engine
//! drives for any record. This is what lets `infra::codec::engine` stay
//! descriptor-driven end to end: dictionary in, `DecodedFields` out.
use std::collections::HashMap;

use crate::core::{FieldKind, PgnDescriptor, PgnValue};
use crate::error::{DeserializationError, SerializationError};
use crate::infra::codec::engine;
use crate::infra::codec::traits::{FieldAccess, PgnData};

/// A single repeated element within a repeating field set: field id -> value.
pub type RepeatingElement = HashMap<String, PgnValue>;

/// A decoded (or not-yet-encoded) instance of a PGN, keyed by its dictionary descriptor.
#[derive(Debug, Clone)]
pub struct DecodedFields {
    descriptor: PgnDescriptor,
    values: HashMap<String, PgnValue>,
    repeating: HashMap<String, Vec<RepeatingElement>>,
}

impl DecodedFields {
    /// Start an empty record for the given descriptor, ready to be populated
    /// field by field before serialization.
    pub fn empty(descriptor: PgnDescriptor) -> Self {
        let repeating = descriptor
            .repeating_field_sets
            .iter()
            .map(|rfs| (rfs.array_id.clone(), Vec::new()))
            .collect();
        Self {
            descriptor,
            values: HashMap::new(),
            repeating,
        }
    }

    /// Decode a raw payload against a descriptor, producing a populated record.
    pub fn decode(descriptor: PgnDescriptor, payload: &[u8]) -> Result<Self, DeserializationError> {
        let mut fields = Self::empty(descriptor);
        let descriptor_copy = fields.descriptor.clone();
        engine::deserialize_into(&mut fields, payload, &descriptor_copy)?;
        Ok(fields)
    }

    /// The PGN this record was decoded from / will be encoded as.
    pub fn pgn(&self) -> u32 {
        self.descriptor.id
    }

    /// Borrow the backing descriptor (field layout, repeating groups, priority…).
    pub fn descriptor(&self) -> &PgnDescriptor {
        &self.descriptor
    }
}

impl FieldAccess for DecodedFields {
    fn field(&self, id: &str) -> Option<PgnValue> {
        self.values.get(id).cloned()
    }

    fn field_mut(&mut self, id: &str, value: PgnValue) -> Option<()> {
        self.values.insert(id.to_string(), value);
        Some(())
    }

    fn repetitive_field(&self, array_id: &str, index: usize, field_id: &str) -> Option<PgnValue> {
        self.repeating.get(array_id)?.get(index)?.get(field_id).cloned()
    }

    fn repetitive_field_mut(
        &mut self,
        array_id: &str,
        index: usize,
        field_id: &str,
        value: PgnValue,
    ) -> Option<()> {
        let elements = self.repeating.get_mut(array_id)?;
        let element = elements.get_mut(index)?;
        element.insert(field_id.to_string(), value);
        Some(())
    }

    fn repetitive_count(&self, array_id: &str) -> Option<usize> {
        Some(self.repeating.get(array_id)?.len())
    }

    fn set_repetitive_count(&mut self, array_id: &str, count: usize) -> Option<()> {
        let elements = self.repeating.get_mut(array_id)?;
        elements.resize_with(count, RepeatingElement::new);
        Some(())
    }
}

impl PgnData for DecodedFields {
    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        engine::serialize(self, buffer, &self.descriptor)
    }
}

/// Canonical in-process representation of a message moving through the
/// router: either a decoded NMEA2000 PGN, a raw byte-for-byte copy of one,
/// or a pseudo/real NMEA 0183 sentence.
#[derive(Debug, Clone)]
pub enum Envelope {
    /// PGN reassembled (Fast Packet/ISO Transport) and reflectively decoded.
    Decoded2000 {
        pgn: u32,
        source: u8,
        destination: Option<u8>,
        priority: u8,
        fields: DecodedFields,
    },
    /// PGN whose raw payload is kept as-is (dictionary miss, or the host
    /// configured pass-through for this PGN class).
    Raw2000 {
        pgn: u32,
        source: u8,
        destination: Option<u8>,
        priority: u8,
        payload: Vec<u8>,
    },
    /// NMEA 0183 sentence (real hardware, or translated from a 2000 PGN).
    Sentence0183 { talker: String, sentence: String },
}

impl Envelope {
    pub fn pgn(&self) -> Option<u32> {
        match self {
            Envelope::Decoded2000 { pgn, .. } | Envelope::Raw2000 { pgn, .. } => Some(*pgn),
            Envelope::Sentence0183 { .. } => None,
        }
    }
}

/// Field kind not yet supported is surfaced through this helper rather than
/// silently dropping a field; kept distinct from other engine errors so
/// callers can choose to fall back to [`Envelope::Raw2000`].
pub fn is_unsupported(err: &DeserializationError) -> bool {
    matches!(
        err,
        DeserializationError::UnsupportedFieldKind { field_kind: FieldKind::Unimplemented }
            | DeserializationError::NotImplemented
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::PgnDictionary;

    #[test]
    fn decode_and_reencode_vessel_heading_round_trips() {
        let dict = PgnDictionary::bundled().unwrap();
        let descriptor = dict.lookup_pgn(127250).unwrap().clone();

        let mut fields = DecodedFields::empty(descriptor.clone());
        fields.field_mut("Sid", PgnValue::U8(7));
        fields.field_mut("Heading", PgnValue::F32(1.234));
        fields.field_mut("Deviation", PgnValue::F32(-0.1));
        fields.field_mut("Variation", PgnValue::F32(0.05));
        fields.field_mut("Reference", PgnValue::U8(1));

        let mut buffer = [0u8; 8];
        let len = fields.to_payload(&mut buffer).unwrap();
        assert_eq!(len, 8);

        let decoded = DecodedFields::decode(descriptor, &buffer).unwrap();
        assert_eq!(decoded.field("Sid"), Some(PgnValue::U8(7)));
        match decoded.field("Heading") {
            Some(PgnValue::F32(v)) => assert!((v - 1.234).abs() < 0.001),
            other => panic!("unexpected heading value: {other:?}"),
        }
    }

    #[test]
    fn decode_repeating_group_gnss_sats_in_view() {
        let dict = PgnDictionary::bundled().unwrap();
        let descriptor = dict.lookup_pgn(129540).unwrap().clone();

        let mut fields = DecodedFields::empty(descriptor.clone());
        fields.field_mut("Sid", PgnValue::U8(1));
        fields.field_mut("RangeResidualMode", PgnValue::U8(0));
        fields.set_repetitive_count("Satellites", 2);
        fields.repetitive_field_mut("Satellites", 0, "PrnNumber", PgnValue::U8(3));
        fields.repetitive_field_mut("Satellites", 1, "PrnNumber", PgnValue::U8(9));

        assert_eq!(fields.repetitive_count("Satellites"), Some(2));
        assert_eq!(
            fields.repetitive_field("Satellites", 1, "PrnNumber"),
            Some(PgnValue::U8(9))
        );
        let _ = descriptor;
    }
}
