//! Public traits exposed by the codec engine. They decouple the reflective
//! `DecodedFields` record from the serialization/deserialization logic and
//! provide a uniform API to upper layers.
use crate::core::PgnValue;
use crate::error::{DeserializationError, SerializationError};

//==================================================================================PGN_DATA
/// Implemented by any PGN value record the sending path (address manager,
/// supervisor handle, `PgnSender`) can serialize without knowing its concrete
/// shape. [`crate::protocol::messages::DecodedFields`] carries its own
/// descriptor so it can implement this without a generic `from_payload`
/// (decoding a reflective record requires the descriptor up front; see
/// `DecodedFields::decode`).
pub trait PgnData: FieldAccess {
    /// Serialize the instance into the provided buffer.
    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, SerializationError>;
}
//==================================================================================FIELD_ACCESS
/// Trait that lets the engine access PGN fields by identifier without knowing
/// the concrete type. Implemented by [`crate::protocol::messages::DecodedFields`]
/// for the reflective dictionary-driven path.
///
/// # Regular fields vs repeating fields
///
/// NMEA 2000 PGNs may contain:
/// - **Regular fields** accessible through `field()` and `field_mut()`
/// - **Repeating field sets**, groups repeated N times and accessed through
///   `repetitive_field()` / `repetitive_field_mut()`
///
/// ## Example: PGN 129029 (GNSS Position Data)
///
/// Contains regular fields (date, time, latitude, …) and a repeating group of
/// reference stations (`reference_station_id`, `age_of_dgnss_corrections`).
pub trait FieldAccess {
    /// Read the value of a regular (non-repeating) field.
    ///
    /// * `id` - Field identifier (e.g. `"Date"`, `"Latitude"`)
    ///
    /// Returns `Some(PgnValue)` if the field exists, `None` otherwise.
    fn field(&self, id: &str) -> Option<PgnValue>;

    /// Write the value of a regular (non-repeating) field.
    ///
    /// Returns `Some(())` on success, `None` if the field does not exist.
    fn field_mut(&mut self, id: &str, value: PgnValue) -> Option<()>;

    //==================== Repeating field helpers ====================

    /// Read a field inside a repeating group.
    ///
    /// Default implementation returns `None` (PGNs without repeating fields).
    fn repetitive_field(&self, _array_id: &str, _index: usize, _field_id: &str) -> Option<PgnValue> {
        None
    }

    /// Write a field in a repeating group.
    ///
    /// Invariant: `index` must be strictly less than `repetitive_count()`.
    ///
    /// Default implementation returns `None` (PGNs without repeating fields).
    fn repetitive_field_mut(
        &mut self,
        _array_id: &str,
        _index: usize,
        _field_id: &str,
        _value: PgnValue,
    ) -> Option<()> {
        None
    }

    /// Get the number of valid elements in a repeating array.
    ///
    /// Invariant: the value must always be ≤ `max_repetitions` defined by the descriptor.
    ///
    /// Default implementation returns `None` (PGNs without repeating fields).
    fn repetitive_count(&self, _array_id: &str) -> Option<usize> {
        None
    }

    /// Set the number of valid entries in a repeating array.
    ///
    /// Safety: implementers must ensure `count` never exceeds `max_repetitions`.
    ///
    /// Default implementation returns `None` (PGNs without repeating fields).
    fn set_repetitive_count(&mut self, _array_id: &str, _count: usize) -> Option<()> {
        None
    }
}
//==================================================================================TO_PAYLOAD
/// Serialize a data structure into a sequence of bytes.
pub trait ToPayload {
    /// Serialize the structure into the provided buffer, returning the byte count written.
    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, SerializationError>;
    /// Maximum serialized payload length for this structure.
    fn payload_len(&self) -> usize;
}
//==================================================================================FROM_PAYLOAD
/// Deserialize a sequence of bytes into a data structure.
pub trait FromPayload: Sized {
    /// Deserialize a byte slice to produce a new instance.
    fn from_payload(bytes_slice: &[u8]) -> Result<Self, DeserializationError>;
}
