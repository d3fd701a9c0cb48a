//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (CAN ID construction,
//! address management, serialization/deserialization, etc.), and all of them
//! ultimately convert into the crate-wide [`RouterError`] at the boundaries
//! where the router core talks to couplers, publishers and the dictionary.
use crate::core::{FieldKind, PgnValue};
use thiserror::Error;

#[derive(Error, Debug)]
/// Errors that can occur while building a 29-bit CAN identifier.
pub enum CanIdBuildError {
    /// Provided parameters do not produce a valid identifier.
    #[error("Invalid data")]
    InvalidData,
    /// The destination address violates protocol constraints.
    #[error("Invalid destination")]
    InvalidDestination,
    /// Attempt to build a broadcast message (PDU2) with PF < 240.
    #[error("Invalid for broadcast message: PF is too low")]
    InvalidForBroadcast,
    /// Attempt to send an addressed message (PDU1) with PF ≥ 240.
    #[error("Invalid for addressed message: PF is too high: {pgn}")]
    InvalidForFocusedMessage { pgn: u8 },
    /// In PDU1 the lower 8 bits of the PGN must remain zero.
    #[error("PDU1 PGNs require PS = 0")]
    PsFocusMessageMustBeNull,
    /// No payload available to build the frame.
    #[error("Payload is empty: unable to build")]
    EmptyPayload,
}

#[derive(Error, Debug)]
/// Errors encountered while claiming or defending an address.
pub enum ClaimError<E: std::fmt::Debug> {
    /// CAN bus rejected the frame during transmission.
    #[error("CAN bus send error: {0:?}")]
    SendError(E),

    /// Unable to receive frames from the bus.
    #[error("CAN bus receive error: {0:?}")]
    ReceiveError(E),

    /// Another node claimed the same address with a higher-priority NAME.
    #[error("Network conflict")]
    NetworkConflict,

    /// No free address was available on the segment.
    #[error("No address available")]
    NoAddressAvailable,

    /// The received frame does not match the expected format.
    #[error("Invalid incoming frame")]
    InvalidIncomingFrame,

    /// Payload length is incompatible with the PGN definition.
    #[error("Invalid data length")]
    InvalidDataLen,

    /// Generic error propagated from the CAN layer.
    #[error("CAN bus error")]
    CanBusError,

    /// Failed to gather the information required to claim an address.
    #[error("Request address claim error")]
    RequestAddressClaimErr,

    /// Two local CAs were configured to contest the same NAME on this node.
    #[error("Local CA configuration conflict for NAME {name}")]
    LocalConfigConflict { name: u64 },

    /// Failed to extract business data.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Unable to build the CAN identifier.
    #[error(transparent)]
    BuildErr(#[from] CanIdBuildError),
}

#[derive(Debug, Error)]
/// Failures while extracting information from a raw CAN frame.
pub enum ExtractionError {
    /// The frame does not conform to the NMEA 2000 specification.
    #[error("Invalid incoming N2K frame")]
    InvalidIncomingFrame,
    /// Payload length does not match the PGN descriptor.
    #[error("Invalid data length for PGN")]
    InvalidDataLen,
}

//================================================================================CODEC_ERROR

#[derive(Debug, Error)]
/// Issues encountered while serializing a PGN into a buffer.
pub enum SerializationError {
    /// Provided buffer is too small for the payload.
    #[error("Buffer too small")]
    BufferTooSmall,
    /// Data does not satisfy the descriptor constraints.
    #[error("Invalid data")]
    InvalidData,
    /// Dictionary descriptor declares a malformed repeating PGN definition.
    #[error("Invalid repetitive PGN definition for {data}")]
    RepeatitiveError { data: u32 },
    /// Field length is not an acceptable bit multiple.
    #[error("Invalid field bit length for {field_name}")]
    InvalidFieldBits { field_name: String },
    /// Failed while writing bits into the output buffer.
    #[error("BitWrite error: {err}")]
    BitWriteError { err: BitWriterError },
    /// Field type not supported by the serialization engine.
    #[error("Unsupported field kind")]
    UnsupportedFieldKind,
    /// Expected field was missing from the domain structure.
    #[error("Field {field_id} not found")]
    FieldNotFound { field_id: String },
    /// Generic conversion error bubbling up from the codec module.
    #[error("Codec Error: {source}")]
    CodecError { source: CodecError },
}

#[derive(Error, Debug)]
/// Errors raised while deserializing a CAN buffer into a PGN structure.
pub enum DeserializationError {
    /// Payload size does not match the expected schema.
    #[error("Invalid data length")]
    InvalidDataLength,
    /// Bits read from the buffer cannot be interpreted according to the descriptor.
    #[error("Malformed data")]
    MalformedData,
    /// Feature not implemented for this PGN yet.
    #[error("Functionality not implemented for this PGN")]
    NotImplemented,
    /// Indirect field depends on a lookup table that is missing.
    #[error("Missing Indirect Lookup Reference for descriptor {desc}: {pgn}")]
    MissingIndirectLookupRef { desc: u32, pgn: String },
    /// Dependent field is missing or was not populated.
    #[error("Dependency field not found {dep} for pgn {desc}")]
    DependencyFieldNotFound { dep: String, desc: u32 },
    /// Field kind not supported by the parser.
    #[error("Unsupported field kind {field_kind:?}")]
    UnsupportedFieldKind { field_kind: FieldKind },
    /// Could not assign value into the target structure.
    #[error("Field assignment failed {desc}")]
    FieldAssignmentFailed { desc: String },
    /// Field descriptor defines an invalid bit length.
    #[error("Invalid field bit length for {field_name}")]
    InvalidFieldBits { field_name: String },
    /// Error bubbled up from the generic codec engine.
    #[error("Codec Error: {source}")]
    CodecError { source: CodecError },
    /// Bit-level access on the buffer failed (out of bounds, misalignment…).
    #[error("BitReader error: {err}")]
    BitReaderError { err: BitReaderError },
}

#[derive(Error, Debug)]
/// Shared error abstraction for conversion helpers.
pub enum CodecError {
    /// Value type is incompatible with the algorithm.
    #[error("Data type mismatch for value {value:?}, function: {func}")]
    DataTypeMismatch { value: PgnValue, func: &'static str },
}

//==================================================================================SEND_ERROR
#[derive(Debug, Error)]
/// Errors encountered when sending a PGN (build + transmit).
pub enum SendPgnError<E: std::fmt::Debug> {
    /// PGN serialization failed.
    #[error("Serialization failed")]
    Serialization,
    /// CAN identifier could not be built.
    #[error("Frame build failed: {0:?}")]
    Build(CanIdBuildError),
    /// CAN layer refused or failed to send the frame.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
}

//==================================================================================BITREADER_ERRORS
#[derive(Debug, Error)]
/// Errors raised during bitwise buffer reads.
pub enum BitReaderError {
    /// Attempted to read past the end of the buffer.
    #[error("Attempted to read out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Requested more bits than the target type can hold.
    #[error("Cannot read more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
    /// Cursor is not aligned on a byte boundary when required.
    #[error("Non aligned bit. Cursor: {cursor}")]
    NonAlignedBit { cursor: usize },
}
//==================================================================================BITWRITER_ERRORS
#[derive(Debug, Error)]
/// Errors raised during bitwise writes into a buffer.
pub enum BitWriterError {
    /// Attempted to write beyond the provided capacity.
    #[error("Attempted to write out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Field is too large for the provided type.
    #[error("Cannot write more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
    /// Cursor is not aligned on a byte boundary when the operation requires it.
    #[error("Non aligned bit. Cursor: {cursor}")]
    NonAlignedBit { cursor: usize },
}

//==================================================================================DICTIONARY_ERROR
#[derive(Debug, Error)]
/// Errors raised while loading or validating a PGN dictionary document.
pub enum DictionaryLoadError {
    /// The document could not be parsed as JSON.
    #[error("Dictionary JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Two entries declare the same PGN.
    #[error("Duplicate PGN {pgn} in dictionary")]
    DuplicatePgn { pgn: u32 },
    /// A field referenced an indirect/direct lookup table that is not present.
    #[error("Unknown enumeration {enum_name} referenced by PGN {pgn}")]
    UnknownEnum { enum_name: String, pgn: u32 },
    /// A field's bit range overlaps another field in the same PGN.
    #[error("Field {field_id} overlaps another field in PGN {pgn}")]
    FieldOverlap { field_id: String, pgn: u32 },
}

//==================================================================================ISO_TRANSPORT_ERROR
#[derive(Debug, Error)]
/// Errors raised while building or parsing TP.CM (PGN 60416) control frames
/// and TP.DT (PGN 60160) data frames.
pub enum IsoTransportError {
    /// First byte of a TP.CM frame does not match a known control message.
    #[error("unknown TP.CM control byte {control_byte}")]
    UnknownControlByte { control_byte: u8 },
    /// Payload is empty or exceeds the 1785-byte ISO Transport limit.
    #[error("invalid ISO Transport payload length {len}")]
    InvalidPayloadLength { len: usize },
    /// Unable to build the CAN identifier carrying the control or data frame.
    #[error(transparent)]
    CanId(#[from] CanIdBuildError),
}

//==================================================================================SENTENCE0183_ERROR
#[derive(Debug, Error)]
/// Errors raised while decoding a pseudo-0183 sentence (`!PDGY`, `!PGNST`,
/// `$MXPGN`) into a [`crate::protocol::sentence0183::Raw2000`] frame.
pub enum Sentence0183Error {
    /// Line does not start with `!` or `$`.
    #[error("sentence is missing its leading ! or $")]
    MissingLeadCharacter,
    /// Line has no `*HH` checksum suffix.
    #[error("sentence is missing its *HH checksum")]
    MissingChecksum,
    /// Checksum suffix is not two hex digits.
    #[error("checksum suffix is not valid hex")]
    MalformedChecksum,
    /// Computed checksum does not match the one carried on the wire.
    #[error("checksum mismatch: expected {expected:02X}, computed {actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
    /// Sentence tag does not match the decoder being used.
    #[error("expected tag {expected}, got {got}")]
    WrongTag { expected: &'static str, got: String },
    /// A required comma-separated field is absent.
    #[error("missing field {field}")]
    MissingField { field: &'static str },
    /// A field could not be parsed as the expected integer type.
    #[error("malformed field {field}")]
    MalformedField { field: &'static str },
    /// Base64 or hex payload could not be decoded.
    #[error("malformed payload encoding")]
    MalformedPayload,
    /// `$MXPGN` attribute word DLC does not match the decoded payload length.
    #[error("DLC mismatch: declared {declared}, payload carries {actual} bytes")]
    DlcMismatch { declared: u8, actual: usize },
    /// Payload is too long to fit in a single CAN frame.
    #[error("payload too long for a single frame: {len} bytes")]
    PayloadTooLong { len: usize },
    /// Unable to build the CAN identifier for the recovered frame.
    #[error(transparent)]
    CanId(CanIdBuildError),
}

//==================================================================================CONFIG_ERROR
#[derive(Debug, Error)]
/// Configuration errors detected when a [`crate::config::RouterConfig`] is
/// assembled, before any I/O is attempted.
pub enum ConfigError {
    /// Two locally-hosted CAs were configured to claim the same NAME.
    #[error("two local CAs configured with colliding NAME {name}")]
    CollidingLocalName { name: u64 },
    /// A coupler or publisher name is referenced by a filter but does not exist.
    #[error("unknown endpoint {name} referenced by filter {filter}")]
    UnknownEndpoint { name: String, filter: String },
    /// A queue size or timeout value is out of the accepted range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

//==================================================================================ROUTER_ERROR
/// Crate-wide error type. Every narrower error above converts into this one
/// at the router-core boundary (coupler ingestion, publisher dispatch,
/// dictionary loading, address management).
#[derive(Debug, Error)]
pub enum RouterError {
    /// Dictionary could not be loaded at startup.
    #[error("dictionary load error: {0}")]
    Dictionary(#[from] DictionaryLoadError),

    /// Configuration is invalid before any coupler or publisher is started.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A coupler or publisher failed to open its underlying transport.
    #[error("endpoint {name} failed to open: {source}")]
    EndpointOpenFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Transient I/O failure on an already-open endpoint; the coupler/publisher
    /// supervisor retries with backoff rather than treating this as fatal.
    #[error("transient I/O error on {name}: {source}")]
    TransientIo {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A Fast Packet or ISO Transport reassembly timed out.
    #[error("reassembly timeout for PGN {pgn} from source {source_addr}")]
    ReassemblyTimeout { pgn: u32, source_addr: u8 },

    /// ISO Transport control or data frame could not be built or parsed.
    #[error("ISO transport error: {0}")]
    IsoTransport(#[from] IsoTransportError),

    /// A pseudo-0183 sentence could not be decoded or re-encoded.
    #[error("sentence decoding error: {0}")]
    Sentence0183(#[from] Sentence0183Error),

    /// Two different senders contend for the same reassembly session.
    #[error("device conflict reassembling PGN {pgn}: frame from {got} while expecting {expected}")]
    DeviceConflict { pgn: u32, expected: u8, got: u8 },

    /// A publisher's bounded queue overflowed past its configured policy.
    #[error("publisher {name} queue overflow, {lost} envelopes dropped")]
    QueueOverflow { name: String, lost: u64 },

    /// Local address claim could not complete (segment exhausted or lost every contest).
    #[error("unable to claim an address for NAME {name}")]
    CannotClaim { name: u64 },

    /// A PGN could not be encoded from its decoded representation.
    #[error("encode error: {0}")]
    Encode(#[from] SerializationError),

    /// A PGN payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DeserializationError),

    /// CAN identifier construction failed.
    #[error("CAN id build error: {0}")]
    CanId(#[from] CanIdBuildError),

    /// Frame-layer extraction failed.
    #[error("frame extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Generic codec-layer conversion error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Catch-all I/O error not otherwise classified.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
