//! `korri-router`: NMEA2000/J1939 protocol stack and in-process routing
//! fabric for marine telemetry gateways. The crate exposes the frame-level
//! primitives (CAN identifiers, Fast Packet and ISO Transport reassembly,
//! address claiming), a runtime-loaded PGN dictionary with a reflective
//! decoder, and the router core that moves envelopes between couplers,
//! publishers and filters.
//==================================================================================
/// Core data types shared by the PGN dictionary and the codec engine.
pub mod core;
/// Crate-wide configuration value types.
pub mod config;
/// PGN dictionary: runtime-loaded descriptors and the lookup index built from them.
pub mod dictionary;
/// Domain and low-level errors (CAN identifier construction, serialization,
/// deserialization, dictionary loading, and related issues).
pub mod error;
/// Representation of a raw NMEA 2000 frame as it is read from the CAN bus.
pub mod infra;
/// NMEA 2000 protocol implementation: CAN transport, fast packets, ISO
/// transport, address management, and reflective message decoding.
pub mod protocol;
/// Router core: coupler/publisher lifecycle, envelope fan-out, filters.
pub mod router;
/// Wire-exact RPC surface types (push/pull/console), transport not included.
pub mod rpc;
//==================================================================================
