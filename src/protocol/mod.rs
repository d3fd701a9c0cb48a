//! High-level components of the NMEA 2000 protocol: network management,
//! reflective message decoding, CAN/Fast Packet/ISO Transport, pseudo-0183
//! framing, and the envelope types the router core moves between them.
pub mod iso_transport;
pub mod managment;
pub mod messages;
pub mod sentence0183;
pub mod transport;
