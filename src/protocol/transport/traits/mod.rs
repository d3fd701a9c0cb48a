//! Abstraction traits used by the transport layer (CAN bus, timer, and PGN sender).
pub mod can_bus;
pub mod korri_timer;
pub mod pgn_sender;
