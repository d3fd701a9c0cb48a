//! Plain Rust types mirroring the RPC surface described in §6: a future
//! transport binding can adopt these unchanged. This crate does not open
//! sockets or implement the push/pull/console services themselves — only
//! the serializable message shapes a peer in any language would exchange.
use serde::{Deserialize, Serialize};

/// Raw NMEA2000 frame payload, as carried by `pushNMEA2K`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcNmea2000 {
    pub pgn: u32,
    pub priority: u8,
    pub sa: u8,
    pub da: u8,
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

/// Raw NMEA0183 sentence, as carried inside a `oneof NmeaMsg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcNmea0183 {
    pub talker: String,
    pub formatter: String,
    pub timestamp: u64,
    pub values: Vec<String>,
    pub raw: Vec<u8>,
}

/// Decoded NMEA2000 message, as carried by `pushDecodedNMEA2K`.
///
/// `payload` is a JSON value here rather than the wire's `Any-of-PGN-record`
/// union: a transport binding generates the concrete per-PGN message types
/// from the PGN dictionary, and this crate's reflective `DecodedFields`
/// already serializes to an equivalent field-map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcNmea2000Decoded {
    pub pgn: u32,
    pub priority: u8,
    pub sa: u8,
    pub da: u8,
    pub timestamp: u64,
    pub manufacturer_id: Option<u16>,
    pub payload: serde_json::Value,
}

/// `oneof NmeaMsg { N2K | N0183 }` plus the monotonic `msg_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RpcNmeaPayload {
    N2k(RpcNmea2000),
    N0183(RpcNmea0183),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcNmeaMsg {
    pub msg_id: u64,
    #[serde(flatten)]
    pub payload: RpcNmeaPayload,
}

/// Response to any push-service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcAck {
    pub ok: bool,
}

/// `status(Cmd) → Resp` / `ReadNmea2000Msg(ReadReq)` source/PGN filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcReadRequest {
    #[serde(default)]
    pub select_sources: Vec<u8>,
    #[serde(default)]
    pub reject_sources: Vec<u8>,
    #[serde(default)]
    pub select_pgn: Vec<u32>,
    #[serde(default)]
    pub reject_pgn: Vec<u32>,
}

/// Development state of a coupler as surfaced through the console service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleDevState {
    NotReady,
    Open,
    Connected,
    Active,
}

/// One row of the console's coupler enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleCouplerStatus {
    pub name: String,
    pub class: String,
    pub state: String,
    pub dev_state: ConsoleDevState,
    pub protocol: String,
    pub msg_in: u64,
    pub msg_out: u64,
    pub input_rate: f64,
    pub output_rate: f64,
    pub error: Option<String>,
}

/// `ServerCmd`: the console's control vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ConsoleServerCommand {
    Stop,
    StartCoupler { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleServerStatus {
    pub couplers: Vec<ConsoleCouplerStatus>,
    pub uptime_secs: u64,
}
