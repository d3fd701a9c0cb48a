//! Declarative configuration value types for the router: one `serde`-deriving
//! struct or enum per section named in the external interfaces, plus the
//! default port/timeout/queue-size constants referenced throughout. Parsing a
//! configuration document from disk, wiring CLI flags, and every kind of
//! transport server binding stay out of scope — these types are pure data for
//! an external loader to populate.
use serde::{Deserialize, Serialize};

/// `servers` section: a listening endpoint exposing an RPC or stream surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub class: String,
    pub port: u16,
    #[serde(default = "default_server_timeout_secs")]
    pub timeout_secs: u64,
}

/// `couplers` section: one adapter between an external device/bus and the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplerConfig {
    pub name: String,
    pub class: String,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_coupler_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_max_attempt")]
    pub max_attempt: u32,
    #[serde(default = "default_open_delay_ms")]
    pub open_delay_ms: u64,
    #[serde(default)]
    pub stop_system: bool,
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default)]
    pub trace: bool,
}

/// `publishers` section: a sink that receives routed messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub name: String,
    pub class: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_max_lost")]
    pub max_lost: u32,
    #[serde(default = "default_max_silent_secs")]
    pub max_silent_secs: u64,
    #[serde(default)]
    pub filter_select: bool,
    #[serde(default)]
    pub format: PublisherFormat,
    #[serde(default)]
    pub filters: Vec<String>,
}

/// Wire format a TCP-stream publisher serializes envelopes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherFormat {
    #[default]
    Transparent,
    Dyfmt,
    Stfmt,
}

/// `filters` section: one matching rule, applied to a publisher or connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub name: String,
    pub kind: FilterKind,
    pub action: FilterAction,
    #[serde(default)]
    pub talkers: Vec<String>,
    #[serde(default)]
    pub formatters: Vec<String>,
    #[serde(default)]
    pub source_addresses: Vec<u8>,
    #[serde(default)]
    pub pgns: Vec<u32>,
    #[serde(default)]
    pub manufacturer_ids: Vec<u16>,
    #[serde(default)]
    pub period_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Sentence0183,
    Pgn2000,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    Select,
    Discard,
}

/// `applications` section: a local CA registered on the bus (§4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    pub preferred_address: u8,
    pub name_value: u64,
}

/// `features` section: lazily-loaded optional subsystem, keyed by class name
/// (`can_interface`, `gnss`, `agent`, …). The external surface (the string in
/// `class`) must remain stable; this crate only carries the declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub class: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub options: std::collections::HashMap<String, String>,
}

/// Top-level configuration document: `servers`, `couplers`, `publishers`,
/// `services`, `filters`, `applications`, `features`, plus the globals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub servers: Vec<ServiceConfig>,
    #[serde(default)]
    pub couplers: Vec<CouplerConfig>,
    #[serde(default)]
    pub publishers: Vec<PublisherConfig>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
    #[serde(default)]
    pub features: Vec<FeatureConfig>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub manufacturer_xml: Option<String>,
    #[serde(default)]
    pub nmea2000_xml: Option<String>,
    #[serde(default)]
    pub debug_configuration: bool,
    #[serde(default)]
    pub decode_definition_only: bool,
}

fn default_server_timeout_secs() -> u64 {
    5
}
fn default_coupler_timeout_secs() -> u64 {
    10
}
fn default_baud_rate() -> u32 {
    4800
}
fn default_max_attempt() -> u32 {
    5
}
fn default_open_delay_ms() -> u64 {
    2_000
}
fn default_queue_size() -> usize {
    20
}
fn default_max_lost() -> u32 {
    5
}
fn default_max_silent_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

/// NMEA TCP server default port (§6).
pub const PORT_NMEA_TCP: u16 = 4500;
/// Shipmodul configuration passthrough default port (§6).
pub const PORT_SHIPMODUL_CONFIG: u16 = 4501;
/// RPC default port (§6).
pub const PORT_RPC: u16 = 4502;
/// NMEA sender default port (§6).
pub const PORT_NMEA_SENDER: u16 = 4503;
/// Energy RPC default port (§6).
pub const PORT_ENERGY_RPC: u16 = 4505;
/// Local agent RPC default port (§6).
pub const PORT_LOCAL_AGENT_RPC: u16 = 4506;
/// Data server RPC default port (§6).
pub const PORT_DATA_SERVER_RPC: u16 = 4508;

/// Default inter-message spacing enforced by the direct-CAN coupler (§4.9).
pub const DEFAULT_MIN_CAN_SPACING_MS: u64 = 5;
/// Default device-table expiry window (§4.6).
pub const DEFAULT_MAX_SILENT_SECS: u64 = 60;
/// Default bounded publisher queue capacity (§4.8).
pub const DEFAULT_PUBLISHER_QUEUE_SIZE: usize = 20;
/// Default consecutive-drop threshold before a publisher is stopped (§4.8).
pub const DEFAULT_MAX_LOST: u32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_config_defaults_are_empty_and_info_level() {
        let config: RouterConfig = serde_json::from_str("{}").unwrap();
        assert!(config.couplers.is_empty());
        assert!(config.publishers.is_empty());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn publisher_config_applies_documented_defaults() {
        let json = r#"{"name":"tcp-out","class":"tcp_stream","sources":["can0"]}"#;
        let publisher: PublisherConfig = serde_json::from_str(json).unwrap();
        assert_eq!(publisher.queue_size, DEFAULT_PUBLISHER_QUEUE_SIZE);
        assert_eq!(publisher.max_lost, DEFAULT_MAX_LOST);
        assert_eq!(publisher.max_silent_secs, 60);
        assert_eq!(publisher.format, PublisherFormat::Transparent);
    }

    #[test]
    fn filter_config_round_trips_through_json() {
        let filter = FilterConfig {
            name: "gps-only".to_string(),
            kind: FilterKind::Pgn2000,
            action: FilterAction::Select,
            talkers: vec![],
            formatters: vec![],
            source_addresses: vec![],
            pgns: vec![129_025, 129_029],
            manufacturer_ids: vec![],
            period_ms: None,
        };
        let json = serde_json::to_string(&filter).unwrap();
        let back: FilterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
    }
}
