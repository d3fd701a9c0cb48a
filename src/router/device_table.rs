//! Device table (C6): tracks every node the router has observed on the bus,
//! keyed by source address, and answers the ISO Requests a local node is
//! expected to service directly. Same Service/Handle/Runner split as
//! [`crate::router::publisher`]: a cheap handle every coupler feeds
//! observations into through [`crate::router::RouterHandle::route`], and a
//! runner that owns the periodic expiry sweep on its own task.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::{PgnBytes, PgnValue};
use crate::dictionary::PgnDictionary;
use crate::infra::codec::traits::FieldAccess;
use crate::protocol::messages::{DecodedFields, Envelope};

/// Default idle window before a device table entry expires.
pub const DEFAULT_MAX_SILENT: Duration = Duration::from_secs(60);

/// One tracked node.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub address: u8,
    pub name: u64,
    pub last_seen: Instant,
}

/// Change notification a subscriber receives through [`DeviceTableHandle::subscribe`].
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Added(DeviceRecord),
    /// A different NAME answered from the same address; the previous
    /// occupant is assumed to have left the bus.
    Changed(DeviceRecord),
    Expired(u8),
}

struct DeviceTableState {
    devices: HashMap<u8, DeviceRecord>,
    max_silent: Duration,
}

impl DeviceTableState {
    fn observe(&mut self, address: u8, name: Option<u64>, now: Instant) -> Option<DeviceEvent> {
        match self.devices.get_mut(&address) {
            Some(existing) => {
                existing.last_seen = now;
                match name {
                    Some(name) if name != existing.name => {
                        existing.name = name;
                        Some(DeviceEvent::Changed(existing.clone()))
                    }
                    _ => None,
                }
            }
            None => {
                let record = DeviceRecord { address, name: name.unwrap_or(0), last_seen: now };
                self.devices.insert(address, record.clone());
                Some(DeviceEvent::Added(record))
            }
        }
    }

    fn sweep(&mut self, now: Instant) -> Vec<DeviceEvent> {
        let max_silent = self.max_silent;
        let expired: Vec<u8> = self
            .devices
            .iter()
            .filter(|(_, record)| now.saturating_duration_since(record.last_seen) > max_silent)
            .map(|(address, _)| *address)
            .collect();
        for address in &expired {
            self.devices.remove(address);
        }
        expired.into_iter().map(DeviceEvent::Expired).collect()
    }

    fn contains(&self, address: u8) -> bool {
        self.devices.contains_key(&address)
    }
}

/// Cheap, cloneable entry point every coupler's traffic is observed through.
#[derive(Clone)]
pub struct DeviceTableHandle {
    state: Arc<Mutex<DeviceTableState>>,
    events: broadcast::Sender<DeviceEvent>,
}

impl DeviceTableHandle {
    /// Builds a handle plus the runner that must be spawned to drive expiry.
    pub fn new(max_silent: Duration) -> (Self, DeviceTableRunner) {
        let (tx, _rx) = broadcast::channel(64);
        let state = Arc::new(Mutex::new(DeviceTableState { devices: HashMap::new(), max_silent }));
        let handle = Self { state: state.clone(), events: tx.clone() };
        (handle, DeviceTableRunner { state, events: tx })
    }

    /// Subscribe to added/changed/expired events. Lagging receivers skip
    /// missed events rather than blocking the observer.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn contains(&self, address: u8) -> bool {
        self.state.lock().expect("device table state poisoned").contains(address)
    }

    /// Feed one routed envelope into the table. Every envelope with a source
    /// address refreshes that address's last-seen time; an Address Claim
    /// additionally records (or invalidates) the NAME occupying it.
    pub fn observe(&self, envelope: &Envelope) {
        let (address, name) = match envelope {
            Envelope::Decoded2000 { pgn: 60_928, source, fields, .. } => {
                (*source, fields.field("UniqueNumber").as_ref().and_then(PgnValue::as_u64))
            }
            Envelope::Decoded2000 { source, .. } | Envelope::Raw2000 { source, .. } => (*source, None),
            Envelope::Sentence0183 { .. } => return,
        };
        if let Some(event) = self
            .state
            .lock()
            .expect("device table state poisoned")
            .observe(address, name, Instant::now())
        {
            let _ = self.events.send(event);
        }
    }

    /// Run one expiry pass immediately; the runner calls this on its own
    /// ticker, exposed separately so tests can drive it deterministically.
    pub fn sweep_now(&self) {
        let expired = self.state.lock().expect("device table state poisoned").sweep(Instant::now());
        for event in expired {
            let _ = self.events.send(event);
        }
    }
}

/// Owns the periodic sweep; meant to be spawned as its own task.
pub struct DeviceTableRunner {
    state: Arc<Mutex<DeviceTableState>>,
    events: broadcast::Sender<DeviceEvent>,
}

impl DeviceTableRunner {
    pub async fn run(self, cancellation: CancellationToken) {
        let handle = DeviceTableHandle { state: self.state, events: self.events };
        let mut ticker = interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = ticker.tick() => handle.sweep_now(),
            }
        }
    }
}

/// Identity and product information a local CA answers ISO Requests with.
#[derive(Debug, Clone)]
pub struct LocalDeviceInfo {
    pub name: u64,
    pub source_address: u8,
    pub product_code: u16,
    pub model_id: String,
    pub software_version_code: String,
    pub model_version: String,
    pub model_serial_code: String,
    pub certification_level: u8,
    pub load_equivalency: u8,
    pub installation_description_1: String,
    pub installation_description_2: String,
    pub manufacturer_information: String,
    /// PGNs this node transmits, reported back on a PGN 126464 request.
    pub supported_pgns: Vec<u32>,
}

fn fixed_string(text: &str) -> PgnValue {
    let mut bytes = PgnBytes::default();
    bytes.copy_from_slice(text.as_bytes());
    PgnValue::Bytes(bytes)
}

/// Builds the reply to an ISO Request (PGN 59904) naming `requested_pgn`,
/// when that PGN is one a local CA answers directly: Address Claim (60928),
/// Product Information (126996) and Configuration Information (126998) come
/// from the bundled dictionary; the PGN List (126464) has no dictionary
/// entry and is built from its fixed wire layout directly, the same way
/// `network_discovering` hand-builds the ISO Request payload itself. `None`
/// means the requested PGN is not ours to answer.
pub fn respond_to_iso_request(
    requested_pgn: u32,
    destination: u8,
    local: &LocalDeviceInfo,
    dictionary: &PgnDictionary,
) -> Option<Envelope> {
    match requested_pgn {
        60_928 => {
            let descriptor = dictionary.lookup_pgn(60_928)?.clone();
            let mut fields = DecodedFields::empty(descriptor);
            fields.field_mut("UniqueNumber", PgnValue::U64(local.name));
            Some(Envelope::Decoded2000 {
                pgn: 60_928,
                source: local.source_address,
                destination: Some(destination),
                priority: 6,
                fields,
            })
        }
        126_996 => {
            let descriptor = dictionary.lookup_pgn(126_996)?.clone();
            let mut fields = DecodedFields::empty(descriptor);
            fields.field_mut("Nmea2000Version", PgnValue::U16(2100));
            fields.field_mut("ProductCode", PgnValue::U16(local.product_code));
            fields.field_mut("ModelId", fixed_string(&local.model_id));
            fields.field_mut("SoftwareVersionCode", fixed_string(&local.software_version_code));
            fields.field_mut("ModelVersion", fixed_string(&local.model_version));
            fields.field_mut("ModelSerialCode", fixed_string(&local.model_serial_code));
            fields.field_mut("CertificationLevel", PgnValue::U8(local.certification_level));
            fields.field_mut("LoadEquivalency", PgnValue::U8(local.load_equivalency));
            Some(Envelope::Decoded2000 {
                pgn: 126_996,
                source: local.source_address,
                destination: Some(destination),
                priority: 6,
                fields,
            })
        }
        126_998 => {
            let descriptor = dictionary.lookup_pgn(126_998)?.clone();
            let mut fields = DecodedFields::empty(descriptor);
            fields.field_mut("InstallationDescription1", fixed_string(&local.installation_description_1));
            fields.field_mut("InstallationDescription2", fixed_string(&local.installation_description_2));
            fields.field_mut("ManufacturerInformation", fixed_string(&local.manufacturer_information));
            Some(Envelope::Decoded2000 {
                pgn: 126_998,
                source: local.source_address,
                destination: Some(destination),
                priority: 6,
                fields,
            })
        }
        126_464 => Some(build_pgn_list(destination, local)),
        _ => None,
    }
}

/// PGN 126464 (Transmit/Receive PGN List group function) has no dictionary
/// entry; its layout is a single group-function byte (0 = "PGNs
/// transmitted") followed by one 3-byte little-endian PGN per entry.
fn build_pgn_list(destination: u8, local: &LocalDeviceInfo) -> Envelope {
    let mut payload = Vec::with_capacity(1 + local.supported_pgns.len() * 3);
    payload.push(0);
    for pgn in &local.supported_pgns {
        let bytes = pgn.to_le_bytes();
        payload.extend_from_slice(&bytes[0..3]);
    }
    Envelope::Raw2000 { pgn: 126_464, source: local.source_address, destination: Some(destination), priority: 6, payload }
}

/// PGN 65240 (Commanded Address): an 8-byte NAME followed by the new source
/// address. Parsing it out of a raw payload lets the caller feed the result
/// straight into [`DeviceTableHandle::observe`]-style bookkeeping and into
/// the address-claiming layer for the actual reclaim.
pub fn parse_commanded_address(payload: &[u8]) -> Option<(u64, u8)> {
    if payload.len() < 9 {
        return None;
    }
    let name = u64::from_le_bytes(payload[0..8].try_into().ok()?);
    Some((name, payload[8]))
}

/// The limited NMEA Complex/Simple Group Function (PGN 126208) sub-functions
/// this table answers: a Request (function code 0) for a PGN this node owns
/// is dispatched to [`respond_to_iso_request`]; Command and Acknowledge
/// sub-functions require per-field write/ack semantics this table does not
/// model and are left unanswered.
pub fn handle_group_function(
    payload: &[u8],
    destination: u8,
    local: &LocalDeviceInfo,
    dictionary: &PgnDictionary,
) -> Option<Envelope> {
    const REQUEST: u8 = 0;
    if payload.len() < 4 || payload[0] != REQUEST {
        return None;
    }
    let mut pgn_bytes = [0u8; 4];
    pgn_bytes[0..3].copy_from_slice(&payload[1..4]);
    let requested_pgn = u32::from_le_bytes(pgn_bytes);
    respond_to_iso_request(requested_pgn, destination, local, dictionary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded_address_claim(source: u8, name: u64, dictionary: &PgnDictionary) -> Envelope {
        let descriptor = dictionary.lookup_pgn(60_928).unwrap().clone();
        let mut fields = DecodedFields::empty(descriptor);
        fields.field_mut("UniqueNumber", PgnValue::U64(name));
        Envelope::Decoded2000 { pgn: 60_928, source, destination: None, priority: 6, fields }
    }

    fn raw_envelope(pgn: u32, source: u8) -> Envelope {
        Envelope::Raw2000 { pgn, source, destination: None, priority: 2, payload: vec![0; 8] }
    }

    #[test]
    fn observe_adds_an_entry_for_a_new_source_address() {
        let mut state = DeviceTableState { devices: HashMap::new(), max_silent: DEFAULT_MAX_SILENT };
        let now = Instant::now();
        let event = state.observe(10, None, now);
        assert!(matches!(event, Some(DeviceEvent::Added(r)) if r.address == 10));
        assert!(state.contains(10));
    }

    #[test]
    fn observe_refreshes_last_seen_without_emitting_an_event_when_name_is_unchanged() {
        let mut state = DeviceTableState { devices: HashMap::new(), max_silent: DEFAULT_MAX_SILENT };
        let t0 = Instant::now();
        state.observe(10, Some(42), t0);
        let t1 = t0 + Duration::from_secs(5);
        let event = state.observe(10, Some(42), t1);
        assert!(event.is_none());
        assert_eq!(state.devices.get(&10).unwrap().last_seen, t1);
    }

    #[test]
    fn observe_emits_changed_when_a_new_name_claims_the_same_address() {
        let mut state = DeviceTableState { devices: HashMap::new(), max_silent: DEFAULT_MAX_SILENT };
        let t0 = Instant::now();
        state.observe(10, Some(1), t0);
        let t1 = t0 + Duration::from_secs(1);
        let event = state.observe(10, Some(2), t1);
        assert!(matches!(event, Some(DeviceEvent::Changed(r)) if r.name == 2));
    }

    #[test]
    fn sweep_expires_entries_past_max_silent_and_leaves_fresh_ones() {
        let mut state = DeviceTableState { devices: HashMap::new(), max_silent: Duration::from_secs(60) };
        let t0 = Instant::now();
        state.observe(10, None, t0);
        state.observe(20, None, t0 + Duration::from_secs(59));
        let later = t0 + Duration::from_secs(121);
        let expired = state.sweep(later);
        assert_eq!(expired.len(), 1);
        assert!(matches!(expired[0], DeviceEvent::Expired(10)));
        assert!(!state.contains(10));
        assert!(state.contains(20));
    }

    #[tokio::test]
    async fn handle_observes_and_subscribers_see_added_and_expired_events() {
        tokio::time::pause();
        let (handle, runner) = DeviceTableHandle::new(Duration::from_millis(50));
        let mut events = handle.subscribe();
        let cancellation = CancellationToken::new();
        let task = tokio::spawn(runner.run(cancellation.clone()));

        let dictionary = PgnDictionary::bundled().unwrap();
        handle.observe(&decoded_address_claim(7, 0xAA, &dictionary));
        assert!(matches!(events.recv().await.unwrap(), DeviceEvent::Added(r) if r.address == 7));
        assert!(handle.contains(7));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(events.recv().await.unwrap(), DeviceEvent::Expired(7)));
        assert!(!handle.contains(7));

        cancellation.cancel();
        task.await.unwrap();
    }

    #[test]
    fn observe_on_raw2000_refreshes_the_table_without_touching_name() {
        let mut state = DeviceTableState { devices: HashMap::new(), max_silent: DEFAULT_MAX_SILENT };
        let t0 = Instant::now();
        state.observe(5, Some(99), t0);
        let t1 = t0 + Duration::from_secs(1);
        // A plain data PGN from the same source carries no NAME; the table
        // still refreshes last-seen.
        let event = state.observe(5, None, t1);
        assert!(event.is_none());
        assert_eq!(state.devices.get(&5).unwrap().name, 99);
        assert_eq!(state.devices.get(&5).unwrap().last_seen, t1);
    }

    fn local_info() -> LocalDeviceInfo {
        LocalDeviceInfo {
            name: 0x1122_3344_5566_7788,
            source_address: 30,
            product_code: 1234,
            model_id: "KORRI-ROUTER".to_string(),
            software_version_code: "1.0.0".to_string(),
            model_version: "1".to_string(),
            model_serial_code: "SN-0001".to_string(),
            certification_level: 0,
            load_equivalency: 1,
            installation_description_1: "".to_string(),
            installation_description_2: "".to_string(),
            manufacturer_information: "korri".to_string(),
            supported_pgns: vec![127_250, 129_025, 129_029],
        }
    }

    #[test]
    fn respond_to_iso_request_builds_an_address_claim_reply() {
        let dictionary = PgnDictionary::bundled().unwrap();
        let local = local_info();
        let reply = respond_to_iso_request(60_928, 255, &local, &dictionary).unwrap();
        match reply {
            Envelope::Decoded2000 { pgn, source, fields, .. } => {
                assert_eq!(pgn, 60_928);
                assert_eq!(source, 30);
                assert_eq!(fields.field("UniqueNumber"), Some(PgnValue::U64(local.name)));
            }
            other => panic!("expected Decoded2000, got {other:?}"),
        }
    }

    #[test]
    fn respond_to_iso_request_builds_a_product_information_reply() {
        let dictionary = PgnDictionary::bundled().unwrap();
        let local = local_info();
        let reply = respond_to_iso_request(126_996, 255, &local, &dictionary).unwrap();
        match reply {
            Envelope::Decoded2000 { pgn, fields, .. } => {
                assert_eq!(pgn, 126_996);
                assert_eq!(fields.field("ProductCode"), Some(PgnValue::U16(1234)));
            }
            other => panic!("expected Decoded2000, got {other:?}"),
        }
    }

    #[test]
    fn respond_to_iso_request_builds_a_pgn_list_reply() {
        let local = local_info();
        let dictionary = PgnDictionary::bundled().unwrap();
        let reply = respond_to_iso_request(126_464, 255, &local, &dictionary).unwrap();
        match reply {
            Envelope::Raw2000 { pgn, payload, .. } => {
                assert_eq!(pgn, 126_464);
                assert_eq!(payload[0], 0);
                assert_eq!((payload.len() - 1) / 3, local.supported_pgns.len());
            }
            other => panic!("expected Raw2000, got {other:?}"),
        }
    }

    #[test]
    fn respond_to_iso_request_returns_none_for_a_pgn_this_node_does_not_own() {
        let dictionary = PgnDictionary::bundled().unwrap();
        let local = local_info();
        assert!(respond_to_iso_request(130_824, 255, &local, &dictionary).is_none());
    }

    #[test]
    fn parse_commanded_address_extracts_name_and_new_address() {
        let mut payload = 0x0102_0304_0506_0708u64.to_le_bytes().to_vec();
        payload.push(42);
        let (name, address) = parse_commanded_address(&payload).unwrap();
        assert_eq!(name, 0x0102_0304_0506_0708);
        assert_eq!(address, 42);
    }

    #[test]
    fn parse_commanded_address_rejects_short_payloads() {
        assert!(parse_commanded_address(&[1, 2, 3]).is_none());
    }

    #[test]
    fn group_function_request_dispatches_to_iso_request_handling() {
        let dictionary = PgnDictionary::bundled().unwrap();
        let local = local_info();
        let mut payload = vec![0u8]; // Request
        let pgn_bytes = 60_928u32.to_le_bytes();
        payload.extend_from_slice(&pgn_bytes[0..3]);
        let reply = handle_group_function(&payload, 255, &local, &dictionary).unwrap();
        assert_eq!(reply.pgn(), Some(60_928));
    }

    #[test]
    fn group_function_command_is_not_answered() {
        let dictionary = PgnDictionary::bundled().unwrap();
        let local = local_info();
        let payload = vec![1u8, 0, 0xE0, 0xEF]; // Command, not Request
        assert!(handle_group_function(&payload, 255, &local, &dictionary).is_none());
    }

    #[test]
    fn sentence_0183_envelopes_are_not_observed() {
        let (handle, _runner) = DeviceTableHandle::new(DEFAULT_MAX_SILENT);
        handle.observe(&Envelope::Sentence0183 { talker: "GP".to_string(), sentence: "$GPGGA".to_string() });
        assert!(!handle.contains(0));
    }

    #[test]
    fn raw2000_envelope_is_observed_by_source_address() {
        let (handle, _runner) = DeviceTableHandle::new(DEFAULT_MAX_SILENT);
        handle.observe(&raw_envelope(127_488, 12));
        assert!(handle.contains(12));
    }
}
