//! Publisher-side half of the router: a bounded inbox per publisher, a
//! consecutive-drop counter enforcing `max_lost`, and the filter chain
//! applied before an envelope is handed to the publisher's own sink logic.
//! The concrete sinks below (`run_tcp_stream_sink`, `run_rpc_push_sink`,
//! `run_trace_sink`, `run_injector_sink`) are all just different `sink`
//! closures plugged into [`PublisherRunner::run`].
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, sleep};

use crate::config::PublisherConfig;
use crate::config::PublisherFormat;
use crate::infra::codec::traits::PgnData;
use crate::protocol::messages::Envelope;
use crate::protocol::sentence0183::{encode_mxpgn, encode_pdgy, encode_pgnst, Raw2000};
use crate::router::filter::FilterSet;
use crate::router::RouterHandle;
use crate::rpc::{RpcNmea0183, RpcNmea2000, RpcNmeaMsg, RpcNmeaPayload};

/// Reason a publisher runner stopped on its own, without being cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherStopReason {
    /// `max_lost` consecutive envelopes were dropped because the queue was full.
    MaxLostExceeded,
    /// No envelope arrived for `max_silent_secs`.
    SilentTimeout,
}

/// Cheap, cloneable handle the router's fan-out loop pushes into. Uses
/// `try_send` so one slow publisher never backpressures the coupler that
/// produced the envelope; drops are tallied and drained by the runner.
#[derive(Clone)]
pub struct PublisherHandle {
    pub(crate) name: String,
    pub(crate) sender: mpsc::Sender<Envelope>,
    pub(crate) consecutive_lost: Arc<AtomicU32>,
}

impl PublisherHandle {
    pub async fn offer(&self, envelope: Envelope) {
        // try_send keeps fan-out non-blocking; a full queue means the
        // publisher is already behind, so waiting would just propagate its
        // slowness back into every coupler feeding it.
        match self.sender.try_send(envelope) {
            Ok(()) => self.consecutive_lost.store(0, Ordering::Relaxed),
            Err(_) => {
                self.consecutive_lost.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Owns the publisher's inbox and drives its lifecycle. Spawn
/// [`PublisherRunner::run`] as its own task; it exits once the channel is
/// closed, `max_lost` is exceeded, or `max_silent_secs` elapses with no
/// traffic.
pub struct PublisherRunner {
    config: PublisherConfig,
    filters: FilterSet,
    receiver: mpsc::Receiver<Envelope>,
    delivered: Arc<AtomicU64>,
    consecutive_lost: Arc<AtomicU32>,
}

impl PublisherRunner {
    pub fn new(config: PublisherConfig, filters: FilterSet, receiver: mpsc::Receiver<Envelope>) -> Self {
        Self::with_lost_counter(config, filters, receiver, Arc::new(AtomicU32::new(0)))
    }

    pub fn with_lost_counter(
        config: PublisherConfig,
        filters: FilterSet,
        receiver: mpsc::Receiver<Envelope>,
        consecutive_lost: Arc<AtomicU32>,
    ) -> Self {
        Self {
            config,
            filters,
            receiver,
            delivered: Arc::new(AtomicU64::new(0)),
            consecutive_lost,
        }
    }

    /// Number of envelopes that passed the filter chain and were handed to
    /// the sink closure, for status reporting.
    pub fn delivered_count(&self) -> Arc<AtomicU64> {
        self.delivered.clone()
    }

    #[cfg(test)]
    pub(crate) fn into_inbox(self) -> mpsc::Receiver<Envelope> {
        self.receiver
    }

    /// Drains the inbox, applying the filter chain, and forwards surviving
    /// envelopes to `sink`. Returns the reason the loop stopped.
    pub async fn run<F, Fut>(mut self, mut sink: F) -> PublisherStopReason
    where
        F: FnMut(Envelope) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let silent_deadline = Duration::from_secs(self.config.max_silent_secs.max(1));
        let poll_step = silent_deadline.min(Duration::from_secs(5));
        let mut idle_check = interval(poll_step);
        let mut since_last_delivery = Duration::ZERO;

        loop {
            tokio::select! {
                envelope = self.receiver.recv() => {
                    match envelope {
                        Some(envelope) => {
                            since_last_delivery = Duration::ZERO;
                            if self.filters.admits(&envelope) {
                                sink(envelope).await;
                                self.delivered.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        None => return PublisherStopReason::SilentTimeout,
                    }
                }
                _ = idle_check.tick() => {
                    since_last_delivery += poll_step;
                    if since_last_delivery >= silent_deadline {
                        return PublisherStopReason::SilentTimeout;
                    }
                }
            }
            if self.consecutive_lost.load(Ordering::Relaxed) >= self.config.max_lost {
                return PublisherStopReason::MaxLostExceeded;
            }
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Reduces a decoded or raw envelope to the single-frame wire form the
/// pseudo-0183 codecs carry. `Decoded2000` is re-encoded through its own
/// descriptor; a `Sentence0183` envelope has no `Raw2000` equivalent.
fn envelope_to_raw2000(envelope: &Envelope) -> Option<Raw2000> {
    match envelope {
        Envelope::Raw2000 { pgn, source, destination, priority, payload } => Some(Raw2000 {
            pgn: *pgn,
            priority: *priority,
            source_address: *source,
            destination: destination.unwrap_or(255),
            timestamp_ms: now_ms(),
            payload: payload.clone(),
        }),
        Envelope::Decoded2000 { pgn, source, destination, priority, fields } => {
            let mut buffer = [0u8; 8];
            let len = fields.to_payload(&mut buffer).ok()?;
            Some(Raw2000 {
                pgn: *pgn,
                priority: *priority,
                source_address: *source,
                destination: destination.unwrap_or(255),
                timestamp_ms: now_ms(),
                payload: buffer[..len].to_vec(),
            })
        }
        Envelope::Sentence0183 { .. } => None,
    }
}

/// Renders one envelope as a single output line, per the publisher's
/// configured wire format. A `Sentence0183` envelope passes its sentence
/// through untouched regardless of `format`.
fn format_line(format: PublisherFormat, envelope: &Envelope) -> Option<String> {
    if let Envelope::Sentence0183 { sentence, .. } = envelope {
        return Some(format!("{sentence}\r\n"));
    }
    let raw = envelope_to_raw2000(envelope)?;
    Some(match format {
        PublisherFormat::Transparent => encode_pgnst(&raw),
        PublisherFormat::Dyfmt => encode_pdgy(&raw),
        PublisherFormat::Stfmt => encode_mxpgn(&raw),
    })
}

/// Streams every admitted envelope to an already-accepted TCP client as
/// text, in the publisher's configured format. The socket is shut down once
/// `runner.run` stops, whether from `max_lost`, `max_silent_secs`, or the
/// channel closing.
pub async fn run_tcp_stream_sink(runner: PublisherRunner, stream: TcpStream, format: PublisherFormat) -> PublisherStopReason {
    let stream = Arc::new(Mutex::new(stream));
    let reason = runner
        .run(|envelope| {
            let stream = stream.clone();
            async move {
                if let Some(line) = format_line(format, &envelope) {
                    let mut stream = stream.lock().await;
                    let _ = stream.write_all(line.as_bytes()).await;
                }
            }
        })
        .await;
    let _ = stream.lock().await.shutdown().await;
    reason
}

/// How a decoded NMEA2000 field record that fails to re-encode is handled
/// by [`run_rpc_push_sink`]. The crate has no NMEA0183<->2000 semantic
/// translator, so all three modes push the same wire shapes; they differ
/// only in what happens when a `Decoded2000` envelope cannot round-trip
/// back through its own descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcConversionMode {
    /// Forward best-effort: an unencodable record is still pushed, with an
    /// empty payload, rather than silently disappearing.
    PassThru,
    /// Drop a `Decoded2000` envelope entirely rather than push partial data.
    ConvertStrict,
    /// Same as `PassThru`; kept distinct so a caller can tell the two
    /// "lenient" policies apart in configuration even though they behave
    /// identically today.
    ConvertPass,
}

fn envelope_to_rpc(envelope: &Envelope, mode: RpcConversionMode, msg_id: u64) -> Option<RpcNmeaMsg> {
    let payload = match envelope {
        Envelope::Sentence0183 { talker, sentence } => RpcNmeaPayload::N0183(RpcNmea0183 {
            talker: talker.clone(),
            formatter: sentence.get(3..6).unwrap_or("").to_string(),
            timestamp: now_ms(),
            values: sentence.split(',').map(str::to_string).collect(),
            raw: sentence.as_bytes().to_vec(),
        }),
        Envelope::Raw2000 { pgn, source, destination, priority, payload } => RpcNmeaPayload::N2k(RpcNmea2000 {
            pgn: *pgn,
            priority: *priority,
            sa: *source,
            da: destination.unwrap_or(255),
            timestamp: now_ms(),
            payload: payload.clone(),
        }),
        Envelope::Decoded2000 { pgn, source, destination, priority, fields } => {
            let mut buffer = [0u8; 8];
            match fields.to_payload(&mut buffer) {
                Ok(len) => RpcNmeaPayload::N2k(RpcNmea2000 {
                    pgn: *pgn,
                    priority: *priority,
                    sa: *source,
                    da: destination.unwrap_or(255),
                    timestamp: now_ms(),
                    payload: buffer[..len].to_vec(),
                }),
                Err(_) if mode == RpcConversionMode::ConvertStrict => return None,
                Err(_) => RpcNmeaPayload::N2k(RpcNmea2000 {
                    pgn: *pgn,
                    priority: *priority,
                    sa: *source,
                    da: destination.unwrap_or(255),
                    timestamp: now_ms(),
                    payload: Vec::new(),
                }),
            }
        }
    };
    Some(RpcNmeaMsg { msg_id, payload })
}

/// Pushes every admitted envelope as a newline-delimited JSON `RpcNmeaMsg`
/// to `addr`, reconnecting after `reconnect_delay_ms` whenever a write
/// fails (the connection is assumed to have dropped).
pub async fn run_rpc_push_sink(
    runner: PublisherRunner,
    addr: SocketAddr,
    mode: RpcConversionMode,
    reconnect_delay_ms: u64,
) -> PublisherStopReason {
    let connection: Arc<Mutex<Option<TcpStream>>> = Arc::new(Mutex::new(None));
    let next_msg_id = Arc::new(AtomicU64::new(0));
    runner
        .run(|envelope| {
            let connection = connection.clone();
            let next_msg_id = next_msg_id.clone();
            async move {
                let msg_id = next_msg_id.fetch_add(1, Ordering::Relaxed);
                let Some(msg) = envelope_to_rpc(&envelope, mode, msg_id) else { return };
                let Ok(mut line) = serde_json::to_string(&msg) else { return };
                line.push('\n');

                let mut guard = connection.lock().await;
                if guard.is_none() {
                    *guard = TcpStream::connect(addr).await.ok();
                }
                if let Some(stream) = guard.as_mut() {
                    if stream.write_all(line.as_bytes()).await.is_err() {
                        *guard = None;
                        drop(guard);
                        sleep(Duration::from_millis(reconnect_delay_ms)).await;
                    }
                }
            }
        })
        .await
}

/// Writes every admitted envelope, one line per envelope in the same
/// transparent text form couplers exchange, to `TRACE-<name>-<ISO 8601
/// timestamp>.log` under `directory`.
pub async fn run_trace_sink(runner: PublisherRunner, name: &str, directory: &Path) -> std::io::Result<PublisherStopReason> {
    let timestamp = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown-time".to_string());
    let path = directory.join(format!("TRACE-{name}-{timestamp}.log"));
    let file = tokio::fs::File::create(&path).await?;
    let file = Arc::new(Mutex::new(file));

    let reason = runner
        .run(|envelope| {
            let file = file.clone();
            async move {
                if let Some(line) = format_line(PublisherFormat::Transparent, &envelope) {
                    let mut file = file.lock().await;
                    let _ = file.write_all(line.as_bytes()).await;
                }
            }
        })
        .await;
    Ok(reason)
}

/// Loopback sink: every admitted envelope is re-injected into the router as
/// if it had just arrived from `source_name`. Used for applications that
/// synthesize NMEA2000 traffic (e.g. a local CA's own periodic
/// transmissions) and need it to flow back through the normal
/// subscription/filter fabric.
pub async fn run_injector_sink(runner: PublisherRunner, router: RouterHandle, source_name: String) -> PublisherStopReason {
    runner
        .run(|envelope| {
            let router = router.clone();
            let source_name = source_name.clone();
            async move {
                router.route(&source_name, envelope).await;
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublisherFormat;
    use tokio::sync::Mutex;

    fn config() -> PublisherConfig {
        PublisherConfig {
            name: "sink".to_string(),
            class: "test".to_string(),
            sources: vec![],
            queue_size: 4,
            max_lost: 2,
            max_silent_secs: 1,
            filter_select: false,
            format: PublisherFormat::Transparent,
            filters: vec![],
        }
    }

    #[tokio::test]
    async fn runner_stops_on_silent_timeout_when_channel_closes() {
        let (tx, rx) = mpsc::channel(4);
        drop(tx);
        let runner = PublisherRunner::new(config(), FilterSet::empty(), rx);
        let reason = runner.run(|_| async {}).await;
        assert_eq!(reason, PublisherStopReason::SilentTimeout);
    }

    #[tokio::test]
    async fn runner_forwards_admitted_envelopes_to_sink() {
        let (tx, rx) = mpsc::channel(4);
        let handle = PublisherHandle {
            name: "sink".to_string(),
            sender: tx,
            consecutive_lost: Arc::new(AtomicU32::new(0)),
        };
        let runner = PublisherRunner::new(config(), FilterSet::empty(), rx);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let envelope = Envelope::Sentence0183 {
            talker: "GP".to_string(),
            sentence: "$GPGGA".to_string(),
        };
        handle.offer(envelope.clone()).await;
        drop(handle);

        let reason = runner
            .run(move |envelope| {
                let seen = seen_clone.clone();
                async move {
                    seen.lock().await.push(envelope);
                }
            })
            .await;
        assert_eq!(reason, PublisherStopReason::SilentTimeout);
        assert_eq!(seen.lock().await.len(), 1);
    }

    fn raw_envelope(pgn: u32) -> Envelope {
        Envelope::Raw2000 { pgn, source: 10, destination: None, priority: 2, payload: vec![1, 2, 3, 4, 5, 6, 7, 8] }
    }

    #[tokio::test]
    async fn tcp_stream_sink_writes_transparent_lines_to_the_client() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (server_stream, _) = listener.accept().await.unwrap();
        let client_stream = client_task.await.unwrap();

        let (tx, rx) = mpsc::channel(4);
        let runner = PublisherRunner::new(config(), FilterSet::empty(), rx);
        tx.send(raw_envelope(129_025)).await.unwrap();
        drop(tx);

        let sink_task = tokio::spawn(run_tcp_stream_sink(runner, server_stream, PublisherFormat::Transparent));

        let mut reader = tokio::io::BufReader::new(client_stream);
        let mut line = String::new();
        tokio::io::AsyncBufReadExt::read_line(&mut reader, &mut line).await.unwrap();
        assert!(line.starts_with("!PGNST,129025,"));

        let reason = sink_task.await.unwrap();
        assert_eq!(reason, PublisherStopReason::SilentTimeout);
    }

    #[tokio::test]
    async fn trace_sink_writes_one_transparent_line_per_envelope() {
        let dir = std::env::temp_dir().join(format!("korri-router-trace-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let (tx, rx) = mpsc::channel(4);
        let runner = PublisherRunner::new(config(), FilterSet::empty(), rx);
        tx.send(raw_envelope(129_029)).await.unwrap();
        drop(tx);

        let reason = run_trace_sink(runner, "test-publisher", &dir).await.unwrap();
        assert_eq!(reason, PublisherStopReason::SilentTimeout);

        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        let mut found = false;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("TRACE-test-publisher-") {
                found = true;
                let contents = tokio::fs::read_to_string(entry.path()).await.unwrap();
                assert!(contents.starts_with("!PGNST,129029,"));
            }
        }
        assert!(found, "expected a TRACE-test-publisher-*.log file");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn injector_sink_reinjects_envelopes_as_the_named_source() {
        let router_config = crate::config::RouterConfig {
            couplers: vec![crate::config::CouplerConfig {
                name: "loopback".to_string(),
                class: "test".to_string(),
                device: None,
                timeout_secs: 10,
                baud_rate: 4800,
                max_attempt: 1,
                open_delay_ms: 0,
                stop_system: false,
                bidirectional: false,
                trace: false,
            }],
            publishers: vec![PublisherConfig { sources: vec!["loopback".to_string()], ..config() }],
            ..Default::default()
        };
        let router = crate::router::Router::from_config(&router_config).unwrap();
        let (router_handle, mut runners, _device_table_runner) = router.split(tokio_util::sync::CancellationToken::new());
        let (_, downstream_runner) = runners.remove(0);
        let mut downstream_inbox = downstream_runner.into_inbox();

        let (tx, rx) = mpsc::channel(4);
        let injector_runner = PublisherRunner::new(config(), FilterSet::empty(), rx);
        tx.send(raw_envelope(60_928)).await.unwrap();
        drop(tx);

        let reason = run_injector_sink(injector_runner, router_handle, "loopback".to_string()).await;
        assert_eq!(reason, PublisherStopReason::SilentTimeout);

        let received = downstream_inbox.recv().await.unwrap();
        assert_eq!(received.pgn(), Some(60_928));
    }

    #[tokio::test]
    async fn rpc_push_sink_writes_one_json_line_per_envelope() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = mpsc::channel(4);
        let runner = PublisherRunner::new(config(), FilterSet::empty(), rx);
        tx.send(raw_envelope(129_025)).await.unwrap();
        drop(tx);

        let sink_task = tokio::spawn(run_rpc_push_sink(runner, addr, RpcConversionMode::PassThru, 10));
        let (server_stream, _) = listener.accept().await.unwrap();

        let mut reader = tokio::io::BufReader::new(server_stream);
        let mut line = String::new();
        tokio::io::AsyncBufReadExt::read_line(&mut reader, &mut line).await.unwrap();
        let msg: RpcNmeaMsg = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(msg.msg_id, 0);
        match msg.payload {
            RpcNmeaPayload::N2k(n2k) => assert_eq!(n2k.pgn, 129_025),
            other => panic!("expected an N2k payload, got {other:?}"),
        }

        let reason = sink_task.await.unwrap();
        assert_eq!(reason, PublisherStopReason::SilentTimeout);
    }

    #[tokio::test]
    async fn rpc_push_sink_convert_strict_drops_an_unencodable_decoded_record() {
        let dictionary = crate::dictionary::PgnDictionary::bundled().unwrap();
        let descriptor = dictionary.lookup_pgn(129_025).unwrap().clone();
        // Latitude/Longitude left unset: the Number field kind has no default
        // value to fall back on, so serialization fails.
        let fields = crate::protocol::messages::DecodedFields::empty(descriptor);
        let envelope = Envelope::Decoded2000 { pgn: 129_025, source: 10, destination: None, priority: 2, fields };

        assert!(envelope_to_rpc(&envelope, RpcConversionMode::ConvertStrict, 0).is_none());
        assert!(envelope_to_rpc(&envelope, RpcConversionMode::PassThru, 0).is_some());
    }
}
