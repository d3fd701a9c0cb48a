//! Coupler side of the router: the lifecycle state machine every driver
//! goes through, and the concrete [`CouplerIo`] drivers (direct CAN, serial
//! line, TCP client, UDP receiver, SocketCAN raw, log-replay) that bind it
//! to an actual transport. Text-oriented drivers (serial/TCP/UDP) share the
//! same [`SentenceFormat`] codec selection, so Shipmodul `$MXPGN`, Digital
//! Yacht `!PDGY` and a generic `!PGNST` adapter are all the same driver
//! parameterized differently rather than three separate types.
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;

use crate::config::CouplerConfig;
use crate::protocol::messages::Envelope;
use crate::protocol::sentence0183::{decode_mxpgn, decode_pdgy, decode_pgnst, encode_mxpgn, encode_pdgy, encode_pgnst, Raw2000};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::router::RouterHandle;

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn connection_closed() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "connection not open")
}

fn other_io_error(err: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::other(err.to_string())
}

fn can_frame_to_raw(frame: &CanFrame) -> Raw2000 {
    Raw2000 {
        pgn: frame.id.pgn(),
        priority: frame.id.priority(),
        source_address: frame.id.source_address(),
        destination: frame.id.destination().unwrap_or(255),
        timestamp_ms: now_ms(),
        payload: frame.data[..frame.len].to_vec(),
    }
}

fn raw_to_can_frame(raw: &Raw2000) -> Result<CanFrame, std::io::Error> {
    raw.to_can_frame().map_err(other_io_error)
}

/// Pseudo-0183 sentence codec a text-oriented coupler speaks. Digital Yacht
/// adapters use `!PDGY`, Shipmodul adapters use `$MXPGN`; a Yacht Devices
/// YDEN-02 gateway's ASCII RAW stream is structurally the same
/// pgn/priority/sa/da/timestamp/hex-payload shape as `!PGNST`, so it reuses
/// that codec rather than a fourth one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceFormat {
    DigitalYachtPdgy,
    ShipmodulMxpgn,
    YachtDevicesRaw,
}

impl SentenceFormat {
    fn decode(self, line: &str) -> Result<Raw2000, crate::error::Sentence0183Error> {
        match self {
            Self::DigitalYachtPdgy => decode_pdgy(line),
            Self::ShipmodulMxpgn => decode_mxpgn(line, now_ms()),
            Self::YachtDevicesRaw => decode_pgnst(line),
        }
    }

    fn encode(self, frame: &Raw2000) -> String {
        match self {
            Self::DigitalYachtPdgy => encode_pdgy(frame),
            Self::ShipmodulMxpgn => encode_mxpgn(frame),
            Self::YachtDevicesRaw => encode_pgnst(frame),
        }
    }
}

/// Lifecycle a coupler moves through between being configured and actively
/// exchanging traffic. `Opening` retries up to `max_attempt` times with
/// `open_delay_ms` backoff before settling into `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplerState {
    NotReady,
    Opening,
    Open,
    Connected,
    Active,
    Stopped,
    Failed,
}

/// Contract a transport-specific driver implements; the supervisor owns the
/// state machine and only calls into this for the actual I/O.
pub trait CouplerIo {
    type Error: std::fmt::Debug;

    /// Attempt to open the underlying transport (serial port, socket, CAN
    /// interface). Called once per `Opening` attempt.
    fn open(&mut self) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    /// Send one outbound frame. Only called once the driver reports `Open`.
    fn send(&mut self, frame: &CanFrame) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    /// Wait for and return the next inbound frame.
    fn recv(&mut self) -> impl std::future::Future<Output = Result<CanFrame, Self::Error>> + Send;
}

/// Direct-CAN coupler: binds an active [`CanBus`] controller and enforces a
/// minimum inter-message spacing on outbound frames.
pub struct DirectCanCoupler<C: CanBus> {
    bus: C,
    min_spacing: Duration,
}

impl<C: CanBus> DirectCanCoupler<C> {
    pub fn new(bus: C, min_spacing_ms: u64) -> Self {
        Self { bus, min_spacing: Duration::from_millis(min_spacing_ms) }
    }
}

impl<C: CanBus + Send> CouplerIo for DirectCanCoupler<C>
where
    C::Error: Send,
{
    type Error = C::Error;

    async fn open(&mut self) -> Result<(), Self::Error> {
        // The bus is already constructed and bound by the caller; opening a
        // direct-CAN coupler is a no-op beyond that.
        Ok(())
    }

    async fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        sleep(self.min_spacing).await;
        self.bus.send(frame).await
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        self.bus.recv().await
    }
}

/// Serial-line coupler: a text-oriented adapter on an RS-232/RS-422 line,
/// typically at 4800 baud (NMEA 0183 hardware default) or 38400 baud
/// (Digital Yacht/Shipmodul NMEA2000 gateways).
pub struct SerialLineCoupler {
    path: String,
    baud_rate: u32,
    format: SentenceFormat,
    reader: Option<BufReader<tokio::io::ReadHalf<tokio_serial::SerialStream>>>,
    writer: Option<tokio::io::WriteHalf<tokio_serial::SerialStream>>,
}

impl SerialLineCoupler {
    pub fn new(path: String, baud_rate: u32, format: SentenceFormat) -> Self {
        Self { path, baud_rate, format, reader: None, writer: None }
    }
}

impl CouplerIo for SerialLineCoupler {
    type Error = std::io::Error;

    async fn open(&mut self) -> Result<(), Self::Error> {
        let port = tokio_serial::new(&self.path, self.baud_rate).open_native_async().map_err(other_io_error)?;
        let (read_half, write_half) = tokio::io::split(port);
        self.reader = Some(BufReader::new(read_half));
        self.writer = Some(write_half);
        Ok(())
    }

    async fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        let line = self.format.encode(&can_frame_to_raw(frame));
        let writer = self.writer.as_mut().ok_or_else(connection_closed)?;
        writer.write_all(line.as_bytes()).await
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        loop {
            let mut line = String::new();
            {
                let reader = self.reader.as_mut().ok_or_else(connection_closed)?;
                let bytes_read = reader.read_line(&mut line).await?;
                if bytes_read == 0 {
                    return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "serial port closed"));
                }
            }
            if let Ok(raw) = self.format.decode(&line) {
                return raw_to_can_frame(&raw);
            }
        }
    }
}

/// TCP-client coupler: connects outbound to a text-oriented NMEA2000-over-IP
/// gateway and transparently reconnects (after `reconnect_delay`) whenever
/// the peer drops the connection.
pub struct TcpClientCoupler {
    addr: String,
    format: SentenceFormat,
    reconnect_delay: Duration,
    reader: Option<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    writer: Option<tokio::net::tcp::OwnedWriteHalf>,
}

impl TcpClientCoupler {
    pub fn new(addr: String, format: SentenceFormat, reconnect_delay_ms: u64) -> Self {
        Self { addr, format, reconnect_delay: Duration::from_millis(reconnect_delay_ms), reader: None, writer: None }
    }
}

impl CouplerIo for TcpClientCoupler {
    type Error = std::io::Error;

    async fn open(&mut self) -> Result<(), Self::Error> {
        let stream = TcpStream::connect(&self.addr).await?;
        let (read_half, write_half) = stream.into_split();
        self.reader = Some(BufReader::new(read_half));
        self.writer = Some(write_half);
        Ok(())
    }

    async fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        let line = self.format.encode(&can_frame_to_raw(frame));
        let writer = self.writer.as_mut().ok_or_else(connection_closed)?;
        writer.write_all(line.as_bytes()).await
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        loop {
            let mut line = String::new();
            let bytes_read = {
                let reader = self.reader.as_mut().ok_or_else(connection_closed)?;
                reader.read_line(&mut line).await?
            };
            if bytes_read == 0 {
                self.reader = None;
                self.writer = None;
                sleep(self.reconnect_delay).await;
                self.open().await?;
                continue;
            }
            if let Ok(raw) = self.format.decode(&line) {
                return raw_to_can_frame(&raw);
            }
        }
    }
}

/// UDP-receiver coupler: listens on a bound datagram socket for broadcast
/// or multicast NMEA2000-over-IP traffic. Receive-only, matching how these
/// gateways are deployed (the bus itself is the send path).
pub struct UdpReceiverCoupler {
    bind_addr: String,
    format: SentenceFormat,
    socket: Option<UdpSocket>,
}

impl UdpReceiverCoupler {
    pub fn new(bind_addr: String, format: SentenceFormat) -> Self {
        Self { bind_addr, format, socket: None }
    }

    #[cfg(test)]
    fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl CouplerIo for UdpReceiverCoupler {
    type Error = std::io::Error;

    async fn open(&mut self) -> Result<(), Self::Error> {
        self.socket = Some(UdpSocket::bind(&self.bind_addr).await?);
        Ok(())
    }

    async fn send(&mut self, _frame: &CanFrame) -> Result<(), Self::Error> {
        Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "UDP coupler is receive-only"))
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        let socket = self.socket.as_ref().ok_or_else(connection_closed)?;
        loop {
            let mut buffer = [0u8; 1024];
            let (len, _peer) = socket.recv_from(&mut buffer).await?;
            let datagram = String::from_utf8_lossy(&buffer[..len]);
            if let Some(raw) = datagram.lines().find_map(|line| self.format.decode(line).ok()) {
                return raw_to_can_frame(&raw);
            }
        }
    }
}

/// Log-replay coupler: feeds back previously captured frames honoring their
/// original inter-arrival spacing, for deterministic replay against the
/// rest of the router. Outbound frames are accepted and discarded: a replay
/// source has no physical bus to write back to.
pub struct ReplayCoupler {
    entries: Vec<(Duration, Raw2000)>,
    cursor: usize,
    started_at: Option<tokio::time::Instant>,
}

impl ReplayCoupler {
    /// `entries` pairs each captured frame with its offset from the start
    /// of the recording, not the delta from the previous frame.
    pub fn new(entries: Vec<(Duration, Raw2000)>) -> Self {
        Self { entries, cursor: 0, started_at: None }
    }
}

impl CouplerIo for ReplayCoupler {
    type Error = std::io::Error;

    async fn open(&mut self) -> Result<(), Self::Error> {
        self.started_at = Some(tokio::time::Instant::now());
        Ok(())
    }

    async fn send(&mut self, _frame: &CanFrame) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        let started_at = self.started_at.ok_or_else(connection_closed)?;
        let Some((offset, raw)) = self.entries.get(self.cursor).cloned() else {
            return std::future::pending().await;
        };
        tokio::time::sleep_until(started_at + offset).await;
        self.cursor += 1;
        raw_to_can_frame(&raw)
    }
}

/// Raw SocketCAN coupler: binds directly to a Linux `can0`/`vcan0`-style
/// interface. The only driver here that talks a native CAN wire format
/// rather than a text sentence.
#[cfg(feature = "socketcan")]
pub struct SocketCanCoupler {
    interface: String,
    socket: Option<socketcan::tokio::CanSocket>,
}

#[cfg(feature = "socketcan")]
impl SocketCanCoupler {
    pub fn new(interface: String) -> Self {
        Self { interface, socket: None }
    }
}

#[cfg(feature = "socketcan")]
fn build_socketcan_frame(frame: &CanFrame) -> Result<socketcan::CanFrame, std::io::Error> {
    let id = socketcan::ExtendedId::new(frame.id.0)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "CAN id exceeds 29 bits"))?;
    socketcan::CanFrame::new(id, &frame.data[..frame.len])
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "payload too long for a classic CAN frame"))
}

#[cfg(feature = "socketcan")]
fn from_socketcan_frame(frame: socketcan::CanFrame) -> CanFrame {
    let id = match frame.id() {
        socketcan::Id::Extended(ext) => CanId(ext.as_raw()),
        socketcan::Id::Standard(std_id) => CanId(std_id.as_raw() as u32),
    };
    let data = frame.data();
    let mut buffer = [0u8; 8];
    let len = data.len().min(8);
    buffer[..len].copy_from_slice(&data[..len]);
    CanFrame { id, data: buffer, len }
}

#[cfg(feature = "socketcan")]
impl CouplerIo for SocketCanCoupler {
    type Error = std::io::Error;

    async fn open(&mut self) -> Result<(), Self::Error> {
        self.socket = Some(socketcan::tokio::CanSocket::open(&self.interface).map_err(other_io_error)?);
        Ok(())
    }

    async fn send(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        let socket = self.socket.as_ref().ok_or_else(connection_closed)?;
        let can_frame = build_socketcan_frame(frame)?;
        socket.write_frame(can_frame).await
    }

    async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
        let socket = self.socket.as_ref().ok_or_else(connection_closed)?;
        let frame = socket.read_frame().await?;
        Ok(from_socketcan_frame(frame))
    }
}

/// Commands a [`CouplerHandle`] queues for the supervisor loop to apply.
pub enum CouplerCommand {
    Send(CanFrame),
    Suspend,
    Resume,
    Stop,
}

/// Cheap, cloneable handle producers use to drive a running coupler.
#[derive(Clone)]
pub struct CouplerHandle {
    sender: mpsc::Sender<CouplerCommand>,
}

impl CouplerHandle {
    pub async fn send(&self, frame: CanFrame) {
        let _ = self.sender.send(CouplerCommand::Send(frame)).await;
    }

    pub async fn suspend(&self) {
        let _ = self.sender.send(CouplerCommand::Suspend).await;
    }

    pub async fn resume(&self) {
        let _ = self.sender.send(CouplerCommand::Resume).await;
    }

    pub async fn stop(&self) {
        let _ = self.sender.send(CouplerCommand::Stop).await;
    }
}

/// Drives one coupler's full lifecycle: opening with retry/backoff, then
/// alternating between draining commands and forwarding inbound frames into
/// the router until stopped or cancelled.
pub struct CouplerSupervisor<I: CouplerIo> {
    name: String,
    config: CouplerConfig,
    io: I,
    commands: mpsc::Receiver<CouplerCommand>,
    state: CouplerState,
}

impl<I: CouplerIo> CouplerSupervisor<I> {
    pub fn new(name: String, config: CouplerConfig, io: I, command_capacity: usize) -> (CouplerHandle, Self) {
        let (sender, commands) = mpsc::channel(command_capacity);
        let handle = CouplerHandle { sender };
        let supervisor = Self { name, config, io, commands, state: CouplerState::NotReady };
        (handle, supervisor)
    }

    pub fn state(&self) -> CouplerState {
        self.state
    }

    /// Opens the transport with up to `max_attempt` retries, spaced
    /// `open_delay_ms` apart, then drains commands/inbound frames into
    /// `router` until told to stop or the token is cancelled.
    pub async fn run(mut self, router: RouterHandle, cancellation: CancellationToken) -> CouplerState {
        self.state = CouplerState::Opening;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.io.open().await {
                Ok(()) => {
                    self.state = CouplerState::Open;
                    break;
                }
                Err(_) if attempt < self.config.max_attempt => {
                    sleep(Duration::from_millis(self.config.open_delay_ms)).await;
                }
                Err(_) => {
                    self.state = CouplerState::Failed;
                    return self.state;
                }
            }
        }

        self.state = CouplerState::Connected;
        self.state = CouplerState::Active;
        let mut suspended = false;

        loop {
            if suspended {
                tokio::select! {
                    _ = cancellation.cancelled() => { self.state = CouplerState::Stopped; return self.state; }
                    command = self.commands.recv() => {
                        match command {
                            Some(CouplerCommand::Resume) => suspended = false,
                            Some(CouplerCommand::Stop) | None => { self.state = CouplerState::Stopped; return self.state; }
                            Some(CouplerCommand::Suspend) | Some(CouplerCommand::Send(_)) => {}
                        }
                    }
                }
                continue;
            }

            tokio::select! {
                _ = cancellation.cancelled() => {
                    self.state = CouplerState::Stopped;
                    return self.state;
                }
                command = self.commands.recv() => {
                    match command {
                        Some(CouplerCommand::Send(frame)) => { let _ = self.io.send(&frame).await; }
                        Some(CouplerCommand::Suspend) => suspended = true,
                        Some(CouplerCommand::Resume) => {}
                        Some(CouplerCommand::Stop) | None => { self.state = CouplerState::Stopped; return self.state; }
                    }
                }
                frame = self.io.recv() => {
                    if let Ok(frame) = frame {
                        let envelope = Envelope::Raw2000 {
                            pgn: frame.id.pgn(),
                            source: frame.id.source_address(),
                            destination: frame.id.destination(),
                            priority: frame.id.priority(),
                            payload: frame.data[..frame.len].to_vec(),
                        };
                        router.route(&self.name, envelope).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::router::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ReplayIo {
        frames: Vec<CanFrame>,
        sent: Arc<AtomicUsize>,
    }

    impl CouplerIo for ReplayIo {
        type Error = ();

        async fn open(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn send(&mut self, _frame: &CanFrame) -> Result<(), Self::Error> {
            self.sent.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn recv(&mut self) -> Result<CanFrame, Self::Error> {
            match self.frames.pop() {
                Some(frame) => Ok(frame),
                None => std::future::pending().await,
            }
        }
    }

    fn coupler_config() -> CouplerConfig {
        CouplerConfig {
            name: "can0".to_string(),
            class: "direct_can".to_string(),
            device: None,
            timeout_secs: 10,
            baud_rate: 250_000,
            max_attempt: 3,
            open_delay_ms: 1,
            stop_system: false,
            bidirectional: true,
            trace: false,
        }
    }

    #[tokio::test]
    async fn supervisor_reaches_active_then_stops_on_command() {
        use crate::protocol::transport::can_id::CanId;
        let id = CanId::builder(127_250, 10).build().unwrap();
        let frame = CanFrame { id, data: [0; 8], len: 8 };
        let io = ReplayIo { frames: vec![frame], sent: Arc::new(AtomicUsize::new(0)) };

        let (handle, supervisor) = CouplerSupervisor::new("can0".to_string(), coupler_config(), io, 4);

        let config = RouterConfig { couplers: vec![coupler_config()], ..Default::default() };
        let router = Router::from_config(&config).unwrap();
        let (router_handle, _runners, _device_table_runner) = router.split(CancellationToken::new());

        let cancellation = CancellationToken::new();
        let cancel_clone = cancellation.clone();
        let task = tokio::spawn(supervisor.run(router_handle, cancellation));

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.stop().await;
        let _ = cancel_clone;
        let final_state = task.await.unwrap();
        assert_eq!(final_state, CouplerState::Stopped);
    }

    fn sample_raw(pgn: u32) -> Raw2000 {
        Raw2000 { pgn, priority: 2, source_address: 10, destination: 255, timestamp_ms: 0, payload: vec![1, 2, 3, 4, 5, 6, 7, 8] }
    }

    #[tokio::test]
    async fn udp_receiver_decodes_yacht_devices_raw_datagrams() {
        let mut coupler = UdpReceiverCoupler::new("127.0.0.1:0".to_string(), SentenceFormat::YachtDevicesRaw);
        coupler.open().await.unwrap();
        let addr = coupler.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let line = encode_pgnst(&sample_raw(129_025));
        sender.send_to(line.as_bytes(), addr).await.unwrap();

        let frame = coupler.recv().await.unwrap();
        assert_eq!(frame.id.pgn(), 129_025);
    }

    #[tokio::test]
    async fn udp_receiver_rejects_outbound_sends() {
        let mut coupler = UdpReceiverCoupler::new("127.0.0.1:0".to_string(), SentenceFormat::YachtDevicesRaw);
        coupler.open().await.unwrap();
        let id = CanId::builder(127_250, 10).build().unwrap();
        let frame = CanFrame { id, data: [0; 8], len: 8 };
        assert!(coupler.send(&frame).await.is_err());
    }

    #[tokio::test]
    async fn tcp_client_coupler_decodes_shipmodul_mxpgn_frames() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let line = encode_mxpgn(&sample_raw(126_996));
            stream.write_all(line.as_bytes()).await.unwrap();
        });

        let mut coupler = TcpClientCoupler::new(addr.to_string(), SentenceFormat::ShipmodulMxpgn, 50);
        coupler.open().await.unwrap();
        let frame = coupler.recv().await.unwrap();
        assert_eq!(frame.id.pgn(), 126_996);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn replay_coupler_honors_recorded_inter_arrival_spacing() {
        tokio::time::pause();
        let entries = vec![
            (Duration::from_millis(0), sample_raw(129_025)),
            (Duration::from_millis(200), sample_raw(129_029)),
        ];
        let mut coupler = ReplayCoupler::new(entries);
        coupler.open().await.unwrap();

        let first = coupler.recv().await.unwrap();
        assert_eq!(first.id.pgn(), 129_025);

        let recv_second = coupler.recv();
        tokio::pin!(recv_second);
        assert!(futures_util::poll!(&mut recv_second).is_pending());

        tokio::time::advance(Duration::from_millis(200)).await;
        let second = recv_second.await.unwrap();
        assert_eq!(second.id.pgn(), 129_029);
    }
}
