//! ISO Transport Protocol (J1939/21): PGN 60416 (TP.CM) and 60160 (TP.DT),
//! carrying PDUs too large for Fast Packet (up to 1785 bytes) between a
//! single sender/receiver pair. Two modes: BAM (broadcast, no
//! acknowledgements) and RTS/CTS (peer-to-peer, windowed).
use crate::error::IsoTransportError;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;

/// Maximum PDU size an ISO Transport session may carry.
pub const MAX_ISO_TP_PAYLOAD: usize = 1785;

pub const TP_CM_PGN: u32 = 60416;
pub const TP_DT_PGN: u32 = 60160;

/// Receiver timer: maximum delay between two consecutive TP.DT packets.
pub const T1_MS: u64 = 750;
/// Sender timer: maximum delay awaiting CTS after RTS.
pub const T2_MS: u64 = 1250;
/// Sender timer: maximum delay awaiting EndOfMsgAck after the last packet.
pub const T3_MS: u64 = 1250;
/// Receiver timer: maximum delay between CTS and the first resulting packet.
pub const T4_MS: u64 = 1050;
/// Maximum pacing a sender may use between two packets (BAM or RTS/CTS).
pub const MAX_PACING_MS: u64 = 200;
/// Recommended minimum pacing between BAM packets.
pub const BAM_MIN_PACING_MS: u64 = 50;
/// Maximum number of packets offered in a single CTS window.
pub const MAX_CTS_WINDOW: u8 = 16;
/// Maximum number of concurrent receive sessions tracked at once.
const MAX_CONCURRENT_SESSIONS: usize = 4;

//==================================================================================TP_CM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Busy,
    Resources,
    Timeout,
    RetransmitLimit,
    Other(u8),
}

impl AbortReason {
    fn as_u8(self) -> u8 {
        match self {
            AbortReason::Busy => 1,
            AbortReason::Resources => 2,
            AbortReason::Timeout => 3,
            AbortReason::RetransmitLimit => 4,
            AbortReason::Other(code) => code,
        }
    }

    fn from_u8(code: u8) -> Self {
        match code {
            1 => AbortReason::Busy,
            2 => AbortReason::Resources,
            3 => AbortReason::Timeout,
            4 => AbortReason::RetransmitLimit,
            other => AbortReason::Other(other),
        }
    }
}

/// One parsed/built TP.CM (PGN 60416) control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpCm {
    Bam { total_size: u16, packet_count: u8, pgn: u32 },
    Rts { total_size: u16, packet_count: u8, max_packets_per_cts: u8, pgn: u32 },
    Cts { packet_count: u8, next_packet: u8, pgn: u32 },
    EndOfMsgAck { total_size: u16, packet_count: u8, pgn: u32 },
    Abort { pgn: u32, reason: AbortReason },
}

impl TpCm {
    pub fn pgn(&self) -> u32 {
        match self {
            TpCm::Bam { pgn, .. }
            | TpCm::Rts { pgn, .. }
            | TpCm::Cts { pgn, .. }
            | TpCm::EndOfMsgAck { pgn, .. }
            | TpCm::Abort { pgn, .. } => *pgn,
        }
    }

    pub fn parse(data: &[u8; 8]) -> Result<Self, IsoTransportError> {
        let pgn = u32::from_le_bytes([data[5], data[6], data[7], 0]);
        match data[0] {
            32 => Ok(TpCm::Bam {
                total_size: u16::from_le_bytes([data[1], data[2]]),
                packet_count: data[3],
                pgn,
            }),
            16 => Ok(TpCm::Rts {
                total_size: u16::from_le_bytes([data[1], data[2]]),
                packet_count: data[3],
                max_packets_per_cts: data[4],
                pgn,
            }),
            17 => Ok(TpCm::Cts {
                packet_count: data[1],
                next_packet: data[2],
                pgn,
            }),
            19 => Ok(TpCm::EndOfMsgAck {
                total_size: u16::from_le_bytes([data[1], data[2]]),
                packet_count: data[3],
                pgn,
            }),
            255 => Ok(TpCm::Abort {
                pgn,
                reason: AbortReason::from_u8(data[1]),
            }),
            other => Err(IsoTransportError::UnknownControlByte { control_byte: other }),
        }
    }

    pub fn to_payload(self) -> [u8; 8] {
        let mut data = [0xFFu8; 8];
        let write_pgn = |data: &mut [u8; 8], pgn: u32| {
            let bytes = pgn.to_le_bytes();
            data[5] = bytes[0];
            data[6] = bytes[1];
            data[7] = bytes[2];
        };
        match self {
            TpCm::Bam { total_size, packet_count, pgn } => {
                data[0] = 32;
                data[1..3].copy_from_slice(&total_size.to_le_bytes());
                data[3] = packet_count;
                data[4] = 0xFF;
                write_pgn(&mut data, pgn);
            }
            TpCm::Rts { total_size, packet_count, max_packets_per_cts, pgn } => {
                data[0] = 16;
                data[1..3].copy_from_slice(&total_size.to_le_bytes());
                data[3] = packet_count;
                data[4] = max_packets_per_cts;
                write_pgn(&mut data, pgn);
            }
            TpCm::Cts { packet_count, next_packet, pgn } => {
                data[0] = 17;
                data[1] = packet_count;
                data[2] = next_packet;
                data[3] = 0xFF;
                data[4] = 0xFF;
                write_pgn(&mut data, pgn);
            }
            TpCm::EndOfMsgAck { total_size, packet_count, pgn } => {
                data[0] = 19;
                data[1..3].copy_from_slice(&total_size.to_le_bytes());
                data[3] = packet_count;
                data[4] = 0xFF;
                write_pgn(&mut data, pgn);
            }
            TpCm::Abort { pgn, reason } => {
                data[0] = 255;
                data[1] = reason.as_u8();
                write_pgn(&mut data, pgn);
            }
        }
        data
    }
}

fn build_frame(
    control_pgn: u32,
    source: u8,
    destination: Option<u8>,
    priority: u8,
    payload: &[u8; 8],
) -> Result<CanFrame, IsoTransportError> {
    let mut builder = CanId::builder(control_pgn, source).with_priority(priority);
    if let Some(destination) = destination {
        builder = builder.to_destination(destination);
    }
    let id = builder.build().map_err(IsoTransportError::CanId)?;
    Ok(CanFrame { id, data: *payload, len: 8 })
}

//==================================================================================RECEIVER
/// Outcome of feeding a frame to [`IsoTransportReceiver`].
#[derive(Debug, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Ignored,
    SessionOpened,
    FragmentConsumed,
    MessageComplete { pgn: u32, source: u8, payload: Vec<u8> },
    CtsRequired { pgn: u32, source: u8, next_packet: u8, window: u8 },
    AbortRequired { pgn: u32, source: u8, reason: AbortReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Inactive,
    AwaitingData,
}

#[derive(Debug, Clone, Copy)]
struct ReceiveSession {
    state: SessionState,
    is_bam: bool,
    source: u8,
    destination: u8,
    pgn: u32,
    total_size: u16,
    packet_count: u8,
    next_expected_packet: u8,
    current_len: usize,
    last_activity_ms: u64,
}

impl ReceiveSession {
    const fn new() -> Self {
        Self {
            state: SessionState::Inactive,
            is_bam: false,
            source: 0,
            destination: 0,
            pgn: 0,
            total_size: 0,
            packet_count: 0,
            next_expected_packet: 1,
            current_len: 0,
            last_activity_ms: 0,
        }
    }

    fn reset(&mut self) {
        self.state = SessionState::Inactive;
    }
}

/// Reassembles BAM and RTS/CTS sessions on the receiving side. One session
/// per (source, destination, PGN); a fresh RTS for the same key aborts the
/// prior session with [`AbortReason::Busy`].
#[derive(Debug)]
pub struct IsoTransportReceiver {
    sessions: [ReceiveSession; MAX_CONCURRENT_SESSIONS],
    buffers: [[u8; MAX_ISO_TP_PAYLOAD]; MAX_CONCURRENT_SESSIONS],
}

impl Default for IsoTransportReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl IsoTransportReceiver {
    pub fn new() -> Self {
        Self {
            sessions: [ReceiveSession::new(); MAX_CONCURRENT_SESSIONS],
            buffers: [[0u8; MAX_ISO_TP_PAYLOAD]; MAX_CONCURRENT_SESSIONS],
        }
    }

    fn find_session(&self, source: u8, destination: u8, pgn: u32) -> Option<usize> {
        self.sessions.iter().position(|session| {
            session.state != SessionState::Inactive
                && session.source == source
                && session.destination == destination
                && session.pgn == pgn
        })
    }

    fn find_free_slot(&self) -> Option<usize> {
        self.sessions
            .iter()
            .position(|session| session.state == SessionState::Inactive)
    }

    /// Process a TP.CM (PGN 60416) frame addressed to us (or broadcast for BAM).
    pub fn process_cm(&mut self, source: u8, destination: u8, data: &[u8; 8], now_ms: u64) -> ReceiveOutcome {
        let message = match TpCm::parse(data) {
            Ok(m) => m,
            Err(_) => return ReceiveOutcome::Ignored,
        };

        match message {
            TpCm::Bam { total_size, packet_count, pgn } => {
                self.open_session(source, destination, pgn, total_size, packet_count, true, now_ms)
            }
            TpCm::Rts { total_size, packet_count, pgn, .. } => {
                // A new RTS for a key already in progress aborts the old session first.
                if let Some(index) = self.find_session(source, destination, pgn) {
                    self.sessions[index].reset();
                }
                let outcome =
                    self.open_session(source, destination, pgn, total_size, packet_count, false, now_ms);
                if matches!(outcome, ReceiveOutcome::SessionOpened) {
                    let window = packet_count.min(MAX_CTS_WINDOW);
                    return ReceiveOutcome::CtsRequired {
                        pgn,
                        source,
                        next_packet: 1,
                        window,
                    };
                }
                outcome
            }
            TpCm::Abort { pgn, reason } => {
                if let Some(index) = self.find_session(source, destination, pgn) {
                    self.sessions[index].reset();
                }
                ReceiveOutcome::AbortRequired { pgn, source, reason }
            }
            // CTS / EndOfMsgAck are sender-facing; a pure receiver ignores them.
            TpCm::Cts { .. } | TpCm::EndOfMsgAck { .. } => ReceiveOutcome::Ignored,
        }
    }

    fn open_session(
        &mut self,
        source: u8,
        destination: u8,
        pgn: u32,
        total_size: u16,
        packet_count: u8,
        is_bam: bool,
        now_ms: u64,
    ) -> ReceiveOutcome {
        if total_size == 0 || total_size as usize > MAX_ISO_TP_PAYLOAD {
            return ReceiveOutcome::Ignored;
        }
        let Some(index) = self.find_free_slot() else {
            return ReceiveOutcome::Ignored;
        };
        self.sessions[index] = ReceiveSession {
            state: SessionState::AwaitingData,
            is_bam,
            source,
            destination,
            pgn,
            total_size,
            packet_count,
            next_expected_packet: 1,
            current_len: 0,
            last_activity_ms: now_ms,
        };
        ReceiveOutcome::SessionOpened
    }

    /// Process a TP.DT (PGN 60160) frame: byte 0 is the 1-based packet
    /// sequence number, bytes 1..=7 are up to 7 payload bytes.
    pub fn process_dt(&mut self, source: u8, destination: u8, data: &[u8; 8], now_ms: u64) -> ReceiveOutcome {
        let sequence = data[0];
        let Some(index) = self.sessions.iter().position(|session| {
            session.state == SessionState::AwaitingData
                && session.source == source
                && session.destination == destination
                && session.next_expected_packet == sequence
        }) else {
            return ReceiveOutcome::Ignored;
        };

        let session = &mut self.sessions[index];
        let remaining = session.total_size as usize - session.current_len;
        let copy_len = remaining.min(7);
        self.buffers[index][session.current_len..session.current_len + copy_len]
            .copy_from_slice(&data[1..1 + copy_len]);
        session.current_len += copy_len;
        session.next_expected_packet = session.next_expected_packet.wrapping_add(1);
        session.last_activity_ms = now_ms;

        if session.current_len >= session.total_size as usize {
            let pgn = session.pgn;
            let is_bam = session.is_bam;
            let packet_count = session.packet_count;
            let total_size = session.total_size;
            let payload = self.buffers[index][..session.current_len].to_vec();
            session.reset();

            let result = ReceiveOutcome::MessageComplete { pgn, source, payload };
            if is_bam {
                return result;
            }
            // RTS/CTS completion still reports MessageComplete; caller is
            // responsible for emitting the corresponding EndOfMsgAck using
            // `total_size`/`packet_count` recorded below.
            let _ = (total_size, packet_count);
            return result;
        }

        // Window exhausted for RTS/CTS: caller decides whether to CTS again.
        if !session.is_bam && (session.next_expected_packet - 1) % MAX_CTS_WINDOW == 0 {
            let pgn = session.pgn;
            let next_packet = session.next_expected_packet;
            let remaining_packets = session.packet_count - (next_packet - 1);
            return ReceiveOutcome::CtsRequired {
                pgn,
                source,
                next_packet,
                window: remaining_packets.min(MAX_CTS_WINDOW),
            };
        }

        ReceiveOutcome::FragmentConsumed
    }

    /// Sweep sessions whose deadline (T1 between packets, T4 after CTS) has
    /// passed. Driven by the shared tick described alongside Fast Packet
    /// expiry, not per-frame scanning.
    pub fn expire_stale_sessions(&mut self, now_ms: u64) -> Vec<(u32, u8)> {
        let mut expired = Vec::new();
        for session in self.sessions.iter_mut() {
            if session.state == SessionState::AwaitingData {
                let deadline = if session.current_len == 0 { T4_MS } else { T1_MS };
                if now_ms.saturating_sub(session.last_activity_ms) > deadline {
                    expired.push((session.pgn, session.source));
                    session.reset();
                }
            }
        }
        expired
    }
}

//==================================================================================SENDER
/// Sender-side BAM session: a one-shot iterator building the TP.CM BAM frame
/// followed by every TP.DT frame, same shape as [`FastPacketBuilder`](super::transport::fast_packet::builder::FastPacketBuilder).
pub struct BamSender<'a> {
    pgn: u32,
    source: u8,
    payload: &'a [u8],
    packet_count: u8,
    next_frame: u8,
}

impl<'a> BamSender<'a> {
    pub fn new(pgn: u32, source: u8, payload: &'a [u8]) -> Result<Self, IsoTransportError> {
        if payload.is_empty() || payload.len() > MAX_ISO_TP_PAYLOAD {
            return Err(IsoTransportError::InvalidPayloadLength { len: payload.len() });
        }
        let packet_count = payload.len().div_ceil(7) as u8;
        Ok(Self { pgn, source, payload, packet_count, next_frame: 0 })
    }

    /// The TP.CM BAM frame that must be sent before any TP.DT frame.
    pub fn control_frame(&self) -> Result<CanFrame, IsoTransportError> {
        let message = TpCm::Bam {
            total_size: self.payload.len() as u16,
            packet_count: self.packet_count,
            pgn: self.pgn,
        };
        build_frame(TP_CM_PGN, self.source, None, 7, &message.to_payload())
    }
}

impl<'a> Iterator for BamSender<'a> {
    type Item = Result<CanFrame, IsoTransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_frame >= self.packet_count {
            return None;
        }
        let offset = self.next_frame as usize * 7;
        let copy_len = (self.payload.len() - offset).min(7);
        let mut data = [0xFFu8; 8];
        data[0] = self.next_frame + 1;
        data[1..1 + copy_len].copy_from_slice(&self.payload[offset..offset + copy_len]);
        self.next_frame += 1;
        Some(build_frame(TP_DT_PGN, self.source, None, 7, &data))
    }
}

/// Sender-side RTS/CTS session driven by the peer's CTS/Abort responses.
pub struct RtsCtsSender<'a> {
    pgn: u32,
    source: u8,
    destination: u8,
    payload: &'a [u8],
    packet_count: u8,
}

impl<'a> RtsCtsSender<'a> {
    pub fn new(pgn: u32, source: u8, destination: u8, payload: &'a [u8]) -> Result<Self, IsoTransportError> {
        if payload.is_empty() || payload.len() > MAX_ISO_TP_PAYLOAD {
            return Err(IsoTransportError::InvalidPayloadLength { len: payload.len() });
        }
        let packet_count = payload.len().div_ceil(7) as u8;
        Ok(Self { pgn, source, destination, payload, packet_count })
    }

    pub fn rts_frame(&self) -> Result<CanFrame, IsoTransportError> {
        let message = TpCm::Rts {
            total_size: self.payload.len() as u16,
            packet_count: self.packet_count,
            max_packets_per_cts: MAX_CTS_WINDOW,
            pgn: self.pgn,
        };
        build_frame(TP_CM_PGN, self.source, Some(self.destination), 7, &message.to_payload())
    }

    /// Build the TP.DT frames a CTS grants (`next_packet`, up to `window`).
    pub fn frames_for_cts(&self, next_packet: u8, window: u8) -> Result<Vec<CanFrame>, IsoTransportError> {
        let mut frames = Vec::new();
        let last = (next_packet.saturating_add(window).saturating_sub(1)).min(self.packet_count);
        for packet in next_packet..=last {
            let offset = (packet - 1) as usize * 7;
            let copy_len = (self.payload.len() - offset).min(7);
            let mut data = [0xFFu8; 8];
            data[0] = packet;
            data[1..1 + copy_len].copy_from_slice(&self.payload[offset..offset + copy_len]);
            frames.push(build_frame(TP_DT_PGN, self.source, Some(self.destination), 7, &data)?);
        }
        Ok(frames)
    }

    pub fn abort_frame(&self, reason: AbortReason) -> Result<CanFrame, IsoTransportError> {
        let message = TpCm::Abort { pgn: self.pgn, reason };
        build_frame(TP_CM_PGN, self.source, Some(self.destination), 7, &message.to_payload())
    }

    pub fn end_of_message_ack_expected(&self) -> TpCm {
        TpCm::EndOfMsgAck {
            total_size: self.payload.len() as u16,
            packet_count: self.packet_count,
            pgn: self.pgn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bam_round_trip_100_bytes() {
        let payload: Vec<u8> = (0..100u16).map(|v| (v % 256) as u8).collect();
        let sender = BamSender::new(129_540, 10, &payload).unwrap();
        assert_eq!(sender.packet_count, 15); // ceil(100/7)

        let control = sender.control_frame().unwrap();
        let cm = TpCm::parse(&control.data).unwrap();
        let (total_size, packet_count) = match cm {
            TpCm::Bam { total_size, packet_count, pgn } => {
                assert_eq!(pgn, 129_540);
                (total_size, packet_count)
            }
            other => panic!("expected BAM, got {other:?}"),
        };
        assert_eq!(total_size as usize, payload.len());

        let mut receiver = IsoTransportReceiver::new();
        let outcome = receiver.process_cm(10, 255, &control.data, 0);
        assert_eq!(outcome, ReceiveOutcome::SessionOpened);

        let mut complete = None;
        for (i, frame_result) in sender.enumerate() {
            let frame = frame_result.unwrap();
            let outcome = receiver.process_dt(10, 255, &frame.data, (i as u64 + 1) * BAM_MIN_PACING_MS);
            if let ReceiveOutcome::MessageComplete { pgn, payload: reassembled, .. } = outcome {
                assert_eq!(pgn, 129_540);
                assert_eq!(reassembled, payload);
                complete = Some(());
            }
        }
        assert!(complete.is_some(), "BAM transfer must reassemble fully");
        let _ = packet_count;
    }

    #[test]
    fn new_rts_aborts_prior_session_for_same_key() {
        let mut receiver = IsoTransportReceiver::new();
        let first_rts = TpCm::Rts {
            total_size: 50,
            packet_count: 8,
            max_packets_per_cts: MAX_CTS_WINDOW,
            pgn: 126_998,
        }
        .to_payload();
        let outcome = receiver.process_cm(20, 30, &first_rts, 0);
        assert!(matches!(outcome, ReceiveOutcome::CtsRequired { .. }));

        let second_rts = first_rts; // identical key: same (source, destination, pgn)
        let outcome = receiver.process_cm(20, 30, &second_rts, 10);
        assert!(matches!(outcome, ReceiveOutcome::CtsRequired { .. }));
    }

    #[test]
    fn expiry_sweeps_sessions_past_t1_deadline() {
        let mut receiver = IsoTransportReceiver::new();
        let bam = TpCm::Bam { total_size: 20, packet_count: 3, pgn: 127_250 }.to_payload();
        receiver.process_cm(5, 255, &bam, 0);

        let first_dt = [1u8, 1, 2, 3, 4, 5, 6, 7];
        receiver.process_dt(5, 255, &first_dt, 10);

        let expired = receiver.expire_stale_sessions(10 + T1_MS + 1);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0], (127_250, 5));
    }

    #[test]
    fn tp_cm_abort_round_trips_reason_code() {
        let message = TpCm::Abort { pgn: 130_824, reason: AbortReason::Busy };
        let data = message.to_payload();
        let parsed = TpCm::parse(&data).unwrap();
        assert_eq!(parsed, message);
    }
}
