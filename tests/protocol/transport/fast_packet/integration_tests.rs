//! Advanced integration tests for the NMEA 2000 Fast Packet implementation.
//!
//! This module covers validation phases 2, 3, and 4:
//! - Phase 2: Round-trip tests with real PGNs
//! - Phase 3: Edge cases (timeouts, sequences, network errors)
//! - Phase 4: Performance and stress tests
//!
//! Each test follows the pattern: serialize → fragment → assemble → deserialize → compare.

use korri_router::core::PgnValue;
use korri_router::dictionary::PgnDictionary;
use korri_router::infra::codec::traits::{FieldAccess, PgnData};
use korri_router::protocol::messages::DecodedFields;
use korri_router::protocol::transport::fast_packet::{
    assembler::{FastPacketAssembler, ProcessResult},
    builder::FastPacketBuilder,
};

//==================================================================================
// PHASE 2: TESTS WITH REAL PGNS
//==================================================================================

#[test]
/// Validate a full round-trip for PGN 129029 (GNSS Position Data).
///
/// This PGN carries enough fields to require multiple Fast Packet frames.
/// The test checks that GPS data (latitude, longitude, altitude) is properly
/// fragmented and reassembled.
fn test_roundtrip_pgn_129029() {
    let dictionary = PgnDictionary::bundled().unwrap();
    let descriptor = dictionary.lookup_pgn(129029).expect("129029 must be known");

    // Create a GNSS message with realistic coordinates (Paris, France)
    let mut gnss = DecodedFields::empty(descriptor.clone());
    gnss.field_mut("Latitude", PgnValue::F64(48.8566));
    gnss.field_mut("Longitude", PgnValue::F64(2.3522));
    gnss.field_mut("Altitude", PgnValue::F64(35.0));

    let mut buffer = [0u8; 64];
    let len = gnss
        .to_payload(&mut buffer)
        .expect("PGN 129029 serialization should succeed");

    assert!(
        len > 8,
        "PGN 129029 must generate a Fast Packet; current length: {len}"
    );

    let builder = FastPacketBuilder::new(129029, 42, None, &buffer[..len]);
    let mut frames = builder.build();

    let mut assembler = FastPacketAssembler::new();
    let mut complete = None;
    let mut frame_count = 0;

    while let Some(frame_result) = frames.next() {
        let frame = frame_result.expect("Frame construction should succeed");
        frame_count += 1;

        if let ProcessResult::MessageComplete(msg) = assembler.process_frame(42, &frame.data) {
            complete = Some(msg);
            break;
        }
    }

    let message = complete.expect("Message must be complete after processing");
    assert_eq!(message.len, len, "Reassembled message length must match");
    assert_eq!(
        &message.payload[..len],
        &buffer[..len],
        "Reassembled payload must match the original"
    );

    let decoded = DecodedFields::decode(descriptor.clone(), &message.payload[..message.len])
        .expect("Deserializing the reassembled message should succeed");

    const TOLERANCE: f64 = 1e-5;
    match decoded.field("Latitude") {
        Some(PgnValue::F64(v)) => assert!((v - 48.8566).abs() < TOLERANCE, "Latitude must be preserved"),
        other => panic!("unexpected latitude: {other:?}"),
    }
    match decoded.field("Longitude") {
        Some(PgnValue::F64(v)) => assert!((v - 2.3522).abs() < TOLERANCE, "Longitude must be preserved"),
        other => panic!("unexpected longitude: {other:?}"),
    }
    match decoded.field("Altitude") {
        Some(PgnValue::F64(v)) => assert!((v - 35.0).abs() < TOLERANCE, "Altitude must be preserved"),
        other => panic!("unexpected altitude: {other:?}"),
    }

    assert!(
        frame_count >= 2,
        "A Fast Packet must generate at least two frames"
    );
}

#[test]
/// Test interleaving of multiple PGNs transmitted simultaneously.
///
/// Simulates several sources emitting Fast Packets in parallel. The assembler must
/// demultiplex sessions and rebuild each message independently.
fn test_interleaved_multiple_pgns() {
    let dictionary = PgnDictionary::bundled().unwrap();
    let ais_descriptor = dictionary.lookup_pgn(129040).expect("129040 must be known");
    let gnss_descriptor = dictionary.lookup_pgn(129029).expect("129029 must be known");

    let mut ais = DecodedFields::empty(ais_descriptor.clone());
    ais.field_mut("UserId", PgnValue::U32(123_456_789));
    ais.field_mut("Latitude", PgnValue::F32(48.8566));

    let mut gnss = DecodedFields::empty(gnss_descriptor.clone());
    gnss.field_mut("Latitude", PgnValue::F64(45.5017)); // Montreal coordinates
    gnss.field_mut("Longitude", PgnValue::F64(-73.5673));
    gnss.field_mut("Altitude", PgnValue::F64(50.0));

    let mut buffer_ais = [0u8; 64];
    let len_ais = ais
        .to_payload(&mut buffer_ais)
        .expect("AIS serialization should succeed");

    let mut buffer_gnss = [0u8; 64];
    let len_gnss = gnss
        .to_payload(&mut buffer_gnss)
        .expect("GNSS serialization should succeed");

    assert!(len_ais > 8, "AIS must be a Fast Packet");
    assert!(len_gnss > 8, "GNSS must be a Fast Packet");

    let builder_ais = FastPacketBuilder::new(129040, 10, None, &buffer_ais[..len_ais]);
    let builder_gnss = FastPacketBuilder::new(129029, 20, None, &buffer_gnss[..len_gnss]);

    let mut frames_ais = builder_ais.build();
    let mut frames_gnss = builder_gnss.build();

    let mut assembler = FastPacketAssembler::new();
    let mut ais_complete = None;
    let mut gnss_complete = None;

    let mut ais_exhausted = false;
    let mut gnss_exhausted = false;

    loop {
        if !ais_exhausted {
            if let Some(frame_result) = frames_ais.next() {
                let frame = frame_result.expect("Valid AIS frame");
                if let ProcessResult::MessageComplete(msg) =
                    assembler.process_frame(10, &frame.data)
                {
                    ais_complete = Some(msg);
                }
            } else {
                ais_exhausted = true;
            }
        }

        if !gnss_exhausted {
            if let Some(frame_result) = frames_gnss.next() {
                let frame = frame_result.expect("Valid GNSS frame");
                if let ProcessResult::MessageComplete(msg) =
                    assembler.process_frame(20, &frame.data)
                {
                    gnss_complete = Some(msg);
                }
            } else {
                gnss_exhausted = true;
            }
        }

        if (ais_complete.is_some() && gnss_complete.is_some()) || (ais_exhausted && gnss_exhausted)
        {
            break;
        }
    }

    let msg_ais = ais_complete.expect("AIS message must be complete");
    let msg_gnss = gnss_complete.expect("GNSS message must be complete");

    let decoded_ais = DecodedFields::decode(ais_descriptor.clone(), &msg_ais.payload[..msg_ais.len])
        .expect("AIS deserialization should succeed");
    assert_eq!(decoded_ais.field("UserId"), Some(PgnValue::U32(123_456_789)));

    let decoded_gnss =
        DecodedFields::decode(gnss_descriptor.clone(), &msg_gnss.payload[..msg_gnss.len])
            .expect("GNSS deserialization should succeed");
    const TOLERANCE: f64 = 1e-5;
    match (decoded_gnss.field("Latitude"), decoded_gnss.field("Longitude")) {
        (Some(PgnValue::F64(lat)), Some(PgnValue::F64(lon))) => {
            assert!((lat - 45.5017).abs() < TOLERANCE);
            assert!((lon - (-73.5673)).abs() < TOLERANCE);
        }
        other => panic!("unexpected decoded GNSS fields: {other:?}"),
    }
}

//==================================================================================
// PHASE 3: EDGE CASES (ROBUSTNESS)
//==================================================================================

#[test]
/// Ensure the assembler handles sequence counter wrap-around.
///
/// The Fast Packet sequence counter uses three bits (0–7) and wraps around.
/// This test confirms the 7 → 0 transition succeeds.
fn test_assembler_sequence_wrap() {
    let mut assembler = FastPacketAssembler::new();
    let source = 42;

    // Complete message using sequence identifier 7 (upper bits)
    let frame_seq7: [u8; 8] = [0b111_00000, 15, 1, 2, 3, 4, 5, 6];
    let result = assembler.process_frame(source, &frame_seq7);
    assert!(
        matches!(result, ProcessResult::FragmentConsumed),
        "Frame with sequence 7 should be consumed"
    );

    let frame_seq7_cont: [u8; 8] = [0b111_00001, 7, 8, 9, 10, 11, 12, 13];
    let result = assembler.process_frame(source, &frame_seq7_cont);
    assert!(
        matches!(result, ProcessResult::FragmentConsumed),
        "Second frame with the same sequence should be accepted"
    );

    let frame_seq7_end: [u8; 8] = [0b111_00010, 14, 15, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
    let result = assembler.process_frame(source, &frame_seq7_end);

    assert!(
        matches!(result, ProcessResult::MessageComplete(_)),
        "Message should be complete with sequence identifier 7"
    );

    // New message: wrap sequence counter 7 → 0
    let frame_seq0_new: [u8; 8] = [0b000_00000, 9, 42, 43, 44, 45, 46, 47];
    let result = assembler.process_frame(source, &frame_seq0_new);
    assert!(
        matches!(result, ProcessResult::FragmentConsumed),
        "Next message with sequence 0 should be accepted after wrapping"
    );
}

#[test]
/// Verify behavior when frames arrive out of order.
///
/// Frames with incorrect sequence numbers must cause the assembler to drop the
/// current session and ignore fragments until a fresh start is detected.
fn test_assembler_out_of_order() {
    let mut assembler = FastPacketAssembler::new();
    let source = 50;

    let frame0: [u8; 8] = [0b000_00000, 20, 1, 2, 3, 4, 5, 6];
    let result = assembler.process_frame(source, &frame0);
    assert!(
        matches!(result, ProcessResult::FragmentConsumed),
        "First frame should be consumed"
    );

    let frame2: [u8; 8] = [0b000_00010, 14, 15, 16, 17, 18, 19, 20];
    let result = assembler.process_frame(source, &frame2);
    assert!(
        matches!(result, ProcessResult::Ignored),
        "Out-of-sequence frame should be ignored"
    );

    let new_frame0: [u8; 8] = [0b000_00000, 10, 100, 101, 102, 103, 104, 105];
    let result = assembler.process_frame(source, &new_frame0);
    assert!(
        matches!(result, ProcessResult::FragmentConsumed),
        "A new session should start after reset"
    );
}

#[test]
/// Test handling of partial messages (missing frames).
///
/// Simulate frame loss on the CAN bus. The assembler must detect the incorrect
/// sequence and drop the incomplete message.
fn test_assembler_partial_message() {
    let mut assembler = FastPacketAssembler::new();
    let source = 60;

    let frame0: [u8; 8] = [0b000_00000, 15, 1, 2, 3, 4, 5, 6];
    assembler.process_frame(source, &frame0);

    // Simulate loss of frame 1.
    let frame2: [u8; 8] = [0b000_00010, 14, 15, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
    let result = assembler.process_frame(source, &frame2);

    assert!(
        matches!(result, ProcessResult::Ignored),
        "Partial messages must be rejected"
    );
}

#[test]
/// Verify behavior when duplicate frames (CAN retransmissions) occur.
///
/// The CAN bus may retransmit a frame; the assembler must ignore duplicates or
/// handle them without data corruption.
fn test_assembler_duplicate_frame() {
    let mut assembler = FastPacketAssembler::new();
    let source = 70;

    let frame0: [u8; 8] = [0b000_00000, 10, 1, 2, 3, 4, 5, 6];
    let result1 = assembler.process_frame(source, &frame0);
    assert!(matches!(result1, ProcessResult::FragmentConsumed));

    let result2 = assembler.process_frame(source, &frame0);

    assert!(
        matches!(
            result2,
            ProcessResult::Ignored | ProcessResult::FragmentConsumed
        ),
        "Duplicate frames must be handled properly"
    );
}

#[test]
/// Exercise the concurrent session limit (pool saturation).
///
/// The assembler supports a limited number of concurrent sessions; additional
/// sessions must be rejected.
fn test_assembler_max_sessions() {
    let mut assembler = FastPacketAssembler::new();

    for source_addr in 1..=4 {
        let frame: [u8; 8] = [0b000_00000, 20, source_addr, 0, 0, 0, 0, 0];
        let result = assembler.process_frame(source_addr, &frame);
        assert!(
            matches!(result, ProcessResult::FragmentConsumed),
            "Session {source_addr} should be accepted"
        );
    }

    let frame5: [u8; 8] = [0b000_00000, 20, 5, 0, 0, 0, 0, 0];
    let result = assembler.process_frame(5, &frame5);

    assert!(
        matches!(result, ProcessResult::Ignored),
        "The fifth session must be rejected (pool saturated)"
    );
}

//==================================================================================
// PHASE 4: PERFORMANCE AND STRESS TESTS
//==================================================================================

#[test]
/// Stress test: process 100 PGNs in a row to validate stability.
///
/// Confirms the assembler can tolerate continuous traffic without leaks, corruption,
/// or panics.
fn test_stress_100_pgns() {
    let dictionary = PgnDictionary::bundled().unwrap();
    let descriptor = dictionary.lookup_pgn(129040).expect("129040 must be known");
    let mut assembler = FastPacketAssembler::new();

    for i in 0..100u32 {
        let source = (i % 4) as u8; // Rotate across four sources

        let mut ais = DecodedFields::empty(descriptor.clone());
        ais.field_mut("UserId", PgnValue::U32(1_000_000 + i));
        ais.field_mut("Latitude", PgnValue::F32(45.0 + (i as f32 * 0.01)));

        let mut buffer = [0u8; 64];
        let len = ais.to_payload(&mut buffer).expect("Serialization succeeded");

        let builder = FastPacketBuilder::new(129040, source, None, &buffer[..len]);
        let mut frames = builder.build();

        while let Some(frame_result) = frames.next() {
            let frame = frame_result.expect("Valid frame");
            let result = assembler.process_frame(source, &frame.data);

            if let ProcessResult::MessageComplete(msg) = result {
                assert_eq!(msg.len, len);

                let decoded = DecodedFields::decode(descriptor.clone(), &msg.payload[..msg.len])
                    .expect("Deserialization succeeded");

                assert_eq!(decoded.field("UserId"), Some(PgnValue::U32(1_000_000 + i)));
            }
        }
    }
}

#[test]
/// Throughput benchmark: measure frames per set.
///
/// Serves as a performance indicator for the assembler and helps spot regressions.
fn test_builder_throughput() {
    let dictionary = PgnDictionary::bundled().unwrap();
    let descriptor = dictionary.lookup_pgn(129040).expect("129040 must be known");

    let mut ais = DecodedFields::empty(descriptor.clone());
    ais.field_mut("UserId", PgnValue::U32(987_654_321));

    let mut buffer = [0u8; 64];
    let len = ais.to_payload(&mut buffer).expect("Serialization");

    let iterations = 1000;
    let mut total_frames = 0;

    for _ in 0..iterations {
        let builder = FastPacketBuilder::new(129040, 42, None, &buffer[..len]);
        let frames: Vec<_> = builder.build().collect();
        total_frames += frames.len();
    }

    assert!(
        total_frames > 0,
        "At least one frame must be generated per iteration"
    );
    println!("Throughput test: {total_frames} frames generated over {iterations} iterations");
}

#[test]
/// Check the assembler memory footprint.
///
/// The assembler must have a fixed, predictable size with no heap allocation.
fn test_assembler_memory_footprint() {
    use std::mem::size_of;

    let _assembler = FastPacketAssembler::new();
    let size = size_of::<FastPacketAssembler>();

    const MAX_SIZE_BYTES: usize = 8 * 1024;

    assert!(
        size < MAX_SIZE_BYTES,
        "Assembler must remain compact: {size} bytes (max: {MAX_SIZE_BYTES})"
    );

    println!("FastPacketAssembler memory footprint: {size} bytes");
}
