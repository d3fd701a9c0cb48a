//! Ensure Fast Packet PGNs perform a full round-trip correctly.
use korri_router::core::{PgnBytes, PgnValue};
use korri_router::dictionary::PgnDictionary;
use korri_router::infra::codec::traits::{FieldAccess, PgnData};
use korri_router::protocol::messages::DecodedFields;
use korri_router::protocol::transport::fast_packet::{
    assembler::{FastPacketAssembler, ProcessResult},
    builder::FastPacketBuilder,
};

#[test]
fn test_pgn_129040_fast_packet_roundtrip() {
    // Serialize → segment → reassemble → deserialize and compare to original values.
    let dictionary = PgnDictionary::bundled().unwrap();
    let descriptor = dictionary.lookup_pgn(129040).expect("129040 must be known");

    let mut ais = DecodedFields::empty(descriptor.clone());
    ais.field_mut("UserId", PgnValue::U32(123_456_789));
    ais.field_mut("Latitude", PgnValue::F32(48.8566));
    ais.field_mut("Longitude", PgnValue::F32(2.3522));

    let mut buffer = [0u8; 64];
    let len = ais.to_payload(&mut buffer).expect("serialize PGN 129040");
    assert!(
        len > 8,
        "PGN 129040 should generate a Fast Packet; current length: {len}"
    );

    let builder = FastPacketBuilder::new(129040, 42, None, &buffer[..len]);
    let mut frames = builder.build();

    let mut assembler = FastPacketAssembler::new();
    let mut complete = None;
    let mut frame_count = 0;

    while let Some(frame_result) = frames.next() {
        let frame = frame_result.expect("frame build");
        frame_count += 1;

        if let ProcessResult::MessageComplete(msg) = assembler.process_frame(42, &frame.data) {
            complete = Some(msg);
            break;
        }
    }

    let message = complete.expect("message complet");
    assert_eq!(message.len, len);
    assert_eq!(&message.payload[..len], &buffer[..len]);

    let decoded = DecodedFields::decode(descriptor.clone(), &message.payload[..message.len])
        .expect("decode reassembled PGN");

    assert_eq!(decoded.field("UserId"), Some(PgnValue::U32(123_456_789)));
    match (decoded.field("Latitude"), decoded.field("Longitude")) {
        (Some(PgnValue::F32(lat)), Some(PgnValue::F32(lon))) => {
            assert!((lat - 48.8566).abs() < 1e-6);
            assert!((lon - 2.3522).abs() < 1e-6);
        }
        other => panic!("unexpected decoded position: {other:?}"),
    }
    assert!(
        frame_count >= 2,
        "A Fast Packet must generate multiple frames"
    );
}

#[test]
fn test_pgn_126996_fast_packet_roundtrip() {
    // PGN 126996 carries several fixed ASCII strings (32 bytes each).
    // Verify serialization preserves size, padding, and metadata ordering.
    let dictionary = PgnDictionary::bundled().unwrap();
    let descriptor = dictionary.lookup_pgn(126996).expect("126996 must be known");

    fn ascii_field(text: &[u8]) -> PgnValue {
        let mut bytes = PgnBytes::new();
        let len = text.len().min(bytes.data.len());
        bytes.len = len;
        bytes.data[..len].copy_from_slice(&text[..len]);
        PgnValue::Bytes(bytes)
    }

    let mut product = DecodedFields::empty(descriptor.clone());
    product.field_mut("Nmea2000Version", PgnValue::F32(2.005));
    product.field_mut("ProductCode", PgnValue::U16(0x42AF));
    product.field_mut("ModelId", ascii_field(b"KORRI-N2K CORE"));
    product.field_mut(
        "SoftwareVersionCode",
        ascii_field(b"v0.1.0-alpha+20251009"),
    );
    product.field_mut("ModelVersion", ascii_field(b"rev-A"));
    product.field_mut("ModelSerialCode", ascii_field(b"SN-123456789ABCDEF"));
    product.field_mut("CertificationLevel", PgnValue::U8(2));
    product.field_mut("LoadEquivalency", PgnValue::U8(12));

    let mut buffer = [0u8; 256];
    let len = product
        .to_payload(&mut buffer)
        .expect("serialize PGN 126996");

    assert_eq!(len, 134, "PGN 126996 must occupy 134 bytes");
    assert!(
        len > 8,
        "PGN 126996 should produce a Fast Packet; current length: {len}"
    );

    let builder = FastPacketBuilder::new(126996, 35, None, &buffer[..len]);
    let mut frames = builder.build();
    let mut assembler = FastPacketAssembler::new();
    let mut complete = None;
    let mut frame_count = 0;

    while let Some(frame_result) = frames.next() {
        let frame = frame_result.expect("frame build");
        frame_count += 1;

        if let ProcessResult::MessageComplete(msg) = assembler.process_frame(35, &frame.data) {
            complete = Some(msg);
            break;
        }
    }

    assert!(
        frame_count >= 2,
        "Fast Packet 126996 should generate multiple frames (observed: {frame_count})"
    );

    let message = complete.expect("message complet");
    assert_eq!(message.len, len);
    assert_eq!(&message.payload[..len], &buffer[..len]);

    let decoded = DecodedFields::decode(descriptor.clone(), &message.payload[..message.len])
        .expect("decode reassembled PGN 126996");

    match decoded.field("Nmea2000Version") {
        Some(PgnValue::F32(v)) => assert!((v - 2.005).abs() < 1e-6, "NMEA 2000 version must be preserved"),
        other => panic!("unexpected version value: {other:?}"),
    }
    assert_eq!(decoded.field("ProductCode"), Some(PgnValue::U16(0x42AF)));
    assert_eq!(decoded.field("CertificationLevel"), Some(PgnValue::U8(2)));
    assert_eq!(decoded.field("LoadEquivalency"), Some(PgnValue::U8(12)));
    assert_eq!(decoded.field("ModelId"), product.field("ModelId"));
    assert_eq!(
        decoded.field("SoftwareVersionCode"),
        product.field("SoftwareVersionCode")
    );
    assert_eq!(decoded.field("ModelVersion"), product.field("ModelVersion"));
    assert_eq!(
        decoded.field("ModelSerialCode"),
        product.field("ModelSerialCode")
    );
}

#[test]
fn test_pgn_126998_fast_packet_roundtrip() {
    fn lau_field(ascii: &[u8]) -> PgnValue {
        let mut bytes = PgnBytes::new();
        let max_len = bytes.data.len().saturating_sub(1);
        let copy_len = ascii.len().min(max_len);
        bytes.len = copy_len + 1;
        bytes.data[0] = 1; // ASCII encoding
        if copy_len > 0 {
            bytes.data[1..1 + copy_len].copy_from_slice(&ascii[..copy_len]);
        }
        PgnValue::Bytes(bytes)
    }

    let dictionary = PgnDictionary::bundled().unwrap();
    let descriptor = dictionary.lookup_pgn(126998).expect("126998 must be known");

    let mut config = DecodedFields::empty(descriptor.clone());
    config.field_mut(
        "InstallationDescription1",
        lau_field(b"Korri Sensor Suite - Starboard installation"),
    );
    config.field_mut(
        "InstallationDescription2",
        lau_field(b"Firmware configured via korri-diag 1.2.3"),
    );
    config.field_mut(
        "ManufacturerInformation",
        lau_field(b"Korri Marine Systems - Support +33 1 23 45 67 89"),
    );

    let mut buffer = [0u8; 256];
    let len = config
        .to_payload(&mut buffer)
        .expect("serialize PGN 126998");
    assert!(len > 8, "PGN 126998 must be encoded as a Fast Packet");

    let builder = FastPacketBuilder::new(126998, 77, None, &buffer[..len]);
    let mut frames = builder.build();
    let mut assembler = FastPacketAssembler::new();
    let mut complete = None;

    while let Some(frame_result) = frames.next() {
        let frame = frame_result.expect("frame build");
        if let ProcessResult::MessageComplete(msg) = assembler.process_frame(77, &frame.data) {
            complete = Some(msg);
            break;
        }
    }

    let message = complete.expect("complete message 126998");
    assert_eq!(message.len, len);
    assert_eq!(&message.payload[..len], &buffer[..len]);

    let decoded = DecodedFields::decode(descriptor.clone(), &message.payload[..message.len])
        .expect("decode reassembled PGN 126998");

    assert_eq!(
        decoded.field("InstallationDescription1"),
        config.field("InstallationDescription1")
    );
    assert_eq!(
        decoded.field("InstallationDescription2"),
        config.field("InstallationDescription2")
    );
    assert_eq!(
        decoded.field("ManufacturerInformation"),
        config.field("ManufacturerInformation")
    );
}
