//! Ensure non-byte-aligned fields (e.g. the 19-bit `CommunicationState` field
//! shared by PGNs 129038/129039) round-trip correctly through the engine.

use korri_router::core::{FieldDescriptor, FieldKind, PgnDescriptor, PgnValue};
use korri_router::infra::codec::traits::{FieldAccess, PgnData};
use korri_router::protocol::messages::DecodedFields;

fn descriptor_with_communication_state(id: u32, name: &str) -> PgnDescriptor {
    PgnDescriptor {
        id,
        name: name.to_string(),
        description: name.to_string(),
        priority: Some(4),
        fastpacket: true,
        length: None,
        field_count: Some(1),
        trans_interval: None,
        trans_irregular: true,
        fields: vec![FieldDescriptor {
            id: "CommunicationState".to_string(),
            name: "Communication State".to_string(),
            kind: FieldKind::Number,
            bits_length: Some(19),
            bits_length_var: None,
            bits_offset: Some(0),
            is_signed: Some(false),
            resolution: None,
            enum_direct_name: None,
            enum_indirect_name: None,
            enum_indirect_field_order: None,
            physical_unit: None,
            physical_qtity: None,
        }],
        repeating_field_sets: vec![],
    }
}

#[test]
fn test_pgn_129038_generation() {
    let descriptor = descriptor_with_communication_state(129038, "AIS_CLASS_A_POSITION_REPORT");
    let pgn = DecodedFields::empty(descriptor);

    // `CommunicationState` must round-trip through a 32-bit reader despite its 19-bit width.
    assert_eq!(pgn.field("CommunicationState"), None);
}

#[test]
fn test_pgn_129039_generation() {
    let descriptor = descriptor_with_communication_state(129039, "AIS_CLASS_B_POSITION_REPORT");
    let mut pgn = DecodedFields::empty(descriptor.clone());
    pgn.field_mut("CommunicationState", PgnValue::U32(0x7_3A5C));

    let mut buffer = [0u8; 3];
    let len = pgn.to_payload(&mut buffer).expect("19-bit field must serialize");

    let decoded = DecodedFields::decode(descriptor, &buffer[..len]).expect("19-bit field must decode");
    assert_eq!(decoded.field("CommunicationState"), Some(PgnValue::U32(0x7_3A5C)));
}
