//! # Quickstart Example
//!
//! Minimal example demonstrating the basics of korri-router:
//! - Build an ISO Name
//! - Look up a PGN descriptor from the bundled dictionary and serialize it
//! - Deserialize an incoming payload against a descriptor
//!
//! This example uses `std` for a quick trial run.
//!
//! ```bash
//! cargo run --example quickstart
//! ```

use korri_router::core::PgnValue;
use korri_router::dictionary::PgnDictionary;
use korri_router::infra::codec::traits::{FieldAccess, PgnData};
use korri_router::protocol::managment::iso_name::IsoName;
use korri_router::protocol::messages::DecodedFields;
use korri_router::protocol::transport::can_id::CanId;

fn main() {
    println!("=== korri-router Quickstart ===\n");

    // ======================================================================
    // 1. Create an ISO Name identity
    // ======================================================================
    println!("1. Building an ISO Name");

    let iso_name = IsoName::builder()
        .unique_number(12345) // Unique serial number
        .manufacturer_code(229) // Manufacturer code (e.g. Garmin)
        .device_function(145) // Function: GPS
        .device_class(75) // Class: Navigation
        .industry_group(4) // Group: Marine
        .arbitrary_address_capable(true) // Eligible for arbitrary address selection
        .build();

    println!("   ISO Name: {}", iso_name);
    println!("   Manufacturer: {}", iso_name.manufacturer_code());
    println!("   Function: {}", iso_name.device_function());
    println!("   Marine: {}\n", iso_name.is_marine());

    let dictionary = PgnDictionary::bundled().expect("bundled dictionary must load");

    // ======================================================================
    // 2. Create and serialize a GPS position message (PGN 129025)
    // ======================================================================
    println!("2. Building a GPS position message (PGN 129025)");

    let position_descriptor = dictionary.lookup_pgn(129_025).expect("129025 is in the bundled dictionary");
    let mut position = DecodedFields::empty(position_descriptor.clone());
    position.field_mut("Latitude", PgnValue::F32(47.7223));
    position.field_mut("Longitude", PgnValue::F32(-4.0022));

    println!("   Position: 47.7223N, 4.0022W");

    let mut buffer = [0u8; 64];
    match position.to_payload(&mut buffer) {
        Ok(len) => {
            println!("   Serialized: {} bytes", len);
            print!("   Payload: ");
            for byte in &buffer[..len] {
                print!("{:02X} ", byte);
            }
            println!("\n");
        }
        Err(e) => {
            eprintln!("   Serialization error: {:?}\n", e);
        }
    }

    // ======================================================================
    // 3. Deserialize a vessel heading message (PGN 127250)
    // ======================================================================
    println!("3. Deserializing a vessel heading message (PGN 127250)");

    let heading_descriptor = dictionary.lookup_pgn(127_250).expect("127250 is in the bundled dictionary");
    // SID 7, heading 1.2340 rad (resolution 0.0001 rad), no deviation/variation, true reference.
    let heading_payload = [0x07, 0x5A, 0x30, 0x00, 0x00, 0x00, 0x00, 0x00];

    match DecodedFields::decode(heading_descriptor.clone(), &heading_payload) {
        Ok(heading) => {
            println!("   Sid: {:?}", heading.field("Sid"));
            println!("   Heading: {:?} rad\n", heading.field("Heading"));
        }
        Err(e) => {
            eprintln!("   Deserialization error: {:?}\n", e);
        }
    }

    // ======================================================================
    // 4. ISO Name <-> PGN 60928 (Address Claim)
    // ======================================================================
    println!("4. ISO Name <-> PGN 60928 (Address Claim)");

    let claim_descriptor = dictionary.lookup_pgn(60_928).expect("60928 is in the bundled dictionary");
    let mut claim = DecodedFields::empty(claim_descriptor.clone());
    claim.field_mut("UniqueNumber", PgnValue::U64(iso_name.raw()));
    println!("   PGN 60928 built from ISO Name");

    let restored_raw = claim.field("UniqueNumber").and_then(|v| v.as_u64()).expect("UniqueNumber was set");
    let iso_name_restored = IsoName::from_raw(restored_raw);
    println!("   ISO Name restored from PGN 60928");
    println!("   Match: {}\n", iso_name.raw() == iso_name_restored.raw());

    // ======================================================================
    // 5. Build a complete CAN ID
    // ======================================================================
    println!("5. Building a CAN ID");

    let can_id = CanId::builder(129025, 42) // PGN and source address
        .with_priority(2) // Priority 2 (navigation)
        .build()
        .expect("valid CAN ID");

    println!("   CAN ID: 0x{:08X}", can_id.0);
    println!("   Priority: {}", can_id.priority());
    println!("   PGN: {}", can_id.pgn());
    println!("   Source: {}", can_id.source_address());
    println!("   Destination: {:?}\n", can_id.destination());

    // ======================================================================
    println!("Quickstart complete.");
    println!("\nFull documentation:");
    println!("  https://docs.rs/korri-router");
}
