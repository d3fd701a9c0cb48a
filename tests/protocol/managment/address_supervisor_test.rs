mod helpers {
    include!("../../helpers/mod.rs");
}

use helpers::{MockCanBus, MockTimer};
use korri_router::core::PgnValue;
use korri_router::dictionary::PgnDictionary;
use korri_router::infra::codec::traits::FieldAccess;
use korri_router::protocol::managment::address_manager::AddressManager;
use korri_router::protocol::managment::address_supervisor::AddressService;
use korri_router::protocol::messages::DecodedFields;
use korri_router::protocol::transport::traits::can_bus::CanBus;
use tokio::time::Duration;

#[tokio::test]
async fn supervisor_queues_and_sends_pgn() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let timer = MockTimer;
    let my_name = 0x1234_5678_90AB_CDEF;
    let preferred = 142u8;

    let manager = AddressManager::new(dut_bus, timer, my_name, preferred)
        .await
        .expect("claim must succeed");

    let service = AddressService::new(manager, Some(4), None);
    let parts = service.into_parts();
    let handle = parts
        .handle
        .expect("handle must exist when command channel is provided");
    let mut runner_future = Box::pin(parts.runner.drive());

    tokio::select! {
        result = &mut runner_future => {
            panic!("supervisor ended unexpectedly: {:?}", result);
        }
        _ = async {
            let claim_frame = host_bus
                .recv()
                .await
                .expect("supervisor must issue a claim frame");
            assert_eq!(claim_frame.id.pgn(), 60928);
            assert_eq!(claim_frame.id.source_address(), preferred);

            tokio::time::sleep(Duration::from_millis(300)).await;

            let dict = PgnDictionary::bundled().unwrap();
            let descriptor = dict.lookup_pgn(129025).unwrap().clone();
            let mut position = DecodedFields::empty(descriptor);
            position.field_mut("Latitude", PgnValue::F32(47.6));
            position.field_mut("Longitude", PgnValue::F32(-3.1));

            handle
                .send_pgn(&position, 129025, 2, None)
                .await
                .expect("queueing PGN must succeed");

            let payload_frame = host_bus
                .recv()
                .await
                .expect("PGN frame expected on CAN bus");
            assert_eq!(payload_frame.id.pgn(), 129025);
            assert_eq!(payload_frame.id.source_address(), preferred);
        } => {}
    }
}
