use mediasync_infra::init_telemetry;

#[test]
fn telemetry_installs_once() {
    init_telemetry("mediasync-test", "test", true).unwrap();
    tracing::info!("subscriber installed");

    assert!(init_telemetry("mediasync-test", "test", false).is_err());
}
