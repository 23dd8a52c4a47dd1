//! Background server launch, readiness and shutdown

mod common;

use std::time::Duration;

use mlflow_bridge::server::{run_blocking, DEFAULT_READY_TIMEOUT, STOP_SERVER};
use mlflow_bridge::{
    with_server, with_server_timeout, BridgeError, ConfigBlob, Server, ServerState, Settings,
};

fn server_config(address: &str) -> ConfigBlob {
    ConfigBlob::default()
        .with_address(address)
        .with_shutdown_timeout(Duration::from_secs(5))
}

#[test]
fn test_server_starts_and_stops() {
    common::reset_hooks();
    let address = common::free_address();

    let server = Server::start(common::library(), server_config(&address)).unwrap();
    assert!(server.id().unwrap() >= 0);
    assert_eq!(server.state(), ServerState::Starting);

    server.wait_until_ready(DEFAULT_READY_TIMEOUT).unwrap();
    assert_eq!(server.state(), ServerState::Running);

    server.stop().unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(common::stop_calls(), 1);

    // already stopped
    server.stop().unwrap();
    drop(server);
    assert_eq!(common::stop_calls(), 1);
}

#[test]
fn test_failed_launch_never_stops() {
    common::reset_hooks();
    let library = common::library_with(&[("LaunchServerAsync", common::launch_fails as *const ())]);

    let err = Server::start(library.clone(), server_config("127.0.0.1:1")).unwrap_err();
    match err {
        BridgeError::Launch { operation, code } => {
            assert_eq!(operation, "LaunchServerAsync");
            assert_eq!(code, -3);
        }
        other => panic!("expected a launch error, got {:?}", other),
    }

    let server = Server::new(library, server_config("127.0.0.1:1"));
    assert!(server.launch().is_err());
    assert_eq!(server.state(), ServerState::FailedToStart);
    assert_eq!(server.id(), None);
    server.stop().unwrap();
    drop(server);

    assert_eq!(common::stop_calls(), 0);
}

#[test]
fn test_server_stopped_on_drop() {
    common::reset_hooks();
    let address = common::free_address();

    {
        let server = Server::start(common::library(), server_config(&address)).unwrap();
        server.wait_until_ready(DEFAULT_READY_TIMEOUT).unwrap();
    }
    assert_eq!(common::stop_calls(), 1);
}

#[test]
fn test_stop_failure_is_reported_once() {
    common::reset_hooks();
    let library = common::library_with(&[(STOP_SERVER, common::stop_fails as *const ())]);
    let address = common::free_address();

    let server = Server::start(library, server_config(&address)).unwrap();
    match server.stop() {
        Err(BridgeError::Shutdown { code }) => assert_eq!(code, 7),
        other => panic!("expected a shutdown error, got {:?}", other),
    }
    assert_eq!(server.state(), ServerState::Stopped);

    drop(server);
    assert_eq!(common::stop_calls(), 1);
}

#[test]
fn test_ready_timeout() {
    common::reset_hooks();
    let address = common::free_address();

    let server = Server::start(common::library(), server_config(&address)).unwrap();
    // the reference server waits before listening
    match server.wait_until_ready(Duration::from_millis(50)) {
        Err(BridgeError::NotReady { address: reported, .. }) => assert_eq!(reported, address),
        other => panic!("expected a readiness timeout, got {:?}", other),
    }
    assert_eq!(server.state(), ServerState::Starting);
    server.stop().unwrap();
}

#[test]
fn test_launch_twice_is_rejected() {
    let address = common::free_address();
    let server = Server::start(common::library(), server_config(&address)).unwrap();

    assert!(matches!(server.launch(), Err(BridgeError::Config(_))));
    server.stop().unwrap();
}

#[test]
fn test_with_server_stops_afterwards() {
    common::reset_hooks();
    let address = common::free_address();

    let reported = with_server(common::library(), server_config(&address), |server| {
        assert_eq!(server.state(), ServerState::Running);
        server.config().address.clone()
    })
    .unwrap();

    assert_eq!(reported.as_deref(), Some(address.as_str()));
    assert_eq!(common::stop_calls(), 1);
}

#[test]
fn test_ready_timeout_from_settings() {
    common::reset_hooks();
    let address = common::free_address();
    let settings = Settings::parse("[server]\nready_timeout = \"50ms\"\n").unwrap();
    assert_eq!(settings.ready_timeout(), Duration::from_millis(50));

    let result: mlflow_bridge::Result<()> = with_server_timeout(
        common::library(),
        server_config(&address),
        settings.ready_timeout(),
        |_| unreachable!("server was never ready"),
    );

    assert!(matches!(result, Err(BridgeError::NotReady { .. })), "{:?}", result);
    assert_eq!(common::stop_calls(), 1);
}

#[test]
fn test_run_blocking() {
    let library = common::library();
    run_blocking(&library, &server_config("127.0.0.1:5000")).unwrap();

    match run_blocking(&library, &ConfigBlob::default()) {
        Err(BridgeError::Launch { operation, code }) => {
            assert_eq!(operation, "LaunchServer");
            assert_eq!(code, -1);
        }
        other => panic!("expected a launch error, got {:?}", other),
    }
}
