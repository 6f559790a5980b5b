//! Session state machine tests against a scripted transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use gesture_control_rust::infrastructure::bluetooth::protocol;
use gesture_control_rust::{
    BleError, BleSessionManager, BleTransport, DeviceAddress, DiscoveredDevice, GattCharacteristic,
    GattService, Gesture, GestureDispatcher, MessageSeverity, SessionCommand, SessionConfig,
    SessionEvent, SessionState, TransportEvent,
};

const GLOVE_ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

#[derive(Default)]
struct CallLog {
    start_scan: usize,
    stop_scan: usize,
    connects: Vec<String>,
    subscribes: usize,
    disconnects: usize,
}

/// Transport double: records every call and returns scripted results.
struct MockTransport {
    log: Arc<Mutex<CallLog>>,
    services: Vec<GattService>,
    fail_connect: Option<BleError>,
    fail_subscribe: Option<BleError>,
}

impl MockTransport {
    fn healthy() -> Self {
        Self {
            log: Arc::new(Mutex::new(CallLog::default())),
            services: glove_services(),
            fail_connect: None,
            fail_subscribe: None,
        }
    }

    fn with_services(services: Vec<GattService>) -> Self {
        Self {
            services,
            ..Self::healthy()
        }
    }

    fn failing_connect(err: BleError) -> Self {
        Self {
            fail_connect: Some(err),
            ..Self::healthy()
        }
    }

    fn failing_subscribe(err: BleError) -> Self {
        Self {
            fail_subscribe: Some(err),
            ..Self::healthy()
        }
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn start_scan(&mut self) -> Result<(), BleError> {
        self.log.lock().unwrap().start_scan += 1;
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), BleError> {
        self.log.lock().unwrap().stop_scan += 1;
        Ok(())
    }

    async fn connect(&mut self, address: &DeviceAddress) -> Result<(), BleError> {
        self.log.lock().unwrap().connects.push(address.to_string());
        match self.fail_connect.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn discover_services(&mut self) -> Result<Vec<GattService>, BleError> {
        Ok(self.services.clone())
    }

    async fn subscribe(&mut self, _service: Uuid, _characteristic: Uuid) -> Result<(), BleError> {
        self.log.lock().unwrap().subscribes += 1;
        match self.fail_subscribe.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn disconnect(&mut self) -> Result<(), BleError> {
        self.log.lock().unwrap().disconnects += 1;
        Ok(())
    }
}

fn glove_services() -> Vec<GattService> {
    vec![GattService {
        uuid: protocol::SERVICE_UUID,
        characteristics: vec![GattCharacteristic {
            uuid: protocol::VALUE_CHAR_UUID,
            notifiable: true,
        }],
    }]
}

fn advertisement(name: &str, address: &str) -> DiscoveredDevice {
    DiscoveredDevice {
        name: name.to_string(),
        address: DeviceAddress::from(address),
        rssi: Some(-42),
    }
}

struct Harness {
    commands: mpsc::UnboundedSender<SessionCommand>,
    transport_events: mpsc::UnboundedSender<TransportEvent>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    log: Arc<Mutex<CallLog>>,
}

fn spawn_session(mock: MockTransport, dispatcher: GestureDispatcher, config: SessionConfig) -> Harness {
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let (session_tx, session_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let log = mock.log.clone();
    let manager =
        BleSessionManager::new(mock, protocol::default_target(), config, session_tx, dispatcher);
    tokio::spawn(manager.run(command_rx, transport_rx));

    Harness {
        commands: command_tx,
        transport_events: transport_tx,
        events: session_rx,
        log,
    }
}

async fn expect_state(harness: &mut Harness, want: SessionState) -> String {
    loop {
        let event = timeout(Duration::from_secs(2), harness.events.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for state {:?}", want))
            .expect("session event channel closed");
        if let SessionEvent::StateChanged { state, message } = event {
            if state == want {
                return message;
            }
        }
    }
}

async fn expect_failure(harness: &mut Harness) -> BleError {
    loop {
        let event = timeout(Duration::from_secs(2), harness.events.recv())
            .await
            .expect("timed out waiting for failure")
            .expect("session event channel closed");
        if let SessionEvent::Failed(err) = event {
            return err;
        }
    }
}

async fn expect_warning(harness: &mut Harness) -> String {
    loop {
        let event = timeout(Duration::from_secs(2), harness.events.recv())
            .await
            .expect("timed out waiting for warning")
            .expect("session event channel closed");
        if let SessionEvent::LogMessage(status) = event {
            if status.severity == MessageSeverity::Warning {
                return status.message;
            }
        }
    }
}

async fn expect_notification(harness: &mut Harness) -> (Option<Gesture>, String) {
    loop {
        let event = timeout(Duration::from_secs(2), harness.events.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("session event channel closed");
        if let SessionEvent::Notification { gesture, raw } = event {
            return (gesture, raw);
        }
    }
}

async fn assert_quiet(harness: &mut Harness) {
    match timeout(Duration::from_millis(100), harness.events.recv()).await {
        Err(_) => {}
        Ok(Some(event)) => panic!("expected no events, got {:?}", event),
        Ok(None) => panic!("session event channel closed"),
    }
}

/// Scan, match the glove, and land in `Subscribed`.
async fn subscribe_flow(harness: &mut Harness) {
    harness.commands.send(SessionCommand::StartScan).unwrap();
    expect_state(harness, SessionState::Scanning).await;
    harness
        .transport_events
        .send(TransportEvent::DeviceFound(advertisement(
            protocol::DEVICE_NAME,
            GLOVE_ADDRESS,
        )))
        .unwrap();
    expect_state(harness, SessionState::Subscribed).await;
}

#[tokio::test]
async fn only_exact_name_match_triggers_connect() {
    let mut harness = spawn_session(
        MockTransport::healthy(),
        GestureDispatcher::new(),
        SessionConfig::default(),
    );

    harness.commands.send(SessionCommand::StartScan).unwrap();
    expect_state(&mut harness, SessionState::Scanning).await;

    for name in ["GestureControl", "gesturecontrolforrunners", "Unknown", ""] {
        harness
            .transport_events
            .send(TransportEvent::DeviceFound(advertisement(name, "11:22:33:44:55:66")))
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        harness.log.lock().unwrap().connects.is_empty(),
        "non-matching advertisements must not trigger a connect"
    );

    harness
        .transport_events
        .send(TransportEvent::DeviceFound(advertisement(
            protocol::DEVICE_NAME,
            GLOVE_ADDRESS,
        )))
        .unwrap();
    expect_state(&mut harness, SessionState::Subscribed).await;

    let log = harness.log.lock().unwrap();
    assert_eq!(log.connects, vec![GLOVE_ADDRESS.to_string()]);
    assert_eq!(log.subscribes, 1);
}

#[tokio::test]
async fn disconnect_from_idle_is_a_silent_noop() {
    let mut harness = spawn_session(
        MockTransport::healthy(),
        GestureDispatcher::new(),
        SessionConfig::default(),
    );

    harness.commands.send(SessionCommand::Disconnect).unwrap();
    assert_quiet(&mut harness).await;
    assert_eq!(harness.log.lock().unwrap().disconnects, 0);
}

#[tokio::test]
async fn connect_failure_releases_and_allows_retry() {
    let mut harness = spawn_session(
        MockTransport::failing_connect(BleError::Backend("simulated radio fault".to_string())),
        GestureDispatcher::new(),
        SessionConfig::default(),
    );

    harness.commands.send(SessionCommand::StartScan).unwrap();
    expect_state(&mut harness, SessionState::Scanning).await;
    harness
        .transport_events
        .send(TransportEvent::DeviceFound(advertisement(
            protocol::DEVICE_NAME,
            GLOVE_ADDRESS,
        )))
        .unwrap();

    let err = expect_failure(&mut harness).await;
    assert!(
        matches!(err, BleError::ConnectFailed { .. }),
        "got {:?}",
        err
    );
    expect_state(&mut harness, SessionState::Disconnected).await;
    assert!(
        harness.log.lock().unwrap().disconnects >= 1,
        "the transport handle must be released after a failed attempt"
    );

    // The manager accepts a fresh attempt.
    harness.commands.send(SessionCommand::StartScan).unwrap();
    expect_state(&mut harness, SessionState::Scanning).await;
}

#[tokio::test]
async fn missing_service_reports_service_not_found() {
    let other = GattService {
        uuid: Uuid::from_u128(0xdead_beef),
        characteristics: vec![],
    };
    let mut harness = spawn_session(
        MockTransport::with_services(vec![other]),
        GestureDispatcher::new(),
        SessionConfig::default(),
    );

    harness.commands.send(SessionCommand::StartScan).unwrap();
    expect_state(&mut harness, SessionState::Scanning).await;
    harness
        .transport_events
        .send(TransportEvent::DeviceFound(advertisement(
            protocol::DEVICE_NAME,
            GLOVE_ADDRESS,
        )))
        .unwrap();

    let err = expect_failure(&mut harness).await;
    assert_eq!(err, BleError::ServiceNotFound(protocol::SERVICE_UUID));
    expect_state(&mut harness, SessionState::Disconnected).await;
    assert_eq!(
        harness.log.lock().unwrap().subscribes,
        0,
        "notifications must not be enabled without the target service"
    );
}

#[tokio::test]
async fn missing_characteristic_reports_characteristic_not_found() {
    let service_without_value_char = GattService {
        uuid: protocol::SERVICE_UUID,
        characteristics: vec![GattCharacteristic {
            uuid: Uuid::from_u128(0x1234),
            notifiable: false,
        }],
    };
    let mut harness = spawn_session(
        MockTransport::with_services(vec![service_without_value_char]),
        GestureDispatcher::new(),
        SessionConfig::default(),
    );

    harness.commands.send(SessionCommand::StartScan).unwrap();
    expect_state(&mut harness, SessionState::Scanning).await;
    harness
        .transport_events
        .send(TransportEvent::DeviceFound(advertisement(
            protocol::DEVICE_NAME,
            GLOVE_ADDRESS,
        )))
        .unwrap();

    let err = expect_failure(&mut harness).await;
    assert_eq!(
        err,
        BleError::CharacteristicNotFound(protocol::VALUE_CHAR_UUID)
    );
    assert_eq!(harness.log.lock().unwrap().subscribes, 0);
}

#[tokio::test]
async fn descriptor_write_failure_fails_the_attempt() {
    let mut harness = spawn_session(
        MockTransport::failing_subscribe(BleError::DescriptorWriteFailed(
            "write rejected by peer".to_string(),
        )),
        GestureDispatcher::new(),
        SessionConfig::default(),
    );

    harness.commands.send(SessionCommand::StartScan).unwrap();
    expect_state(&mut harness, SessionState::Scanning).await;
    harness
        .transport_events
        .send(TransportEvent::DeviceFound(advertisement(
            protocol::DEVICE_NAME,
            GLOVE_ADDRESS,
        )))
        .unwrap();

    let err = expect_failure(&mut harness).await;
    assert!(
        matches!(err, BleError::DescriptorWriteFailed(_)),
        "got {:?}",
        err
    );
    expect_state(&mut harness, SessionState::Disconnected).await;
    assert!(harness.log.lock().unwrap().disconnects >= 1);
}

#[tokio::test]
async fn notifications_route_through_the_dispatcher() {
    let palm_left_hits = Arc::new(AtomicUsize::new(0));
    let fallback_hits = Arc::new(AtomicUsize::new(0));

    let mut dispatcher = GestureDispatcher::new();
    let counter = palm_left_hits.clone();
    dispatcher.bind(Gesture::PalmLeft, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = fallback_hits.clone();
    dispatcher.bind_unrecognized(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut harness = spawn_session(
        MockTransport::healthy(),
        dispatcher,
        SessionConfig::default(),
    );
    subscribe_flow(&mut harness).await;

    harness
        .transport_events
        .send(TransportEvent::Notification {
            value: b"palm_left".to_vec(),
        })
        .unwrap();
    let (gesture, raw) = expect_notification(&mut harness).await;
    assert_eq!(gesture, Some(Gesture::PalmLeft));
    assert_eq!(raw, "palm_left");
    assert_eq!(palm_left_hits.load(Ordering::SeqCst), 1);
    assert_eq!(fallback_hits.load(Ordering::SeqCst), 0);

    harness
        .transport_events
        .send(TransportEvent::Notification {
            value: b"spin".to_vec(),
        })
        .unwrap();
    let (gesture, raw) = expect_notification(&mut harness).await;
    assert_eq!(gesture, None);
    assert_eq!(raw, "spin");
    assert_eq!(palm_left_hits.load(Ordering::SeqCst), 1);
    assert_eq!(fallback_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn direct_connect_skips_the_scan() {
    let mut harness = spawn_session(
        MockTransport::healthy(),
        GestureDispatcher::new(),
        SessionConfig::default(),
    );

    harness
        .commands
        .send(SessionCommand::Connect(DeviceAddress::from(GLOVE_ADDRESS)))
        .unwrap();
    expect_state(&mut harness, SessionState::Subscribed).await;

    let log = harness.log.lock().unwrap();
    assert_eq!(log.start_scan, 0);
    assert_eq!(log.connects, vec![GLOVE_ADDRESS.to_string()]);
}

#[tokio::test]
async fn second_start_scan_is_rejected() {
    let mut harness = spawn_session(
        MockTransport::healthy(),
        GestureDispatcher::new(),
        SessionConfig::default(),
    );

    harness.commands.send(SessionCommand::StartScan).unwrap();
    harness.commands.send(SessionCommand::StartScan).unwrap();

    expect_state(&mut harness, SessionState::Scanning).await;
    let warning = expect_warning(&mut harness).await;
    assert!(warning.contains("scan"), "got warning: {}", warning);
    assert_eq!(
        harness.log.lock().unwrap().start_scan,
        1,
        "exactly one platform scan may be active"
    );
}

#[tokio::test]
async fn scan_timeout_fails_the_attempt() {
    let config = SessionConfig {
        scan_timeout: Some(Duration::from_millis(80)),
        connect_timeout: Duration::from_secs(1),
    };
    let mut harness = spawn_session(MockTransport::healthy(), GestureDispatcher::new(), config);

    harness.commands.send(SessionCommand::StartScan).unwrap();
    expect_state(&mut harness, SessionState::Scanning).await;

    let err = expect_failure(&mut harness).await;
    assert_eq!(err, BleError::ScanTimeout(Duration::from_millis(80)));
    expect_state(&mut harness, SessionState::Disconnected).await;
    assert!(harness.log.lock().unwrap().stop_scan >= 1);
}

#[tokio::test]
async fn transport_drop_while_subscribed_reports_and_resets() {
    let mut harness = spawn_session(
        MockTransport::healthy(),
        GestureDispatcher::new(),
        SessionConfig::default(),
    );
    subscribe_flow(&mut harness).await;

    harness
        .transport_events
        .send(TransportEvent::PeerDisconnected {
            address: DeviceAddress::from(GLOVE_ADDRESS),
        })
        .unwrap();

    let err = expect_failure(&mut harness).await;
    assert!(matches!(err, BleError::TransportDropped(_)), "got {:?}", err);
    expect_state(&mut harness, SessionState::Disconnected).await;
}

#[tokio::test]
async fn disconnect_while_subscribed_releases_the_handle() {
    let mut harness = spawn_session(
        MockTransport::healthy(),
        GestureDispatcher::new(),
        SessionConfig::default(),
    );
    subscribe_flow(&mut harness).await;

    harness.commands.send(SessionCommand::Disconnect).unwrap();
    let message = expect_state(&mut harness, SessionState::Disconnected).await;
    assert_eq!(message, "No BLE device connected");
    assert!(harness.log.lock().unwrap().disconnects >= 1);

    // A second disconnect is a no-op.
    harness.commands.send(SessionCommand::Disconnect).unwrap();
    assert_quiet(&mut harness).await;
}
