//! Bluetooth Session Service
//!
//! The session state machine coordinating scanning, connection, service
//! discovery, and notification dispatch for the gesture glove.
//!
//! One manager drives one logical session. Commands arrive on an mpsc
//! channel, transport callbacks arrive on another, and a single `run` loop
//! consumes both, so every transition is serialized: a disconnect can never
//! race an in-flight discovery.

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use super::protocol;
use super::transport::{BleTransport, TransportEvent};
use crate::domain::gestures::GestureDispatcher;
use crate::domain::models::{
    DeviceAddress, DiscoveredDevice, MessageSeverity, SessionCommand, SessionConfig, SessionEvent,
    SessionState, StatusMessage, TargetDevice,
};
use crate::error::BleError;

/// BLE session manager: owns the transport, the target descriptor, and the
/// gesture dispatcher; publishes progress on the session event channel.
pub struct BleSessionManager<T: BleTransport> {
    transport: T,
    target: TargetDevice,
    config: SessionConfig,
    dispatcher: GestureDispatcher,
    event_sender: mpsc::UnboundedSender<SessionEvent>,
    state: SessionState,
    connected: Option<DeviceAddress>,
    latest_value: Option<String>,
    scan_deadline: Option<Instant>,
}

impl<T: BleTransport> BleSessionManager<T> {
    pub fn new(
        transport: T,
        target: TargetDevice,
        config: SessionConfig,
        event_sender: mpsc::UnboundedSender<SessionEvent>,
        dispatcher: GestureDispatcher,
    ) -> Self {
        Self {
            transport,
            target,
            config,
            dispatcher,
            event_sender,
            state: SessionState::Idle,
            connected: None,
            latest_value: None,
            scan_deadline: None,
        }
    }

    /// Drive the session until `Shutdown` arrives or both channels close.
    ///
    /// The transport handle is released on every exit path.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        loop {
            let deadline = self.scan_deadline;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => break,
                },
                _ = wait_until(deadline) => self.on_scan_timeout().await,
            }
        }

        self.release("Session closed").await;
        info!("Session manager stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        debug!(state = %self.state, ?command, "Handling command");
        match command {
            SessionCommand::StartScan => self.start_scan().await,
            SessionCommand::StopScan => self.stop_scan().await,
            SessionCommand::Connect(address) => self.connect_direct(address).await,
            SessionCommand::Disconnect => self.disconnect().await,
            // Shutdown is intercepted by the run loop.
            SessionCommand::Shutdown => {}
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::DeviceFound(device) => self.on_device_found(device).await,
            TransportEvent::PeerDisconnected { address } => {
                if self.connected.as_ref() == Some(&address) {
                    self.fail(BleError::TransportDropped(format!(
                        "peripheral {} dropped the connection",
                        address
                    )))
                    .await;
                } else {
                    debug!("Ignoring disconnect of unrelated peer {}", address);
                }
            }
            TransportEvent::Notification { value } => self.on_notification(&value),
        }
    }

    async fn start_scan(&mut self) {
        if !matches!(
            self.state,
            SessionState::Idle | SessionState::Disconnected
        ) {
            self.reject_command("scan", "a scan or connection is already active");
            return;
        }

        match self.transport.start_scan().await {
            Ok(()) => {
                self.scan_deadline = self.config.scan_timeout.map(|t| Instant::now() + t);
                self.set_state(
                    SessionState::Scanning,
                    format!("Scanning for {}...", self.target.name),
                );
            }
            Err(err) => self.fail(err).await,
        }
    }

    async fn stop_scan(&mut self) {
        if self.state != SessionState::Scanning {
            debug!("Stop scan requested while not scanning");
            return;
        }

        self.scan_deadline = None;
        if let Err(err) = self.transport.stop_scan().await {
            warn!("Stopping scan failed: {}", err);
        }
        self.set_state(SessionState::Idle, "Scan stopped");
    }

    /// Reconnect to a known address without scanning first.
    async fn connect_direct(&mut self, address: DeviceAddress) {
        match self.state {
            SessionState::Connecting | SessionState::ServiceDiscovery | SessionState::Subscribed => {
                self.reject_command("connect", "a connection is already active");
                return;
            }
            SessionState::Scanning => {
                self.scan_deadline = None;
                if let Err(err) = self.transport.stop_scan().await {
                    warn!("Stopping scan before connect failed: {}", err);
                }
            }
            SessionState::Idle | SessionState::Disconnected => {}
        }

        let device = DiscoveredDevice {
            name: self.target.name.clone(),
            address,
            rssi: None,
        };
        self.establish(device).await;
    }

    async fn disconnect(&mut self) {
        match self.state {
            // Nothing to release and nothing to report.
            SessionState::Idle | SessionState::Disconnected => {
                debug!("Disconnect requested with no active session");
            }
            SessionState::Scanning => {
                self.scan_deadline = None;
                if let Err(err) = self.transport.stop_scan().await {
                    warn!("Stopping scan failed: {}", err);
                }
                self.set_state(SessionState::Disconnected, "No BLE device connected");
            }
            SessionState::Connecting | SessionState::ServiceDiscovery | SessionState::Subscribed => {
                self.log(
                    "Disconnected the BLE device.",
                    MessageSeverity::Info,
                );
                self.release("No BLE device connected").await;
            }
        }
    }

    async fn on_device_found(&mut self, device: DiscoveredDevice) {
        if self.state != SessionState::Scanning {
            return;
        }

        let _ = self
            .event_sender
            .send(SessionEvent::DeviceFound(device.clone()));

        if device.name != self.target.name {
            debug!(name = %device.name, "Ignoring non-matching advertisement");
            return;
        }

        info!(address = %device.address, "Target device found, stopping scan");
        self.scan_deadline = None;
        if let Err(err) = self.transport.stop_scan().await {
            warn!("Stopping scan failed: {}", err);
        }

        self.establish(device).await;
    }

    /// Connect, discover, look up the target service/characteristic, and
    /// subscribe. Any failure releases the transport and reports the error.
    async fn establish(&mut self, device: DiscoveredDevice) {
        self.set_state(
            SessionState::Connecting,
            format!("Connecting to {} ({})", device.name, device.address),
        );

        let connected = time::timeout(
            self.config.connect_timeout,
            self.transport.connect(&device.address),
        )
        .await;

        match connected {
            Err(_) => {
                return self
                    .fail(BleError::ConnectFailed {
                        address: device.address.clone(),
                        reason: format!("no response within {:?}", self.config.connect_timeout),
                    })
                    .await;
            }
            Ok(Err(err)) => {
                let err = match err {
                    already @ BleError::ConnectFailed { .. } => already,
                    other => BleError::ConnectFailed {
                        address: device.address.clone(),
                        reason: other.to_string(),
                    },
                };
                return self.fail(err).await;
            }
            Ok(Ok(())) => {}
        }

        self.set_state(SessionState::ServiceDiscovery, "Discovering services...");

        let services = match self.transport.discover_services().await {
            Ok(services) => services,
            Err(err) => return self.fail(err).await,
        };

        let service = match services
            .iter()
            .find(|s| s.uuid == self.target.service_uuid)
        {
            Some(service) => service,
            None => {
                return self
                    .fail(BleError::ServiceNotFound(self.target.service_uuid))
                    .await;
            }
        };

        if !service
            .characteristics
            .iter()
            .any(|c| c.uuid == self.target.characteristic_uuid)
        {
            return self
                .fail(BleError::CharacteristicNotFound(
                    self.target.characteristic_uuid,
                ))
                .await;
        }

        if let Err(err) = self
            .transport
            .subscribe(self.target.service_uuid, self.target.characteristic_uuid)
            .await
        {
            return self.fail(err).await;
        }

        self.connected = Some(device.address.clone());
        self.set_state(SessionState::Subscribed, "BLE device connected");
        self.log("Notifications enabled", MessageSeverity::Success);
    }

    fn on_notification(&mut self, value: &[u8]) {
        if self.state != SessionState::Subscribed {
            debug!("Dropping notification outside subscribed state");
            return;
        }

        let payload = protocol::decode_payload(value);
        let gesture = self.dispatcher.dispatch(&payload);
        debug!(
            payload = %payload,
            previous = ?self.latest_value,
            recognized = gesture.is_some(),
            "Notification"
        );
        self.latest_value = Some(payload.clone());
        let _ = self.event_sender.send(SessionEvent::Notification {
            gesture,
            raw: payload,
        });
    }

    async fn on_scan_timeout(&mut self) {
        self.scan_deadline = None;
        if self.state != SessionState::Scanning {
            return;
        }

        let waited = self.config.scan_timeout.unwrap_or_default();
        self.fail(BleError::ScanTimeout(waited)).await;
    }

    /// Report a terminal-for-this-attempt error and reset to `Disconnected`.
    async fn fail(&mut self, err: BleError) {
        error!("Session attempt failed: {}", err);
        self.log(err.to_string(), MessageSeverity::Error);
        let _ = self.event_sender.send(SessionEvent::Failed(err.clone()));
        self.release(err.to_string()).await;
    }

    /// Release every transport resource and settle in `Disconnected`.
    async fn release(&mut self, message: impl Into<String>) {
        self.scan_deadline = None;

        if let Err(err) = self.transport.stop_scan().await {
            debug!("Stop scan during release failed: {}", err);
        }
        if let Err(err) = self.transport.disconnect().await {
            debug!("Disconnect during release failed: {}", err);
        }

        self.connected = None;
        self.latest_value = None;

        if self.state != SessionState::Disconnected {
            self.set_state(SessionState::Disconnected, message.into());
        }
    }

    fn reject_command(&mut self, what: &str, why: &str) {
        warn!(state = %self.state, "Rejecting {} request: {}", what, why);
        self.log(
            format!("Ignoring {} request: {}", what, why),
            MessageSeverity::Warning,
        );
    }

    fn set_state(&mut self, state: SessionState, message: impl Into<String>) {
        let message = message.into();
        if self.state != state {
            info!(from = %self.state, to = %state, "Session state changed");
        }
        self.state = state;
        let _ = self
            .event_sender
            .send(SessionEvent::StateChanged { state, message });
    }

    fn log(&self, message: impl Into<String>, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(SessionEvent::LogMessage(StatusMessage::new(
                message, severity,
            )));
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
