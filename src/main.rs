use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use gesture_control_rust::domain::models::MessageSeverity;
use gesture_control_rust::infrastructure::logging;
use gesture_control_rust::{
    BleSessionManager, BtleplugTransport, DiscoveredDevice, Gesture, GestureDispatcher,
    SessionCommand, SessionEvent, SessionState, SettingsService,
};

/// Headless session runner: scans for the glove, subscribes, and logs each
/// gesture as it arrives. Ctrl-C disconnects and exits.
#[tokio::main]
async fn main() -> Result<()> {
    let mut settings_service = SettingsService::new()?;
    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)?;

    info!("Starting gesture control session");

    let settings = settings_service.get().clone();
    let target = settings.target_device()?;
    let config = settings.session_config();
    let target_name = target.name.clone();

    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let (session_tx, mut session_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let transport = BtleplugTransport::new(transport_tx).await?;

    let mut dispatcher = GestureDispatcher::new();
    for gesture in Gesture::ALL {
        // Action slots stay pluggable; the demo binds a log line per gesture.
        dispatcher.bind(gesture, move |_| {
            info!(gesture = %gesture, "Gesture action fired");
        });
    }
    dispatcher.bind_unrecognized(|raw| {
        debug!(payload = raw, "Payload outside the gesture vocabulary");
    });

    let manager = BleSessionManager::new(transport, target, config, session_tx, dispatcher);
    let session = tokio::spawn(manager.run(command_rx, transport_rx));

    command_tx.send(SessionCommand::StartScan)?;

    let mut last_match: Option<DiscoveredDevice> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                let _ = command_tx.send(SessionCommand::Disconnect);
                let _ = command_tx.send(SessionCommand::Shutdown);
                break;
            }
            event = session_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::StateChanged { state, message } => {
                        println!("[{}] {}", state, message);
                        if state == SessionState::Subscribed {
                            if let Some(device) = &last_match {
                                if let Err(e) = settings_service
                                    .record_connected_address(device.address.as_str())
                                {
                                    warn!("Could not persist device address: {}", e);
                                }
                            }
                        }
                    }
                    SessionEvent::DeviceFound(device) => {
                        debug!(name = %device.name, address = %device.address, rssi = ?device.rssi, "Advertisement");
                        if device.name == target_name {
                            last_match = Some(device);
                        }
                    }
                    SessionEvent::Notification { gesture, raw } => match gesture {
                        Some(gesture) => println!("Gesture: {}", gesture),
                        None => debug!(payload = %raw, "Unrecognized payload"),
                    },
                    SessionEvent::Failed(err) => {
                        eprintln!("Session error: {}", err);
                    }
                    SessionEvent::LogMessage(status) => {
                        if status.severity == MessageSeverity::Warning {
                            warn!("{}", status.message);
                        } else {
                            info!("{}", status.message);
                        }
                    }
                }
            }
        }
    }

    let _ = session.await;
    Ok(())
}
