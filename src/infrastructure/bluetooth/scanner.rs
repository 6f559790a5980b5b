//! BLE Scanner Module
//!
//! Handles device discovery for the gesture glove: starts and stops the
//! platform scan and forwards adapter events into the transport event
//! channel.

use std::collections::HashMap;
use std::pin::Pin;

use btleplug::api::{Central, CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::Adapter;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::map_backend_error;
use super::transport::TransportEvent;
use crate::domain::models::{DeviceAddress, DiscoveredDevice};
use crate::error::BleError;

/// Watches the adapter event stream and controls the platform scan.
///
/// Discovery events flow for the whole lifetime of the scanner; the session
/// manager decides what to do with them based on its own state. The scan is
/// unfiltered at the platform level; name matching happens in the session
/// manager where it can be tested.
pub struct BleScanner {
    adapter: Adapter,
    forward_task: JoinHandle<()>,
    scanning: bool,
}

impl BleScanner {
    /// Create a scanner and start forwarding adapter events.
    pub async fn new(
        adapter: Adapter,
        event_sender: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self, BleError> {
        let events = adapter.events().await.map_err(map_backend_error)?;
        let forward_task = tokio::spawn(forward_adapter_events(
            adapter.clone(),
            events,
            event_sender,
        ));

        Ok(Self {
            adapter,
            forward_task,
            scanning: false,
        })
    }

    /// Start scanning for BLE devices.
    pub async fn start(&mut self) -> Result<(), BleError> {
        if self.scanning {
            return Ok(());
        }

        info!("Starting BLE scan");
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| match e {
                btleplug::Error::PermissionDenied => {
                    BleError::PermissionDenied("platform denied scan access".to_string())
                }
                // bluez reports a powered-off radio as a NotReady runtime error
                other => {
                    let text = other.to_string();
                    if text.contains("NotReady") || text.contains("powered") {
                        BleError::RadioDisabled
                    } else {
                        map_backend_error(other)
                    }
                }
            })?;

        self.scanning = true;
        Ok(())
    }

    /// Stop scanning. No-op when no scan is active.
    pub async fn stop(&mut self) -> Result<(), BleError> {
        if !self.scanning {
            return Ok(());
        }

        info!("Stopping BLE scan");
        self.scanning = false;
        self.adapter.stop_scan().await.map_err(map_backend_error)?;
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        self.forward_task.abort();
    }
}

/// Translate adapter events into transport events.
///
/// Keeps a map from peripheral id to the address we reported, so later
/// disconnect events can be attributed even when the peripheral has left
/// the adapter cache.
async fn forward_adapter_events(
    adapter: Adapter,
    mut events: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
    sender: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut seen_addresses: HashMap<String, DeviceAddress> = HashMap::new();

    while let Some(event) = events.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let peripheral = match adapter.peripheral(&id).await {
                    Ok(p) => p,
                    Err(e) => {
                        debug!("Could not resolve discovered peripheral: {}", e);
                        continue;
                    }
                };

                let properties = match peripheral.properties().await {
                    Ok(Some(props)) => props,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!("Could not read peripheral properties: {}", e);
                        continue;
                    }
                };

                let address = DeviceAddress::new(peripheral.address().to_string());
                seen_addresses.insert(format!("{:?}", id), address.clone());

                let device = DiscoveredDevice {
                    name: properties
                        .local_name
                        .unwrap_or_else(|| "Unknown".to_string()),
                    address,
                    rssi: properties.rssi,
                };

                if sender.send(TransportEvent::DeviceFound(device)).is_err() {
                    return;
                }
            }
            CentralEvent::DeviceDisconnected(id) => {
                match seen_addresses.get(&format!("{:?}", id)) {
                    Some(address) => {
                        let _ = sender.send(TransportEvent::PeerDisconnected {
                            address: address.clone(),
                        });
                    }
                    None => warn!("Disconnect event for unknown peripheral {:?}", id),
                }
            }
            _ => {}
        }
    }
}
