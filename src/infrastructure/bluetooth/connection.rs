//! BLE Connection Module
//!
//! Handles the live link to one glove: connect by address, enumerate the
//! GATT tree, subscribe to the value characteristic, and forward
//! notifications into the transport event channel.

use btleplug::api::{Central, CharPropFlags, Characteristic, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::map_backend_error;
use super::protocol;
use super::transport::{GattCharacteristic, GattService, TransportEvent};
use crate::domain::models::DeviceAddress;
use crate::error::BleError;

/// One established connection. Dropping (or calling [`close`]) releases the
/// transport handle and silences the notification forwarder.
///
/// [`close`]: BleConnection::close
pub struct BleConnection {
    peripheral: Peripheral,
    address: DeviceAddress,
    subscribed: Option<Characteristic>,
    notify_task: Option<JoinHandle<()>>,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
}

impl BleConnection {
    /// Connect to a peripheral the adapter has already seen.
    pub async fn establish(
        adapter: &Adapter,
        address: &DeviceAddress,
        event_sender: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self, BleError> {
        info!("Connecting to {}", address);

        let peripherals = adapter.peripherals().await.map_err(map_backend_error)?;
        let peripheral = peripherals
            .into_iter()
            .find(|p| p.address().to_string() == address.as_str())
            .ok_or_else(|| BleError::ConnectFailed {
                address: address.clone(),
                reason: "device not in adapter cache; scan first".to_string(),
            })?;

        peripheral
            .connect()
            .await
            .map_err(|e| BleError::ConnectFailed {
                address: address.clone(),
                reason: e.to_string(),
            })?;

        info!("Device connected: {}", address);

        Ok(Self {
            peripheral,
            address: address.clone(),
            subscribed: None,
            notify_task: None,
            event_sender,
        })
    }

    /// Enumerate services and characteristics into a plain-data tree.
    pub async fn discover_services(&mut self) -> Result<Vec<GattService>, BleError> {
        self.peripheral
            .discover_services()
            .await
            .map_err(map_backend_error)?;

        let services: Vec<GattService> = self
            .peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| GattCharacteristic {
                        uuid: c.uuid,
                        notifiable: c.properties.contains(CharPropFlags::NOTIFY),
                    })
                    .collect(),
            })
            .collect();

        info!("Discovered {} services", services.len());
        Ok(services)
    }

    /// Enable notifications on the value characteristic and start the
    /// forwarding task. The subscribe call performs the configuration
    /// descriptor write on the wire.
    pub async fn subscribe(
        &mut self,
        service: uuid::Uuid,
        characteristic: uuid::Uuid,
    ) -> Result<(), BleError> {
        let target = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic)
            .ok_or(BleError::CharacteristicNotFound(characteristic))?;

        if !target.properties.contains(CharPropFlags::NOTIFY) {
            return Err(BleError::DescriptorWriteFailed(format!(
                "characteristic {} does not support notifications",
                characteristic
            )));
        }

        if !target
            .descriptors
            .iter()
            .any(|d| d.uuid == protocol::CLIENT_CHARACTERISTIC_CONFIG_UUID)
        {
            // Some backends omit descriptors from discovery; subscribe below
            // still performs the configuration write.
            debug!("Client characteristic configuration descriptor not listed");
        }

        self.peripheral
            .subscribe(&target)
            .await
            .map_err(|e| BleError::DescriptorWriteFailed(e.to_string()))?;

        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(map_backend_error)?;

        let sender = self.event_sender.clone();
        let address = self.address.clone();
        self.notify_task = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != characteristic {
                    continue;
                }
                if sender
                    .send(TransportEvent::Notification {
                        value: notification.value,
                    })
                    .is_err()
                {
                    return;
                }
            }
            // Stream ended without an explicit close: the peer is gone.
            let _ = sender.send(TransportEvent::PeerDisconnected { address });
        }));

        self.subscribed = Some(target);
        info!("Notifications enabled");
        Ok(())
    }

    /// Tear the connection down. Errors are logged, not propagated; the
    /// handle is released regardless.
    pub async fn close(&mut self) {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }

        if let Some(characteristic) = self.subscribed.take() {
            if let Err(e) = self.peripheral.unsubscribe(&characteristic).await {
                debug!("Unsubscribe during close failed: {}", e);
            }
        }

        if let Err(e) = self.peripheral.disconnect().await {
            warn!("Disconnect returned an error: {}", e);
        }

        info!("Disconnected from {}", self.address);
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }
}

impl Drop for BleConnection {
    fn drop(&mut self) {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
    }
}
