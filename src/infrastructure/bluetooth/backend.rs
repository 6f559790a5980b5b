//! btleplug-backed implementation of the transport trait.

use async_trait::async_trait;
use btleplug::api::{Central, Manager as _};
use btleplug::platform::{Adapter, Manager};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use super::connection::BleConnection;
use super::scanner::BleScanner;
use super::transport::{BleTransport, GattService, TransportEvent};
use crate::domain::models::DeviceAddress;
use crate::error::BleError;

/// Production transport: first system adapter, one scanner, at most one
/// live connection.
pub struct BtleplugTransport {
    adapter: Adapter,
    scanner: BleScanner,
    connection: Option<BleConnection>,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
}

impl BtleplugTransport {
    /// Acquire the default adapter and wire its event stream into the given
    /// channel. Fails with [`BleError::RadioDisabled`] when the host has no
    /// usable adapter.
    pub async fn new(
        event_sender: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self, BleError> {
        let manager = Manager::new().await.map_err(map_backend_error)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(map_backend_error)?
            .into_iter()
            .next()
            .ok_or(BleError::RadioDisabled)?;

        if let Ok(name) = adapter.adapter_info().await {
            info!("Using Bluetooth adapter: {}", name);
        }

        let scanner = BleScanner::new(adapter.clone(), event_sender.clone()).await?;

        Ok(Self {
            adapter,
            scanner,
            connection: None,
            event_sender,
        })
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn start_scan(&mut self) -> Result<(), BleError> {
        self.scanner.start().await
    }

    async fn stop_scan(&mut self) -> Result<(), BleError> {
        self.scanner.stop().await
    }

    async fn connect(&mut self, address: &DeviceAddress) -> Result<(), BleError> {
        if let Some(mut stale) = self.connection.take() {
            stale.close().await;
        }

        let connection =
            BleConnection::establish(&self.adapter, address, self.event_sender.clone()).await?;
        self.connection = Some(connection);
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<Vec<GattService>, BleError> {
        match self.connection.as_mut() {
            Some(connection) => connection.discover_services().await,
            None => Err(BleError::TransportDropped(
                "no active connection".to_string(),
            )),
        }
    }

    async fn subscribe(&mut self, service: Uuid, characteristic: Uuid) -> Result<(), BleError> {
        match self.connection.as_mut() {
            Some(connection) => connection.subscribe(service, characteristic).await,
            None => Err(BleError::TransportDropped(
                "no active connection".to_string(),
            )),
        }
    }

    async fn disconnect(&mut self) -> Result<(), BleError> {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
        Ok(())
    }
}

/// Map backend errors onto the session taxonomy. Conditions with a specific
/// meaning keep it; everything else is an opaque backend failure.
pub(crate) fn map_backend_error(err: btleplug::Error) -> BleError {
    match err {
        btleplug::Error::PermissionDenied => {
            BleError::PermissionDenied("platform denied bluetooth access".to_string())
        }
        btleplug::Error::NotConnected => {
            BleError::TransportDropped("peripheral is not connected".to_string())
        }
        other => BleError::Backend(other.to_string()),
    }
}
