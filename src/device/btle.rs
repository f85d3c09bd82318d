use std::fmt;
use std::future::Future;
use std::mem;
use std::time::Duration;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::future::ready;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::types::Config;
use crate::device::transport::{NotificationStream, Transport};
use crate::error::DeviceError;

pub struct BtleHandle {
    peripheral: Peripheral,
    label: String,
}

impl fmt::Display for BtleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// [`Transport`] backed by the platform bluetooth stack.
pub struct BtleTransport {
    // created on first use so that a missing bluetooth stack is retried like any other scan failure
    manager: Option<Manager>,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
    scan_window: Duration,
}

impl BtleTransport {
    pub fn new(config: &Config) -> Self {
        BtleTransport {
            manager: None,
            service_uuid: config.service_uuid,
            characteristic_uuid: config.characteristic_uuid,
            scan_window: config.scan_window(),
        }
    }

    async fn adapters(&mut self) -> Result<Vec<Adapter>, DeviceError> {
        if self.manager.is_none() {
            self.manager = Some(Manager::new().await?);
        }

        let adapters = match &self.manager {
            Some(manager) => manager.adapters().await?,
            None => Vec::new(),
        };

        if adapters.is_empty() {
            return Err(DeviceError::NoAdapter);
        }
        Ok(adapters)
    }

    fn find_characteristic(&self, peripheral: &Peripheral) -> Result<Characteristic, DeviceError> {
        for service in peripheral.services() {
            if !service.uuid.eq(&self.service_uuid) {
                continue;
            }

            for characteristic in &service.characteristics {
                if characteristic.uuid.eq(&self.characteristic_uuid) {
                    return Ok(characteristic.clone());
                }
            }
        }

        Err(DeviceError::MissingCharacteristic {
            service: self.service_uuid,
            characteristic: self.characteristic_uuid,
        })
    }
}

/// The part of an adapter an [`ActiveScan`] drives.
trait ScanControl: Clone + Send + Sync + 'static {
    fn begin_scan(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    fn end_scan(&self) -> impl Future<Output = Result<(), DeviceError>> + Send;
}

impl ScanControl for Adapter {
    async fn begin_scan(&self) -> Result<(), DeviceError> {
        Ok(self.start_scan(ScanFilter::default()).await?)
    }

    async fn end_scan(&self) -> Result<(), DeviceError> {
        Ok(self.stop_scan().await?)
    }
}

async fn end_scans<A: ScanControl>(adapters: Vec<A>) {
    for adapter in adapters {
        if let Err(err) = adapter.end_scan().await {
            warn!("Failed to stop scanning: {}", err);
        }
    }
}

/// Adapters that are currently scanning. Dropped without [`ActiveScan::stop`] (for example when
/// the supervisor abandons the scan) it still stops them, on a spawned task.
struct ActiveScan<A: ScanControl> {
    adapters: Vec<A>,
}

impl<A: ScanControl> ActiveScan<A> {
    /// Starts scanning on every adapter. If one fails, those already started are stopped again.
    async fn start(adapters: &[A]) -> Result<Self, DeviceError> {
        let mut scan = ActiveScan { adapters: Vec::with_capacity(adapters.len()) };

        for adapter in adapters {
            if let Err(err) = adapter.begin_scan().await {
                scan.stop().await;
                return Err(err);
            }
            scan.adapters.push(adapter.clone());
        }

        Ok(scan)
    }

    async fn stop(mut self) {
        end_scans(mem::take(&mut self.adapters)).await;
    }
}

impl<A: ScanControl> Drop for ActiveScan<A> {
    fn drop(&mut self) {
        if self.adapters.is_empty() {
            return;
        }

        let adapters = mem::take(&mut self.adapters);
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(end_scans(adapters));
            },
            Err(_) => warn!("Abandoned a scan without a runtime to stop it on"),
        }
    }
}

async fn find_peripheral(adapters: &[Adapter], device_name: &str) -> Option<BtleHandle> {
    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    debug!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    let Some(local_name) = properties.local_name else {
                        continue;
                    };

                    if local_name.contains(device_name) {
                        info!(
                            "Found peripheral {} {} {:?}",
                            local_name,
                            properties.address,
                            properties.services,
                        );
                        let label = format!("{} ({})", local_name, properties.address);
                        return Some(BtleHandle { peripheral, label });
                    }
                }
            }
        }
    }

    None
}

impl Transport for BtleTransport {
    type Handle = BtleHandle;

    async fn discover(&mut self, device_name: &str) -> Result<Option<BtleHandle>, DeviceError> {
        let adapters = self.adapters().await?;

        for adapter in &adapters {
            info!("Scanning for {} using adapter {}...", device_name, adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        }
        let scan = ActiveScan::start(&adapters).await?;

        sleep(self.scan_window).await;
        let found = find_peripheral(&adapters, device_name).await;

        scan.stop().await;
        Ok(found)
    }

    async fn connect(&mut self, handle: &BtleHandle) -> Result<NotificationStream, DeviceError> {
        let peripheral = &handle.peripheral;

        info!("Connecting to {}...", handle);
        peripheral.connect().await?;

        info!("Connected; Discovering services...");
        peripheral.discover_services().await?;
        let characteristic = self.find_characteristic(peripheral)?;

        // obtain the stream before subscribing so the first notification is not missed
        let notifications = peripheral.notifications().await?;

        info!("Subscribing to characteristic {:?} {:?}", characteristic.service_uuid, characteristic.uuid);
        peripheral.subscribe(&characteristic).await?;

        let characteristic_uuid = characteristic.uuid;
        let stream = notifications.filter_map(move |notification| {
            ready(notification.uuid.eq(&characteristic_uuid).then_some(notification.value))
        });
        Ok(Box::pin(stream))
    }

    async fn is_connected(&self, handle: &BtleHandle) -> Result<bool, DeviceError> {
        Ok(handle.peripheral.is_connected().await?)
    }

    async fn release(&mut self, handle: BtleHandle) {
        match handle.peripheral.is_connected().await {
            Ok(false) => {},
            _ => {
                if let Err(err) = handle.peripheral.disconnect().await {
                    debug!("Disconnecting from {} failed: {}", handle, err);
                }
            },
        }
    }
}
