//! In-memory [`Transport`] for exercising the connection supervisor without a radio.

use std::sync::{Arc, Mutex, MutexGuard};
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::future::pending;

use crate::device::constants::{SENSOR_DATA_CHARACTERISTIC, SENSOR_SERVICE};
use crate::device::transport::{NotificationStream, Transport};
use crate::error::DeviceError;

#[derive(Default)]
struct Script {
    advertised: Option<String>,
    failing_connects: usize,
    hang_next_scan: bool,
    hang_next_connect: bool,
    link_alive: bool,
    notifier: Option<UnboundedSender<Vec<u8>>>,
    scans: usize,
    connects: usize,
    releases: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn advertise(&self, name: &str) {
        self.script().advertised = Some(name.to_string());
    }

    pub fn stop_advertising(&self) {
        self.script().advertised = None;
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.script().failing_connects = count;
    }

    pub fn hang_next_scan(&self) {
        self.script().hang_next_scan = true;
    }

    pub fn hang_next_connect(&self) {
        self.script().hang_next_connect = true;
    }

    pub fn notify(&self, payload: &[u8]) {
        let script = self.script();
        let notifier = script.notifier.as_ref().expect("not subscribed");
        notifier.unbounded_send(payload.to_vec()).expect("notification stream closed");
    }

    /// The peripheral stops answering liveness checks; its stream stays open.
    pub fn drop_link(&self) {
        self.script().link_alive = false;
    }

    /// Ends the notification stream while liveness checks keep succeeding.
    pub fn close_stream(&self) {
        self.script().notifier = None;
    }

    pub fn scan_count(&self) -> usize {
        self.script().scans
    }

    pub fn connect_count(&self) -> usize {
        self.script().connects
    }

    pub fn release_count(&self) -> usize {
        self.script().releases
    }
}

impl Transport for ScriptedTransport {
    type Handle = String;

    async fn discover(&mut self, device_name: &str) -> Result<Option<String>, DeviceError> {
        let hang = {
            let mut script = self.script();
            script.scans += 1;
            std::mem::take(&mut script.hang_next_scan)
        };
        if hang {
            pending::<()>().await;
        }

        Ok(self.script().advertised.clone().filter(|name| name.contains(device_name)))
    }

    async fn connect(&mut self, _handle: &String) -> Result<NotificationStream, DeviceError> {
        let hang = {
            let mut script = self.script();
            script.connects += 1;
            std::mem::take(&mut script.hang_next_connect)
        };
        if hang {
            pending::<()>().await;
        }

        let mut script = self.script();
        if script.failing_connects > 0 {
            script.failing_connects -= 1;
            return Err(DeviceError::MissingCharacteristic {
                service: SENSOR_SERVICE,
                characteristic: SENSOR_DATA_CHARACTERISTIC,
            });
        }

        let (sender, receiver) = unbounded();
        script.notifier = Some(sender);
        script.link_alive = true;
        Ok(Box::pin(receiver))
    }

    async fn is_connected(&self, _handle: &String) -> Result<bool, DeviceError> {
        Ok(self.script().link_alive)
    }

    async fn release(&mut self, _handle: String) {
        let mut script = self.script();
        script.releases += 1;
        script.notifier = None;
        script.link_alive = false;
    }
}
