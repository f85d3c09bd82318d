use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use futures::Stream;

use crate::error::DeviceError;

/// Raw payloads of the subscribed characteristic, in the order the peripheral sent them.
/// The stream ends when the link goes down.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// The radio operations the connection supervisor drives.
pub trait Transport: Send + Sync {
    /// A discovered peripheral. Owned by the supervisor for one connection attempt.
    type Handle: Display + Send + Sync + 'static;

    /// Scans once and returns the first peripheral whose advertised name contains `device_name`.
    fn discover(&mut self, device_name: &str) -> impl Future<Output = Result<Option<Self::Handle>, DeviceError>> + Send;

    /// Connects, locates the data characteristic and subscribes to its notifications.
    fn connect(&mut self, handle: &Self::Handle) -> impl Future<Output = Result<NotificationStream, DeviceError>> + Send;

    fn is_connected(&self, handle: &Self::Handle) -> impl Future<Output = Result<bool, DeviceError>> + Send;

    /// Best effort disconnect; the handle is discarded afterwards.
    fn release(&mut self, handle: Self::Handle) -> impl Future<Output = ()> + Send;
}
