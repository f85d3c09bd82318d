use std::time::Duration;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::device::transport::{NotificationStream, Transport};
use crate::device::types::ConnectionState;
use crate::error::{readable_task_panic_error, DeviceError, LinkError};
use crate::telemetry::decoder::decode;
use crate::telemetry::publisher::Publisher;
use crate::telemetry::state::Epoch;

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub device_name: String,
    pub backoff: Duration,
    pub poll_interval: Duration,
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
    pub liveness_deadline: Duration,
}

impl From<&Config> for SupervisorSettings {
    fn from(config: &Config) -> Self {
        SupervisorSettings {
            device_name: config.device_name.clone(),
            backoff: config.backoff(),
            poll_interval: config.poll_interval(),
            scan_timeout: config.scan_timeout(),
            connect_timeout: config.connect_timeout(),
            liveness_deadline: config.liveness_deadline(),
        }
    }
}

struct Session<H> {
    handle: H,
    epoch: Epoch,
    reader: JoinHandle<()>,
    // cancels `reader`; a child of the supervisor's token
    cancel: CancellationToken,
}

enum Phase<H> {
    Scanning {
        retry: bool,
    },
    Connecting {
        handle: H,
    },
    Subscribed {
        session: Session<H>,
    },
    Disconnected {
        handle: H,
        cause: LinkError,
    },
}

impl<H> Phase<H> {
    fn state(&self) -> ConnectionState {
        match self {
            Phase::Scanning { .. } => ConnectionState::Scanning,
            Phase::Connecting { .. } => ConnectionState::Connecting,
            Phase::Subscribed { .. } => ConnectionState::Subscribed,
            Phase::Disconnected { .. } => ConnectionState::Disconnected,
        }
    }
}

/// Owns the scan -> connect -> subscribe -> monitor cycle for the configured peripheral.
///
/// Every failure is logged, clears the connected flag and starts over at scanning; the loop only
/// ends when the cancellation token passed to [`Supervisor::run`] is cancelled.
pub struct Supervisor<T: Transport> {
    transport: T,
    settings: SupervisorSettings,
    publisher: Publisher,
    state_sender: watch::Sender<ConnectionState>,
}

impl<T: Transport> Supervisor<T> {
    pub fn new(transport: T, settings: SupervisorSettings, publisher: Publisher) -> Self {
        let (state_sender, _) = watch::channel(ConnectionState::Scanning);

        Supervisor {
            transport,
            settings,
            publisher,
            state_sender,
        }
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_sender.subscribe()
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Looking for peripheral \"{}\"", self.settings.device_name);
        let mut phase: Phase<T::Handle> = Phase::Scanning { retry: false };

        while !cancel.is_cancelled() {
            phase = self.advance(phase, &cancel).await;
            self.report(phase.state());
        }

        self.teardown(phase).await;
        info!("Connection supervisor stopped");
    }

    fn report(&self, state: ConnectionState) {
        self.state_sender.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            info!("Connection state: {} -> {}", current, state);
            *current = state;
            true
        });
    }

    async fn advance(&mut self, phase: Phase<T::Handle>, cancel: &CancellationToken) -> Phase<T::Handle> {
        let result = match phase {
            Phase::Scanning { retry } => self.scan(retry, cancel).await,
            Phase::Connecting { handle } => self.connect(handle, cancel).await,
            Phase::Subscribed { session } => Ok(self.monitor(session, cancel).await),
            Phase::Disconnected { handle, cause } => {
                warn!("{}", cause);
                self.transport.release(handle).await;
                Ok(Phase::Scanning { retry: cause.backs_off() })
            },
        };

        match result {
            Ok(next) => next,
            Err(err) => {
                warn!("{}", err);
                self.publisher.state().set_connected(false);
                if err.backs_off() {
                    info!("Retrying in {:?}", self.settings.backoff);
                }
                Phase::Scanning { retry: err.backs_off() }
            },
        }
    }

    // returns false if cancelled before `duration` elapsed
    async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }

    async fn scan(&mut self, retry: bool, cancel: &CancellationToken) -> Result<Phase<T::Handle>, LinkError> {
        if retry && !Self::pause(self.settings.backoff, cancel).await {
            return Ok(Phase::Scanning { retry });
        }

        let deadline = self.settings.scan_timeout;
        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Phase::Scanning { retry }),
            found = timeout(deadline, self.transport.discover(&self.settings.device_name)) => match found {
                Ok(found) => found,
                Err(_) => Err(DeviceError::Timeout { operation: "Scanning", deadline }),
            },
        };

        match found {
            Ok(Some(handle)) => Ok(Phase::Connecting { handle }),
            Ok(None) => Err(LinkError::NotFound { device_name: self.settings.device_name.clone() }),
            Err(source) => Err(LinkError::Discovery { source }),
        }
    }

    async fn connect(&mut self, handle: T::Handle, cancel: &CancellationToken) -> Result<Phase<T::Handle>, LinkError> {
        let deadline = self.settings.connect_timeout;
        let attempt = tokio::select! {
            biased;
            // teardown releases the handle
            _ = cancel.cancelled() => return Ok(Phase::Connecting { handle }),
            attempt = timeout(deadline, self.transport.connect(&handle)) => attempt,
        };
        let result = match attempt {
            Ok(result) => result,
            Err(_) => Err(DeviceError::Timeout { operation: "Connecting", deadline }),
        };

        let notifications = match result {
            Ok(notifications) => notifications,
            Err(source) => {
                let device = handle.to_string();
                self.transport.release(handle).await;
                return Err(LinkError::Connection { device, source });
            },
        };

        let epoch = self.publisher.state().begin_epoch();
        let reader_cancel = cancel.child_token();
        let reader = read_notifications_task(reader_cancel.clone(), notifications, epoch, self.publisher.clone());
        info!("Subscribed to {}", handle);

        Ok(Phase::Subscribed {
            session: Session { handle, epoch, reader, cancel: reader_cancel },
        })
    }

    async fn monitor(&mut self, session: Session<T::Handle>, cancel: &CancellationToken) -> Phase<T::Handle> {
        if !Self::pause(self.settings.poll_interval, cancel).await {
            // run() sees the cancellation and tears the session down
            return Phase::Subscribed { session };
        }

        let reason = if session.reader.is_finished() {
            Some("notification stream ended".to_string())
        } else {
            match timeout(self.settings.liveness_deadline, self.transport.is_connected(&session.handle)).await {
                Ok(Ok(true)) => None,
                Ok(Ok(false)) => Some("peripheral disconnected".to_string()),
                Ok(Err(err)) => Some(format!("checking the connection failed: {}", err)),
                Err(_) => Some("checking the connection took too long".to_string()),
            }
        };

        match reason {
            None => Phase::Subscribed { session },
            Some(reason) => {
                let device = session.handle.to_string();
                let handle = self.end_session(session).await;
                Phase::Disconnected { handle, cause: LinkError::LinkLost { device, reason } }
            },
        }
    }

    /// Clears the connected flag (which retires the epoch), then stops the reader task.
    async fn end_session(&self, session: Session<T::Handle>) -> T::Handle {
        self.publisher.state().set_connected(false);
        session.cancel.cancel();

        info!("Waiting for read notifications task to stop");
        match session.reader.await {
            Ok(()) => debug!("Read notifications task of epoch {:?} stopped", session.epoch),
            Err(err) if err.is_panic() => {
                warn!("Read notifications task failed: {}", readable_task_panic_error(&err.into_panic()));
            },
            Err(err) => warn!("Read notifications task failed: {}", err),
        }

        session.handle
    }

    async fn teardown(&mut self, phase: Phase<T::Handle>) {
        match phase {
            Phase::Scanning { .. } => {},
            Phase::Connecting { handle } | Phase::Disconnected { handle, .. } => {
                self.transport.release(handle).await;
            },
            Phase::Subscribed { session } => {
                let handle = self.end_session(session).await;
                self.transport.release(handle).await;
            },
        }
        self.publisher.state().set_connected(false);
    }
}

fn handle_notification(publisher: &Publisher, epoch: Epoch, payload: &[u8]) {
    match decode(payload) {
        Err(err) => warn!("Discarding notification: {}", err),
        Ok(reading) => {
            debug!(
                "Data: Force={:.2}g, Torque={:.2}mN.m, Power={:.3}W",
                reading.force_grams, reading.torque_mnm, reading.power_w,
            );
            if !publisher.publish_for_epoch(epoch, reading) {
                debug!("Dropping notification from ended epoch {:?}", epoch);
            }
        },
    }
}

fn read_notifications_task(cancel: CancellationToken, mut notifications: NotificationStream, epoch: Epoch, publisher: Publisher) -> JoinHandle<()> {
    spawn(async move {
        'mainloop: loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                next = notifications.next() => match next {
                    Some(payload) => handle_notification(&publisher, epoch, &payload),
                    None => {
                        info!("Notification stream ended");
                        break 'mainloop;
                    },
                },
            }
        }
    })
}
