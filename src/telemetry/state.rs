use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::telemetry::reading::Reading;

/// Identifies one connected session with the peripheral. Readings decoded during an epoch that
/// has since ended are refused by [`SharedState::set_for_epoch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

#[derive(Debug, Default)]
struct Inner {
    reading: Reading,
    epoch: u64,
}

/// The single latest reading plus the connectivity flag, shared between the connection
/// supervisor (writer) and the request handlers (readers).
///
/// Every operation takes the lock once, so readers always see a whole reading.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<Inner>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panicking writer cannot leave a torn reading behind: it is always replaced in one
        // assignment
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> Reading {
        self.lock().reading.clone()
    }

    pub fn set(&self, reading: Reading) {
        self.lock().reading = reading;
    }

    pub fn is_connected(&self) -> bool {
        self.lock().reading.connected
    }

    /// Only changes the connectivity flag; the last sensor values are kept. Clearing the flag
    /// also ends the current epoch.
    pub fn set_connected(&self, connected: bool) {
        let mut inner = self.lock();
        if !connected && inner.reading.connected {
            inner.epoch += 1;
        }
        inner.reading.connected = connected;
    }

    /// Marks the link as connected and starts a new epoch for its notifications.
    pub fn begin_epoch(&self) -> Epoch {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.reading.connected = true;
        Epoch(inner.epoch)
    }

    /// Stores `reading` only while `epoch` is still the current, connected epoch.
    pub fn set_for_epoch(&self, epoch: Epoch, reading: Reading) -> bool {
        self.update_for_epoch(epoch, reading, |_| {})
    }

    /// Like [`SharedState::set_for_epoch`], and runs `accepted` on the stored reading before the
    /// lock is released. Ending the epoch cannot happen in between.
    pub fn update_for_epoch(&self, epoch: Epoch, reading: Reading, accepted: impl FnOnce(&Reading)) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch.0 || !inner.reading.connected {
            return false;
        }
        inner.reading = reading;
        accepted(&inner.reading);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn uniform(value: f64) -> Reading {
        Reading {
            force_grams: value,
            torque_mnm: value,
            voltage_v: value,
            current_ma: value,
            power_w: value,
            timestamp: Some(value.to_string()),
            connected: true,
        }
    }

    #[test]
    fn starts_disconnected_with_zero_values() {
        let state = SharedState::new();

        assert_eq!(state.get(), Reading::default());
        assert!(!state.is_connected());
    }

    #[test]
    fn disconnect_keeps_last_values() {
        let state = SharedState::new();
        let epoch = state.begin_epoch();
        assert!(state.set_for_epoch(epoch, uniform(3.5)));

        state.set_connected(false);

        let reading = state.get();
        assert!(!reading.connected);
        assert_eq!(reading, Reading { connected: false, ..uniform(3.5) });
    }

    #[test]
    fn readings_from_an_ended_epoch_are_refused() {
        let state = SharedState::new();
        let old = state.begin_epoch();
        assert!(state.set_for_epoch(old, uniform(1.0)));

        state.set_connected(false);
        assert!(!state.set_for_epoch(old, uniform(2.0)));

        let new = state.begin_epoch();
        assert_ne!(old, new);
        assert!(!state.set_for_epoch(old, uniform(2.0)));
        assert!(state.set_for_epoch(new, uniform(3.0)));
        assert_eq!(state.get(), uniform(3.0));
    }

    #[test]
    fn readers_never_see_torn_readings() {
        let state = SharedState::new();
        let epoch = state.begin_epoch();
        assert!(state.set_for_epoch(epoch, uniform(-1.0)));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..8).map(|_| {
            let state = state.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut observed = 0;
                loop {
                    let r = state.get();
                    assert_eq!(r.force_grams, r.torque_mnm);
                    assert_eq!(r.force_grams, r.voltage_v);
                    assert_eq!(r.force_grams, r.current_ma);
                    assert_eq!(r.force_grams, r.power_w);
                    assert_eq!(r.timestamp, Some(r.force_grams.to_string()));
                    observed += 1;
                    if done.load(Ordering::Relaxed) {
                        break observed;
                    }
                }
            })
        }).collect();

        for i in 0..20_000 {
            assert!(state.set_for_epoch(epoch, uniform(i as f64)));
        }
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        assert_eq!(state.get(), uniform(19_999.0));
    }
}
