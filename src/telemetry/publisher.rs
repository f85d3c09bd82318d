use tokio::sync::broadcast;

use crate::telemetry::reading::Reading;
use crate::telemetry::state::{Epoch, SharedState};

/// Readings a slow push session may fall behind by before it starts skipping.
pub const PUSH_CHANNEL_CAPACITY: usize = 64;

/// Fans readings out to the dashboard sessions and answers snapshot queries.
///
/// Delivery is best effort: a session that lags more than the channel capacity misses the
/// oldest readings, and broadcasting with nobody listening is not an error.
#[derive(Debug, Clone)]
pub struct Publisher {
    state: SharedState,
    sender: broadcast::Sender<Reading>,
}

impl Publisher {
    pub fn new(state: SharedState, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Publisher { state, sender }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Returns the number of sessions the reading was queued for.
    pub fn broadcast(&self, reading: &Reading) -> usize {
        self.sender.send(reading.clone()).unwrap_or(0)
    }

    /// Stores `reading` and broadcasts it as one step, unless `epoch` has ended. Once the
    /// connected flag is cleared no reading of that epoch reaches a session.
    pub fn publish_for_epoch(&self, epoch: Epoch, reading: Reading) -> bool {
        self.state.update_for_epoch(epoch, reading, |stored| {
            self.broadcast(stored);
        })
    }

    pub fn snapshot(&self) -> Reading {
        self.state.get()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Reading> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn reading(force: f64) -> Reading {
        Reading { force_grams: force, connected: true, ..Reading::default() }
    }

    #[test]
    fn broadcast_without_sessions_is_fine() {
        let publisher = Publisher::new(SharedState::new(), 4);
        assert_eq!(publisher.broadcast(&reading(1.0)), 0);
    }

    #[tokio::test]
    async fn every_session_receives_readings_in_order() {
        let publisher = Publisher::new(SharedState::new(), 8);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        assert_eq!(publisher.broadcast(&reading(1.0)), 2);
        assert_eq!(publisher.broadcast(&reading(2.0)), 2);

        for session in [&mut first, &mut second] {
            assert_eq!(session.recv().await.unwrap().force_grams, 1.0);
            assert_eq!(session.recv().await.unwrap().force_grams, 2.0);
            assert!(matches!(session.try_recv(), Err(TryRecvError::Empty)));
        }
    }

    #[tokio::test]
    async fn slow_sessions_skip_old_readings() {
        let publisher = Publisher::new(SharedState::new(), 2);
        let mut slow = publisher.subscribe();

        for force in 1..=5 {
            publisher.broadcast(&reading(force as f64));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(slow.recv().await.unwrap().force_grams, 4.0);
        assert_eq!(slow.recv().await.unwrap().force_grams, 5.0);
    }

    #[test]
    fn readings_of_an_ended_epoch_are_not_published() {
        let publisher = Publisher::new(SharedState::new(), 4);
        let mut session = publisher.subscribe();
        let epoch = publisher.state().begin_epoch();

        assert!(publisher.publish_for_epoch(epoch, reading(1.0)));
        publisher.state().set_connected(false);
        assert!(!publisher.publish_for_epoch(epoch, reading(2.0)));

        assert_eq!(session.try_recv().unwrap(), reading(1.0));
        assert!(matches!(session.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(publisher.snapshot(), Reading { connected: false, ..reading(1.0) });
    }

    #[test]
    fn nothing_is_pushed_after_the_link_is_marked_down() {
        const ATTEMPTS: usize = 50_000;
        let publisher = Publisher::new(SharedState::new(), ATTEMPTS + 1);
        let mut session = publisher.subscribe();
        let epoch = publisher.state().begin_epoch();
        let published = Arc::new(AtomicUsize::new(0));

        let writer = {
            let publisher = publisher.clone();
            let published = Arc::clone(&published);
            thread::spawn(move || {
                for i in 0..ATTEMPTS {
                    if !publisher.publish_for_epoch(epoch, reading(i as f64)) {
                        break;
                    }
                    published.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        while published.load(Ordering::Relaxed) < 100 {
            thread::yield_now();
        }
        publisher.state().set_connected(false);
        let marker = Reading { force_grams: -1.0, ..Reading::default() };
        publisher.broadcast(&marker);
        writer.join().unwrap();

        let mut received = Vec::new();
        while let Ok(reading) = session.try_recv() {
            received.push(reading);
        }
        assert_eq!(received.last(), Some(&marker));
        assert!(received[..received.len() - 1].iter().all(|reading| reading.connected));
    }

    #[test]
    fn snapshot_reads_shared_state() {
        let state = SharedState::new();
        let publisher = Publisher::new(state.clone(), 4);

        state.set(reading(7.0));

        assert_eq!(publisher.snapshot(), reading(7.0));
        assert_eq!(publisher.state().get(), reading(7.0));
    }
}
