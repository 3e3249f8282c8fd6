// Engine-to-consumer notification marshaling
//
// GStreamer delivers bus messages and appsink callbacks on its own
// threads. Nothing consumer-owned may be touched from those threads, so
// every notification is pushed into a FIFO queue and applied later on
// the UI/render thread when the player is polled. A wake hook lets the
// consumer's event loop schedule that poll instead of busy-waiting.
//
// Teardown safety falls out of channel ownership: once the receiver is
// dropped with the player, queued-but-undelivered events are dropped
// with it, and producers that outlive the player see a send error and
// do nothing.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

use super::PlayerState;

/// Notifications originating from the media engine.
///
/// All variants are emitted on engine threads and must only be acted on
/// after `Player::poll_events` has marshaled them onto the consumer
/// thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Playback state changed (including engine-driven Buffering).
    StateChanged(PlayerState),
    /// Buffer fill level, 0-100. Useful for progress display only;
    /// observe `StateChanged` to decide whether playback is blocked.
    Buffering(i32),
    /// End of the playback stream was reached; state goes to Stopped.
    EndOfStream,
    /// The configured URL changed.
    UrlChanged,
    /// New playback duration in milliseconds, -1 if unknown.
    DurationChanged(i64),
    /// Current playback position in milliseconds, -1 if unknown.
    PositionUpdated(i64),
    /// Seekability of the current stream changed.
    SeekableChanged(bool),
    /// A new subtitle line is available (already decoded to plain text).
    SubtitleChanged(String),
}

type WakeFn = dyn Fn() + Send + Sync;

/// Producer half handed to engine-thread callbacks.
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: Sender<PlayerEvent>,
    wake: Arc<Mutex<Option<Box<WakeFn>>>>,
}

impl EventSender {
    /// Queues an event for the consumer thread. Silently a no-op if the
    /// consumer side is already gone.
    pub(crate) fn send(&self, event: PlayerEvent) {
        if self.tx.send(event).is_ok() {
            if let Some(wake) = self.wake.lock().as_ref() {
                wake();
            }
        }
    }
}

/// Consumer half, owned by the player.
pub(crate) struct EventQueue {
    rx: Receiver<PlayerEvent>,
    wake: Arc<Mutex<Option<Box<WakeFn>>>>,
}

impl EventQueue {
    pub(crate) fn new() -> (EventSender, EventQueue) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let wake = Arc::new(Mutex::new(None));
        (
            EventSender {
                tx,
                wake: wake.clone(),
            },
            EventQueue { rx, wake },
        )
    }

    /// Installs the hook invoked after every enqueue, e.g. a winit
    /// event-loop proxy send. Replaces any previous hook.
    pub(crate) fn set_wake(&self, wake: impl Fn() + Send + Sync + 'static) {
        *self.wake.lock() = Some(Box::new(wake));
    }

    /// Drains all currently queued events in FIFO order. Never blocks.
    pub(crate) fn drain(&self) -> Vec<PlayerEvent> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fifo_order_preserved() {
        let (tx, queue) = EventQueue::new();

        tx.send(PlayerEvent::UrlChanged);
        tx.send(PlayerEvent::DurationChanged(1234));
        tx.send(PlayerEvent::PositionUpdated(7));

        assert_eq!(
            queue.drain(),
            vec![
                PlayerEvent::UrlChanged,
                PlayerEvent::DurationChanged(1234),
                PlayerEvent::PositionUpdated(7),
            ]
        );
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_fifo_order_across_threads() {
        let (tx, queue) = EventQueue::new();

        let producer = std::thread::spawn(move || {
            for i in 0..100 {
                tx.send(PlayerEvent::PositionUpdated(i));
            }
        });
        producer.join().unwrap();

        let events = queue.drain();
        assert_eq!(events.len(), 100);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(*event, PlayerEvent::PositionUpdated(i as i64));
        }
    }

    #[test]
    fn test_wake_hook_invoked_per_send() {
        let (tx, queue) = EventQueue::new();
        let wakes = Arc::new(AtomicUsize::new(0));

        let counter = wakes.clone();
        queue.set_wake(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(PlayerEvent::EndOfStream);
        tx.send(PlayerEvent::EndOfStream);
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_send_after_consumer_dropped_is_noop() {
        let (tx, queue) = EventQueue::new();
        tx.send(PlayerEvent::UrlChanged);
        drop(queue);

        // Must neither panic nor invoke a stale wake hook.
        tx.send(PlayerEvent::EndOfStream);
    }
}
