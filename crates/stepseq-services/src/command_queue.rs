//! Bounded command queue between UI/MIDI-input producers and the clock thread

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use stepseq_core::Command;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Command queue closed")]
    Closed,
}

/// Create a queue holding at most `capacity` pending commands. When full,
/// the oldest pending command is dropped to make room for the newest.
pub fn command_queue(capacity: usize) -> (CommandSender, CommandReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = bounded(capacity);
    let sender = CommandSender {
        tx,
        evict: rx.clone(),
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sender, CommandReceiver { rx, capacity })
}

/// Producer handle; cheap to clone into UI and MIDI callbacks
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Command>,
    /// Receiver clone used only to evict the oldest command on overflow
    evict: Receiver<Command>,
    dropped: Arc<AtomicU64>,
}

impl CommandSender {
    /// Never blocks
    pub fn send(&self, command: Command) -> Result<(), QueueError> {
        let mut command = command;
        loop {
            match self.tx.try_send(command) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(oldest) = self.evict.try_recv() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(?oldest, "Command queue full, dropped oldest");
                    }
                    command = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Err(QueueError::Closed),
            }
        }
    }

    /// Commands evicted since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Consumer side, drained by the clock thread between ticks
#[derive(Clone)]
pub struct CommandReceiver {
    rx: Receiver<Command>,
    capacity: usize,
}

impl CommandReceiver {
    /// Pending commands in arrival order. Bounded to one queue's worth so a
    /// busy producer cannot starve the tick.
    pub fn drain(&self) -> impl Iterator<Item = Command> + '_ {
        self.rx.try_iter().take(self.capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use stepseq_core::{TrackId, TransportButton};

    use super::*;

    fn mute(track: usize) -> Command {
        Command::ToggleMute { track: TrackId(track) }
    }

    #[test]
    fn test_drain_in_order() {
        let (tx, rx) = command_queue(8);
        tx.send(mute(0)).unwrap();
        tx.send(Command::Transport(TransportButton::Play)).unwrap();
        let drained: Vec<Command> = rx.drain().collect();
        assert_eq!(drained, vec![mute(0), Command::Transport(TransportButton::Play)]);
        assert_eq!(rx.drain().count(), 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let (tx, rx) = command_queue(2);
        tx.send(mute(0)).unwrap();
        tx.send(mute(1)).unwrap();
        tx.send(mute(2)).unwrap();
        assert_eq!(tx.dropped(), 1);
        assert_eq!(tx.pending(), 2);
        let drained: Vec<Command> = rx.drain().collect();
        assert_eq!(drained, vec![mute(1), mute(2)]);
    }

    #[test]
    fn test_clones_share_queue() {
        let (tx, rx) = command_queue(4);
        let other = tx.clone();
        other.send(mute(3)).unwrap();
        tx.send(mute(4)).unwrap();
        assert_eq!(rx.drain().count(), 2);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let (tx, rx) = command_queue(0);
        assert_eq!(rx.capacity(), 1);
        tx.send(mute(0)).unwrap();
        tx.send(mute(1)).unwrap();
        assert_eq!(rx.drain().collect::<Vec<_>>(), vec![mute(1)]);
    }
}
