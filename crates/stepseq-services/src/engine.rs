//! Sequencer engine: the single point where commands and ticks meet

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use stepseq_core::{
    Command, NoteSink, SequencerConfig, SequencerError, SequencerSnapshot, TracksModel, TransportButton,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::{ClockError, ClockSource};
use crate::command_queue::{command_queue, CommandReceiver, CommandSender, QueueError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Sequencer error: {0}")]
    Sequencer(#[from] SequencerError),
    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Engine already running")]
    AlreadyRunning,
    #[error("Engine not running")]
    NotRunning,
}

/// State owned by the clock thread while running
struct EngineCore {
    model: TracksModel,
    sink: Box<dyn NoteSink>,
    /// Position within the current step, in arpeggiator sub-ticks
    sub_tick: u32,
}

/// Engine state shared between the clock thread and readers
pub struct EngineState {
    core: Mutex<EngineCore>,
    /// Published after every clock callback, so readers never see a
    /// half-applied tick
    snapshot: RwLock<SequencerSnapshot>,
    /// Clock callbacks processed
    callbacks: AtomicU64,
}

/// Runs a `TracksModel` from a clock source. Commands from any thread go
/// through the queue and are applied on the clock thread between ticks.
pub struct SequencerEngine {
    state: Arc<EngineState>,
    clock: Box<dyn ClockSource>,
    commands: CommandSender,
    receiver: CommandReceiver,
    arp_subdivision: u32,
    step_period: Duration,
    running: bool,
}

impl SequencerEngine {
    pub fn new(
        config: &SequencerConfig,
        sink: Box<dyn NoteSink>,
        clock: Box<dyn ClockSource>,
    ) -> Result<Self, EngineError> {
        let model = TracksModel::from_config(config, sink.as_ref())?;
        let step_period = model.transport().step_period();
        let snapshot = model.snapshot();
        let (commands, receiver) = command_queue(config.command_queue_capacity);

        Ok(Self {
            state: Arc::new(EngineState {
                core: Mutex::new(EngineCore {
                    model,
                    sink,
                    sub_tick: 0,
                }),
                snapshot: RwLock::new(snapshot),
                callbacks: AtomicU64::new(0),
            }),
            clock,
            commands,
            receiver,
            arp_subdivision: config.arp_subdivision.max(1),
            step_period,
            running: false,
        })
    }

    /// Get shared state for reader access
    pub fn state(&self) -> Arc<EngineState> {
        self.state.clone()
    }

    /// Producer handle for UI and MIDI input
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn submit(&self, command: Command) -> Result<(), EngineError> {
        self.commands.send(command)?;
        Ok(())
    }

    /// Period between clock callbacks: one step split into arpeggiator sub-ticks
    pub fn clock_period(&self) -> Duration {
        self.step_period / self.arp_subdivision
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.running {
            return Err(EngineError::AlreadyRunning);
        }

        let state = self.state.clone();
        let receiver = self.receiver.clone();
        let subdivision = self.arp_subdivision;
        self.clock.start(
            self.clock_period(),
            Box::new(move || Self::on_clock(&state, &receiver, subdivision)),
        )?;

        self.running = true;
        info!(
            step_ms = self.step_period.as_secs_f64() * 1000.0,
            subdivision, "Sequencer engine started"
        );
        Ok(())
    }

    /// Stop the clock and release every sounding note
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if !self.running {
            return Err(EngineError::NotRunning);
        }
        self.running = false;
        self.clock.stop()?;

        if let Ok(mut core) = self.state.core.lock() {
            let EngineCore { model, sink, sub_tick } = &mut *core;
            for command in self.receiver.drain() {
                model.apply_logged(command, sink.as_mut());
            }
            model.apply_logged(Command::Transport(TransportButton::Stop), sink.as_mut());
            model.tick(sink.as_mut());
            *sub_tick = 0;
            Self::publish(&self.state, model);
        }
        info!("Sequencer engine stopped");
        Ok(())
    }

    /// Clock thread body: apply pending commands, then one step or arpeggiator sub-tick
    fn on_clock(state: &EngineState, receiver: &CommandReceiver, subdivision: u32) {
        let Ok(mut core) = state.core.lock() else {
            warn!("Engine state poisoned, skipping tick");
            return;
        };
        let EngineCore { model, sink, sub_tick } = &mut *core;

        for command in receiver.drain() {
            model.apply_logged(command, sink.as_mut());
        }

        if *sub_tick == 0 {
            model.tick(sink.as_mut());
        } else {
            model.arp_tick(sink.as_mut());
        }
        *sub_tick = (*sub_tick + 1) % subdivision;

        Self::publish(state, model);
        state.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn publish(state: &EngineState, model: &TracksModel) {
        if let Ok(mut snapshot) = state.snapshot.write() {
            *snapshot = model.snapshot();
        }
    }

    /// State as of the last completed clock callback
    pub fn snapshot(&self) -> Option<SequencerSnapshot> {
        self.state.snapshot()
    }

    /// Apply pending commands immediately, without advancing time
    pub fn flush(&self) {
        if let Ok(mut core) = self.state.core.lock() {
            let EngineCore { model, sink, .. } = &mut *core;
            for command in self.receiver.drain() {
                model.apply_logged(command, sink.as_mut());
            }
            Self::publish(&self.state, model);
        }
    }

    /// Access the model directly (locks out the clock thread)
    pub fn with_model<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&TracksModel) -> R,
    {
        self.state.core.lock().ok().map(|core| f(&core.model))
    }
}

impl EngineState {
    pub fn snapshot(&self) -> Option<SequencerSnapshot> {
        self.snapshot.read().ok().map(|s| s.clone())
    }

    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }
}

impl Drop for SequencerEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
