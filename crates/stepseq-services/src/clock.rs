//! Periodic tick sources driving the engine

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Invoked once per clock period on the clock's own thread
pub type TickCallback = Box<dyn FnMut() + Send + 'static>;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("Clock already running")]
    AlreadyRunning,
    #[error("Clock not running")]
    NotRunning,
    #[error("Invalid clock period: {0:?}")]
    InvalidPeriod(Duration),
    #[error("Failed to spawn clock thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A periodic callback source. The engine never manages OS timers itself.
pub trait ClockSource: Send {
    fn start(&mut self, period: Duration, on_tick: TickCallback) -> Result<(), ClockError>;
    fn stop(&mut self) -> Result<(), ClockError>;
    fn is_running(&self) -> bool;
}

/// Dedicated thread ticking against absolute deadlines, so sleep jitter
/// does not accumulate into tempo drift
pub struct ThreadClock {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadClock {
    pub fn new() -> Self {
        Self {
            stop_tx: None,
            handle: None,
        }
    }

    fn run(period: Duration, mut on_tick: TickCallback, stop_rx: crossbeam_channel::Receiver<()>) {
        let mut deadline = Instant::now();
        loop {
            on_tick();

            deadline += period;
            let now = Instant::now();
            if now > deadline + period {
                let missed = ((now - deadline).as_secs_f64() / period.as_secs_f64()) as u32;
                warn!(missed, "Clock fell behind, skipping ahead");
                deadline += period * missed;
            }

            match stop_rx.recv_deadline(deadline) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Clock thread exiting");
    }
}

impl Default for ThreadClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for ThreadClock {
    fn start(&mut self, period: Duration, on_tick: TickCallback) -> Result<(), ClockError> {
        if self.handle.is_some() {
            return Err(ClockError::AlreadyRunning);
        }
        if period.is_zero() {
            return Err(ClockError::InvalidPeriod(period));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("stepseq-clock".into())
            .spawn(move || Self::run(period, on_tick, stop_rx))?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        info!(period_ms = period.as_secs_f64() * 1000.0, "Clock started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ClockError> {
        let handle = self.handle.take().ok_or(ClockError::NotRunning)?;
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if handle.join().is_err() {
            warn!("Clock thread panicked");
        }
        info!("Clock stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for ThreadClock {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[derive(Default)]
struct ManualClockInner {
    callback: Option<TickCallback>,
    period: Option<Duration>,
}

/// Clock advanced by hand. Clones share state, so a test can keep one while
/// the engine owns another.
#[derive(Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualClockInner>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire one tick. Returns false when the clock is stopped.
    pub fn tick(&self) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        match inner.callback.as_mut() {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Fire `n` ticks, returning how many ran
    pub fn tick_n(&self, n: usize) -> usize {
        (0..n).take_while(|_| self.tick()).count()
    }

    /// Period the clock was last started with
    pub fn period(&self) -> Option<Duration> {
        self.inner.lock().ok().and_then(|inner| inner.period)
    }
}

impl ClockSource for ManualClock {
    fn start(&mut self, period: Duration, on_tick: TickCallback) -> Result<(), ClockError> {
        let Ok(mut inner) = self.inner.lock() else {
            return Err(ClockError::NotRunning);
        };
        if inner.callback.is_some() {
            return Err(ClockError::AlreadyRunning);
        }
        if period.is_zero() {
            return Err(ClockError::InvalidPeriod(period));
        }
        inner.callback = Some(on_tick);
        inner.period = Some(period);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ClockError> {
        let Ok(mut inner) = self.inner.lock() else {
            return Err(ClockError::NotRunning);
        };
        inner.callback.take().map(|_| ()).ok_or(ClockError::NotRunning)
    }

    fn is_running(&self) -> bool {
        self.inner.lock().map(|inner| inner.callback.is_some()).unwrap_or(false)
    }
}
