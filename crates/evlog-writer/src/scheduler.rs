//! Background delivery loop.
//!
//! A [`DeliveryContext`] owns the registered writers and one background
//! thread. Producers never wait on it: they enqueue into writers and return.
//!
//! Lifecycle:
//! - `start` launches the loop (idempotent while it is alive)
//! - `stop` asks the loop to finish, without blocking
//! - `wait` blocks until the loop has drained every writer one final time
//!   and closed them; it returns at once if the loop was never started

use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use evlog_common::Config;
use tracing::{debug, info};

use crate::error::{Result, WriterError};
use crate::lock;
use crate::writer::{FlushMode, Writer};

/// Default pause between drain passes.
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

static GLOBAL: OnceLock<Arc<DeliveryContext>> = OnceLock::new();

#[derive(Debug, Default)]
struct LoopState {
    /// Producers may rely on the loop to drain.
    running: bool,
    /// A loop thread exists and has not yet signaled completion.
    active: bool,
}

pub struct DeliveryContext {
    writers: Mutex<Vec<Arc<dyn Writer>>>,
    state: Mutex<LoopState>,
    finished: Condvar,
    tick: Duration,
}

impl std::fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("DeliveryContext")
            .field("writers", &lock(&self.writers).len())
            .field("running", &state.running)
            .field("active", &state.active)
            .field("tick", &self.tick)
            .finish()
    }
}

impl Default for DeliveryContext {
    fn default() -> Self {
        Self::with_tick(DEFAULT_TICK)
    }
}

impl DeliveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tick(tick: Duration) -> Self {
        DeliveryContext {
            writers: Mutex::new(Vec::new()),
            state: Mutex::new(LoopState::default()),
            finished: Condvar::new(),
            tick,
        }
    }

    /// Context ticking at `config.tick_ms`.
    pub fn from_config(config: &Config) -> Self {
        Self::with_tick(Duration::from_millis(config.tick_ms))
    }

    /// Process-wide context used by loggers that are not given one.
    pub fn global() -> Arc<DeliveryContext> {
        GLOBAL
            .get_or_init(|| Arc::new(DeliveryContext::new()))
            .clone()
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Add a writer. Writers are drained in registration order.
    pub fn register(&self, writer: Arc<dyn Writer>) {
        lock(&self.writers).push(writer);
    }

    pub fn writer_count(&self) -> usize {
        lock(&self.writers).len()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Launch the delivery loop. Calling it while a loop is alive only
    /// re-arms that loop.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut state = lock(&self.state);
        state.running = true;
        if state.active {
            return Ok(());
        }

        let ctx = Arc::clone(self);
        thread::Builder::new()
            .name("evlog-delivery".to_string())
            .spawn(move || ctx.run_loop())
            .map_err(|e| {
                state.running = false;
                WriterError::Spawn(e)
            })?;
        state.active = true;
        info!(tick_ms = self.tick.as_millis() as u64, "delivery loop started");
        Ok(())
    }

    /// Ask the loop to finish. Returns immediately.
    pub fn stop(&self) {
        lock(&self.state).running = false;
    }

    /// Block until the loop has done its final drain.
    pub fn wait(&self) {
        let mut state = lock(&self.state);
        while state.active {
            state = self
                .finished
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Drain every writer once on the calling thread.
    pub fn run_all(&self, mode: FlushMode) {
        // snapshot so that no lock is held across writer I/O
        let writers: Vec<Arc<dyn Writer>> = lock(&self.writers).clone();
        for writer in &writers {
            writer.run(mode);
        }
    }

    fn close_all(&self) {
        let writers: Vec<Arc<dyn Writer>> = lock(&self.writers).clone();
        for writer in &writers {
            writer.close();
        }
    }

    fn run_loop(self: Arc<Self>) {
        loop {
            self.run_all(FlushMode::Periodic);
            if self.is_running() {
                thread::sleep(self.tick);
                continue;
            }

            // let producers that saw the loop running finish enqueueing
            thread::sleep(self.tick);
            self.run_all(FlushMode::Final);
            self.close_all();

            let mut state = lock(&self.state);
            if state.running {
                debug!("delivery loop restarted during final drain");
                continue;
            }
            state.active = false;
            self.finished.notify_all();
            debug!("delivery loop finished");
            return;
        }
    }
}
