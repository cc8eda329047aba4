//! Delivery side of evlog.
//!
//! Encoded lines are handed to a [`Writer`], which only enqueues them. A
//! [`DeliveryContext`] owns the registered writers and runs a single
//! background thread that periodically drains every writer and performs the
//! actual I/O. On shutdown it drains once more before signaling completion.
//!
//! Backends:
//! - [`StdoutWriter`]: prints immediately (`stdout` scheme, the default)
//! - [`FileWriter`]: appends to a file with optional time-based rotation
//! - [`BulkWriter`]: batches lines to an HTTP bulk-ingest endpoint (`es`/`ess`)

pub mod bulk;
pub mod error;
pub mod file;
pub mod registry;
pub mod scheduler;
pub mod stdout;
pub mod writer;

pub use bulk::BulkWriter;
pub use error::{Result, WriterError};
pub use file::{Clock, FileWriter, SystemClock};
pub use registry::{WriterMaker, WriterRegistry};
pub use scheduler::DeliveryContext;
pub use stdout::StdoutWriter;
pub use writer::{FlushMode, Writer, WriterConfig};

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::subscriber::NoSubscriber;

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Report a dropped delivery on the diagnostics channel.
///
/// Goes through `tracing` when a subscriber is installed, stderr otherwise,
/// so failures are never silent.
pub fn report_failure(writer: &str, message: &str, error: &dyn fmt::Display) {
    let has_subscriber = tracing::dispatcher::get_default(|d| !d.is::<NoSubscriber>());
    if has_subscriber {
        tracing::error!(writer, error = %error, "{message}");
    } else {
        eprintln!("evlog {writer}: {message}: {error}");
    }
}
