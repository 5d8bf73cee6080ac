//! Readers-writer lock that traces its own lifecycle.
//!
//! [`LoggingRwLock`] wraps `parking_lot`'s raw readers-writer lock. Before each
//! acquire and release it captures the caller's stack, appends the action
//! (`obtaining lock`, `releasing lock`, `obtaining read lock`,
//! `releasing read lock`) and the lock's label to the first line, and writes
//! the block to standard error in one piece:
//!
//! ```text
//! thread 'worker' (ThreadId(3)) stack backtrace: obtaining read lock for "db"
//!    0: app::store::load
//!              at src/store.rs:42:17
//!    ...
//! ```
//!
//! Because the trace is written before blocking, a deadlocked thread still
//! leaves a record of the lock it was waiting for. Output volume makes this a
//! debugging tool, not something to ship.
//!
//! # Using this crate
//!
//! The guarded API works like any `lock_api` lock:
//!
//! ```
//! let cache = rwtrace::rwlock("cache", Vec::<u32>::new());
//! cache.write().push(7);
//! assert_eq!(cache.read().len(), 1);
//! ```
//!
//! The raw lock exposes the four operations directly:
//!
//! ```
//! let lock = rwtrace::LoggingRwLock::named("db");
//! lock.read_lock();
//! // SAFETY: the read lock was obtained just above.
//! unsafe { lock.read_unlock() };
//! ```
//!
//! Sinks and stack capture are injectable per lock, see [`Sink`] and
//! [`StackCapture`].

mod capture;
mod config;
mod event;
mod lock;
mod sink;

#[cfg(test)]
mod tests;

pub use capture::{FixedCapture, NativeCapture, StackCapture};
pub use config::TraceOptions;
pub use event::{Action, format_event};
pub use lock::{
    Locker, LoggingRwLock, ReadLocker, RwLock, RwLockReadGuard, RwLockWriteGuard, rwlock,
    rwlock_with,
};
pub use rwtrace_trace_capture::CaptureOptions;
pub use sink::{MemorySink, Sink, StderrSink, TracingSink};
