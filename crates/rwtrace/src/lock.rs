use std::fmt;
use std::sync::Arc;

use lock_api::RawRwLock as _;

use rwtrace_trace_capture::CaptureOptions;

use crate::capture::{NativeCapture, StackCapture};
use crate::config::TraceOptions;
use crate::event::{Action, format_event};
use crate::sink::{Sink, StderrSink};

/// Raw readers-writer lock that writes a stack trace to its sink before every
/// acquire and release.
///
/// Mutual exclusion comes entirely from the wrapped `parking_lot::RawRwLock`;
/// this type only adds emissions around each call. Emission always happens
/// before the delegated call, so a thread stuck waiting for the lock has
/// already announced what it was trying to do.
pub struct LoggingRwLock {
    raw: parking_lot::RawRwLock,
    label: String,
    sink: Option<Arc<dyn Sink>>,
    capture: Option<Arc<dyn StackCapture>>,
    native: NativeCapture,
    confirm: bool,
}

impl LoggingRwLock {
    /// Unlocked, unlabelled, writing native stack traces to stderr.
    pub const fn new() -> Self {
        Self {
            raw: <parking_lot::RawRwLock as lock_api::RawRwLock>::INIT,
            label: String::new(),
            sink: None,
            capture: None,
            native: NativeCapture::DEFAULT,
            confirm: false,
        }
    }

    pub fn named(label: impl Into<String>) -> Self {
        let mut lock = Self::new();
        lock.label = label.into();
        lock
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replaces native stack walking. Capture options set later are kept but
    /// have no effect while a custom capture is installed.
    pub fn with_capture(mut self, capture: Arc<dyn StackCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn capture_options(mut self, options: CaptureOptions) -> Self {
        self.native = NativeCapture::new(options);
        self
    }

    pub fn with_options(self, options: TraceOptions) -> Self {
        self.capture_options(options.capture)
            .confirm_transitions(options.confirm_transitions)
    }

    pub fn confirm_transitions(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// Blocks until exclusive ownership is granted.
    pub fn write_lock(&self) {
        self.emit(Action::Obtaining);
        self.raw.lock_exclusive();
        if self.confirm {
            self.emit(Action::Obtained);
        }
    }

    /// Attempts exclusive ownership without blocking.
    pub fn try_write_lock(&self) -> bool {
        self.emit(Action::Trying);
        let acquired = self.raw.try_lock_exclusive();
        if acquired && self.confirm {
            self.emit(Action::Obtained);
        }
        acquired
    }

    /// Releases exclusive ownership.
    ///
    /// # Safety
    ///
    /// The caller must hold this lock exclusively.
    pub unsafe fn write_unlock(&self) {
        self.emit(Action::Releasing);
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.raw.unlock_exclusive() };
        if self.confirm {
            self.emit(Action::Released);
        }
    }

    /// Blocks until shared ownership is granted.
    pub fn read_lock(&self) {
        self.emit(Action::ObtainingRead);
        self.raw.lock_shared();
        if self.confirm {
            self.emit(Action::ObtainedRead);
        }
    }

    /// Attempts shared ownership without blocking.
    pub fn try_read_lock(&self) -> bool {
        self.emit(Action::TryingRead);
        let acquired = self.raw.try_lock_shared();
        if acquired && self.confirm {
            self.emit(Action::ObtainedRead);
        }
        acquired
    }

    /// Releases one shared ownership.
    ///
    /// # Safety
    ///
    /// The caller must hold a shared lock on this lock.
    pub unsafe fn read_unlock(&self) {
        self.emit(Action::ReleasingRead);
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.raw.unlock_shared() };
        if self.confirm {
            self.emit(Action::ReleasedRead);
        }
    }

    /// Shared-mode access to the wrapped lock that emits nothing, for code that
    /// expects a plain [`Locker`].
    pub fn read_locker(&self) -> ReadLocker<'_> {
        ReadLocker { raw: &self.raw }
    }

    fn emit(&self, action: Action) {
        let capture: &dyn StackCapture = match &self.capture {
            Some(capture) => capture.as_ref(),
            None => &self.native,
        };
        let block = format_event(&capture.capture_lines(), action, &self.label);
        match &self.sink {
            Some(sink) => sink.write_block(&block),
            None => StderrSink.write_block(&block),
        }
    }
}

impl Default for LoggingRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoggingRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingRwLock")
            .field("label", &self.label)
            .field("custom_sink", &self.sink.is_some())
            .field("custom_capture", &self.capture.is_some())
            .field("confirm", &self.confirm)
            .finish_non_exhaustive()
    }
}

// SAFETY: every method delegates to `parking_lot::RawRwLock` with the same
// arguments; emissions never touch the lock state.
unsafe impl lock_api::RawRwLock for LoggingRwLock {
    const INIT: Self = Self::new();

    type GuardMarker = <parking_lot::RawRwLock as lock_api::RawRwLock>::GuardMarker;

    fn lock_shared(&self) {
        self.read_lock();
    }

    fn try_lock_shared(&self) -> bool {
        self.try_read_lock()
    }

    unsafe fn unlock_shared(&self) {
        // SAFETY: same contract as `RawRwLock::unlock_shared`.
        unsafe { self.read_unlock() }
    }

    fn lock_exclusive(&self) {
        self.write_lock();
    }

    fn try_lock_exclusive(&self) -> bool {
        self.try_write_lock()
    }

    unsafe fn unlock_exclusive(&self) {
        // SAFETY: same contract as `RawRwLock::unlock_exclusive`.
        unsafe { self.write_unlock() }
    }

    fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    fn is_locked_exclusive(&self) -> bool {
        self.raw.is_locked_exclusive()
    }
}

/// A lock that can be taken and released without a guard.
pub trait Locker {
    fn lock(&self);

    /// # Safety
    ///
    /// The caller must currently hold the lock taken through [`Locker::lock`].
    unsafe fn unlock(&self);
}

/// Exclusive mode, with emissions.
impl Locker for LoggingRwLock {
    fn lock(&self) {
        self.write_lock();
    }

    unsafe fn unlock(&self) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.write_unlock() }
    }
}

/// Shared-mode handle returned by [`LoggingRwLock::read_locker`].
#[derive(Clone, Copy)]
pub struct ReadLocker<'a> {
    raw: &'a parking_lot::RawRwLock,
}

impl fmt::Debug for ReadLocker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadLocker").finish_non_exhaustive()
    }
}

impl Locker for ReadLocker<'_> {
    fn lock(&self) {
        self.raw.lock_shared();
    }

    unsafe fn unlock(&self) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.raw.unlock_shared() }
    }
}

pub type RwLock<T> = lock_api::RwLock<LoggingRwLock, T>;
pub type RwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, LoggingRwLock, T>;
pub type RwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, LoggingRwLock, T>;

/// Guarded lock around `value` whose emissions carry `label`.
pub fn rwlock<T>(label: impl Into<String>, value: T) -> RwLock<T> {
    rwlock_with(LoggingRwLock::named(label), value)
}

/// Guarded lock around `value` using a preconfigured raw lock.
pub fn rwlock_with<T>(raw: LoggingRwLock, value: T) -> RwLock<T> {
    lock_api::RwLock::from_raw(raw, value)
}
