use rwtrace_trace_capture::CaptureOptions;

/// Tuning for a [`LoggingRwLock`](crate::LoggingRwLock), applied with
/// [`with_options`](crate::LoggingRwLock::with_options).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceOptions {
    /// How much of the stack each emission walks.
    pub capture: CaptureOptions,
    /// Also emit `obtained ...` / `released ...` after the delegated call returns.
    pub confirm_transitions: bool,
}

impl TraceOptions {
    pub fn capture(mut self, capture: CaptureOptions) -> Self {
        self.capture = capture;
        self
    }

    pub fn confirm_transitions(mut self, confirm: bool) -> Self {
        self.confirm_transitions = confirm;
        self
    }
}
