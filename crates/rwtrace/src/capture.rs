use rwtrace_trace_capture::{CaptureOptions, capture_current, thread_header};

/// Source of the stack lines attached to each emission.
///
/// The first returned line is the one that gets annotated with the action.
pub trait StackCapture: Send + Sync {
    fn capture_lines(&self) -> Vec<String>;
}

/// Walks the real stack of the calling thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeCapture {
    options: CaptureOptions,
}

impl NativeCapture {
    pub const DEFAULT: Self = Self {
        options: CaptureOptions::DEFAULT,
    };

    pub fn new(options: CaptureOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> CaptureOptions {
        self.options
    }
}

impl StackCapture for NativeCapture {
    fn capture_lines(&self) -> Vec<String> {
        match capture_current(self.options) {
            Ok(stack) => stack.render_lines(),
            Err(error) => {
                tracing::debug!(%error, "stack capture failed; emitting header only");
                vec![thread_header(), format!("   <backtrace unavailable: {error}>")]
            }
        }
    }
}

/// Returns the same lines on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedCapture {
    lines: Vec<String>,
}

impl FixedCapture {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl StackCapture for FixedCapture {
    fn capture_lines(&self) -> Vec<String> {
        self.lines.clone()
    }
}
