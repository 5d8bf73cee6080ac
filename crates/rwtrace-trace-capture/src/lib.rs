//! Call-stack capture for lock diagnostics.
//!
//! Walks the current thread's stack with the `backtrace` crate, resolves each
//! frame to its symbols, and renders the result as the same line-oriented text
//! the standard library prints for a panic backtrace. The first rendered line
//! is always a thread header so callers can annotate it.

use std::error::Error;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread::ThreadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub max_frames: NonZeroUsize,
    pub skip_frames: usize,
}

impl CaptureOptions {
    /// Walks the whole stack and keeps every frame.
    pub const DEFAULT: Self = Self {
        max_frames: NonZeroUsize::MAX,
        skip_frames: 0,
    };

    pub fn max_frames(mut self, max_frames: NonZeroUsize) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn skip_frames(mut self, skip_frames: usize) -> Self {
        self.skip_frames = skip_frames;
        self
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug)]
pub enum CaptureError {
    EmptyBacktrace,
    AllFramesSkipped { skipped: usize },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyBacktrace => write!(f, "stack walk produced no frames"),
            Self::AllFramesSkipped { skipped } => {
                write!(f, "all {skipped} walked frames were skipped by capture options")
            }
        }
    }
}

impl Error for CaptureError {}

/// The thread a stack was captured on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadLabel {
    pub name: Option<String>,
    pub id: ThreadId,
}

impl ThreadLabel {
    pub fn current() -> Self {
        let thread = std::thread::current();
        Self {
            name: thread.name().map(str::to_owned),
            id: thread.id(),
        }
    }

    pub fn header(&self) -> String {
        format!(
            "thread '{}' ({:?}) stack backtrace:",
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.id
        )
    }
}

/// Header line for the calling thread, without walking the stack.
pub fn thread_header() -> String {
    ThreadLabel::current().header()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub name: Option<String>,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ResolvedSymbol {
    fn from_symbol(symbol: &backtrace::Symbol) -> Self {
        Self {
            // `{:#}` drops the trailing hash from demangled Rust names.
            name: symbol.name().map(|name| format!("{name:#}")),
            file: symbol.filename().map(|path| path.to_path_buf()),
            line: symbol.lineno(),
            column: symbol.colno(),
        }
    }

    fn location(&self) -> Option<String> {
        let file = self.file.as_ref()?;
        let mut location = file.display().to_string();
        if let Some(line) = self.line {
            location.push_str(&format!(":{line}"));
            if let Some(column) = self.column {
                location.push_str(&format!(":{column}"));
            }
        }
        Some(location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub ip: u64,
    /// More than one entry when the frame contains inlined calls.
    pub symbols: Vec<ResolvedSymbol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedStack {
    pub thread: ThreadLabel,
    pub frames: Vec<CapturedFrame>,
    pub truncated: bool,
}

impl CapturedStack {
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(1 + self.frames.len() * 2);
        lines.push(self.thread.header());

        for (index, frame) in self.frames.iter().enumerate() {
            if frame.symbols.is_empty() {
                lines.push(format!("{index:>4}: <unknown>"));
                continue;
            }
            for (position, symbol) in frame.symbols.iter().enumerate() {
                let name = symbol.name.as_deref().unwrap_or("<unknown>");
                if position == 0 {
                    lines.push(format!("{index:>4}: {name}"));
                } else {
                    lines.push(format!("      {name}"));
                }
                if let Some(location) = symbol.location() {
                    lines.push(format!("             at {location}"));
                }
            }
        }

        if self.truncated {
            lines.push("      ...".to_owned());
        }
        lines
    }
}

pub fn capture_current(options: CaptureOptions) -> Result<CapturedStack, CaptureError> {
    let mut raw_frames = Vec::new();
    let mut walked = 0usize;
    let mut truncated = false;

    backtrace::trace(|frame| {
        walked += 1;
        if walked <= options.skip_frames {
            return true;
        }
        if raw_frames.len() >= options.max_frames.get() {
            truncated = true;
            return false;
        }
        raw_frames.push(frame.clone());
        true
    });

    if raw_frames.is_empty() {
        if walked > 0 && walked <= options.skip_frames {
            return Err(CaptureError::AllFramesSkipped { skipped: walked });
        }
        return Err(CaptureError::EmptyBacktrace);
    }

    // Symbolication runs after the walk so the tracer callback stays minimal.
    let frames = raw_frames
        .iter()
        .map(|frame| {
            let mut symbols = Vec::new();
            backtrace::resolve_frame(frame, |symbol| {
                symbols.push(ResolvedSymbol::from_symbol(symbol));
            });
            CapturedFrame {
                ip: frame.ip() as usize as u64,
                symbols,
            }
        })
        .collect();

    Ok(CapturedStack {
        thread: ThreadLabel::current(),
        frames,
        truncated,
    })
}
