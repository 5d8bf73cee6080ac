use std::io::{self, Write};

use parking_lot::Mutex;

/// Destination for emission blocks.
///
/// Each call receives one complete, newline-terminated block and must write it
/// without interleaving it with other blocks. Writing is best effort: a sink
/// never reports failure back into the lock operation that produced the block.
pub trait Sink: Send + Sync {
    fn write_block(&self, block: &str);
}

/// Writes blocks to the process's standard error stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl Sink for StderrSink {
    fn write_block(&self, block: &str) {
        // Holding the stderr lock for the whole block keeps concurrent blocks contiguous.
        if let Err(error) = write_block_to(&mut io::stderr().lock(), block) {
            tracing::debug!(%error, "dropping lock trace block: stderr write failed");
        }
    }
}

/// Writes `block` with as many `write` calls as the writer needs, then flushes.
/// Callers serialise blocks by holding the writer's lock across this call.
fn write_block_to<W: Write>(out: &mut W, block: &str) -> io::Result<()> {
    out.write_all(block.as_bytes())?;
    out.flush()
}

/// Keeps every block in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    blocks: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> Vec<String> {
        self.blocks.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.blocks.lock())
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }
}

impl Sink for MemorySink {
    fn write_block(&self, block: &str) {
        self.blocks.lock().push(block.to_owned());
    }
}

/// Forwards blocks as `tracing` events on the `rwtrace` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn write_block(&self, block: &str) {
        tracing::info!(target: "rwtrace", "{}", block.trim_end_matches('\n'));
    }
}
