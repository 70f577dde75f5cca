//! Host-facing event callbacks.
//!
//! Memory/channel hooks are exposed as a small observer trait rather than
//! individually settable mutable slots: a `Processor` takes `&mut dyn
//! ProcessorObserver` rather than owning a host reference, so tests can
//! assert on a recording stub with no host at all.

/// Callbacks the processor invokes synchronously from inside [`crate::processor::Processor::cycle`].
///
/// Reentrancy from a callback back into `cycle()` is not supported.
pub trait ProcessorObserver {
    /// A memory-indirect operand could not be satisfied from the pending
    /// request; the processor now awaits a matching [`crate::processor::Processor::memory`] call.
    fn memory_read(&mut self, address: u32);

    /// A memory-reference writeback target received `value` at `address`.
    /// `address == 0xFFFFFFFF` is the reserved debug-output sink; hosts
    /// should display but not persist it.
    fn memory_write(&mut self, address: u32, value: &str);

    /// An output channel latch flushed at end-of-tick, after the sub-step
    /// loop. `index` is in `0..=3`.
    fn channel_write(&mut self, index: u8, value: &str);
}

/// A no-op observer, useful for headless `cycle()` calls in tests that
/// don't care about the callback stream.
#[derive(Debug, Default)]
pub struct NullObserver;

impl ProcessorObserver for NullObserver {
    fn memory_read(&mut self, _address: u32) {}
    fn memory_write(&mut self, _address: u32, _value: &str) {}
    fn channel_write(&mut self, _index: u8, _value: &str) {}
}

/// A recording observer for tests: captures every callback it's handed, in
/// delivery order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub memory_reads: Vec<u32>,
    pub memory_writes: Vec<(u32, String)>,
    pub channel_writes: Vec<(u8, String)>,
}

impl ProcessorObserver for RecordingObserver {
    fn memory_read(&mut self, address: u32) {
        self.memory_reads.push(address);
    }

    fn memory_write(&mut self, address: u32, value: &str) {
        self.memory_writes.push((address, value.to_string()));
    }

    fn channel_write(&mut self, index: u8, value: &str) {
        self.channel_writes.push((index, value.to_string()));
    }
}
