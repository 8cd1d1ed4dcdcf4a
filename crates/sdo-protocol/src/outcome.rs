// Path: crates/sdo-protocol/src/outcome.rs
//! The driver's per-call result (§4.4).

/// What happened during one call to [`crate::ProtocolDriver::process`].
///
/// Each call dispatches exactly one handler. `Progressed` means the state
/// advanced and the caller should call `process` again immediately, with
/// no transport round trip in between; the caller-facing loop is
/// [`crate::ProtocolDriver::run_until_yield`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The handler advanced the state machine; no I/O is required before
    /// calling `process` again.
    Progressed,
    /// The handler needed more input than the serializer currently has
    /// buffered. State is unchanged; the caller should pump the
    /// transport and call `process` again.
    Suspended,
    /// The run reached `DONE`. The context's owned buffers have been
    /// released.
    Completed,
    /// The run reached `ERROR`. An error block has been emitted and the
    /// context's owned buffers have been released.
    Failed,
}

impl ProcessOutcome {
    /// True for the two states the driver will not progress from without
    /// a fresh context.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}
