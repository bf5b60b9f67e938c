use std::fmt;

/// A fatal condition that terminates the simulation: either the guest kernel
/// violated an invariant (`Trap`) or a host syscall failed (`System`).
///
/// Guest-visible outcomes always flow through
/// [`crate::device_class::DevResult`] by value; a `SimError` only ever
/// surfaces from [`crate::dispatcher::Dispatcher::tick`] or from the
/// façade's own kernel-mode/illegal-class guards in
/// [`crate::facade`] — both are "the guest has a bug" or "the simulator is
/// broken" terminations, never a recoverable result code.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("{0}")]
    Trap(String),
    #[error("host I/O error: {0}")]
    System(#[from] std::io::Error),
}

impl SimError {
    pub fn trap(msg: impl fmt::Display) -> Self {
        SimError::Trap(msg.to_string())
    }
}

pub type SimResult<T> = Result<T, SimError>;
