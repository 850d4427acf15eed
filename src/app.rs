use std::sync::Arc;

use crate::forward::Forwarder;
use crate::logbook::LogBook;
use crate::supervisor::Supervisor;

/// Shared state of the webhook listener.
#[derive(Clone)]
pub struct ReceiverState {
    pub logs: LogBook,
    pub forwarder: Arc<Forwarder>,
}

/// Shared state of the control API.
#[derive(Clone)]
pub struct ControlState {
    pub supervisor: Arc<Supervisor>,
    pub logs: LogBook,
    pub tail_lines: usize,
}
