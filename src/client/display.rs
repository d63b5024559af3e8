//! Refresh requests for whichever thread owns the display.
//!
//! The client loops never render. They post a request into a single-consumer
//! queue and the rendering side drains it at its own pace. At most one request
//! is pending; posting while one is queued folds into it, since a redraw
//! always reads the latest mirror.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// Redraw from the mirror; `generation` is the mirror's generation when posted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshRequest {
    pub generation: u64,
}

#[derive(Clone, Debug)]
pub struct DisplayQueue {
    sender: SyncSender<RefreshRequest>,
}

impl DisplayQueue {
    pub fn channel() -> (Self, Receiver<RefreshRequest>) {
        let (sender, receiver) = mpsc::sync_channel(1);
        (DisplayQueue { sender }, receiver)
    }

    /// Never blocks. Returns false once the receiving side has gone away.
    pub fn post(&self, generation: u64) -> bool {
        match self.sender.try_send(RefreshRequest { generation }) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
