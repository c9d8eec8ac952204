use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

/// Chunk size the sender aims for. Transport-level ordering is the only
/// sequencing guarantee, so chunks carry no sequence numbers.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// How long a sender waits for an `accept` before abandoning the transfer.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-transfer knobs for the sending side.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub accept_timeout: Duration,
    pub chunk_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            accept_timeout: ACCEPT_TIMEOUT,
            chunk_size: CHUNK_SIZE,
        }
    }
}

/// How an outbound transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted and fully streamed.
    Delivered,
    /// No matching `accept` arrived within the wait; nothing was streamed and
    /// the receiver is not told.
    NotAccepted,
}

struct Waiter {
    expect_from: Option<String>,
    notify: oneshot::Sender<()>,
}

/// Sender-side bookkeeping: transfers still waiting for their first `accept`.
#[derive(Default)]
pub(crate) struct AcceptWaiters {
    waiters: HashMap<String, Waiter>,
}

impl AcceptWaiters {
    pub(crate) fn register(
        &mut self,
        transfer_id: String,
        expect_from: Option<String>,
        notify: oneshot::Sender<()>,
    ) {
        self.waiters.insert(transfer_id, Waiter { expect_from, notify });
    }

    pub(crate) fn abandon(&mut self, transfer_id: &str) {
        self.waiters.remove(transfer_id);
    }

    /// Resolves the wait on the first matching accept. An addressed transfer
    /// only matches accepts from its target; duplicates and strays are idle
    /// no-ops.
    pub(crate) fn accept(&mut self, transfer_id: &str, from: &str) -> bool {
        let matches = self
            .waiters
            .get(transfer_id)
            .map(|w| w.expect_from.as_deref().map_or(true, |expected| expected == from))
            .unwrap_or(false);
        if matches {
            if let Some(waiter) = self.waiters.remove(transfer_id) {
                let _ = waiter.notify.send(());
            }
        }
        matches
    }
}

/// Receiver-side state for one in-flight transfer.
#[derive(Debug)]
pub struct InboundTransfer {
    pub from: String,
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub received: u64,
    pub accepted: bool,
    chunks: Vec<Vec<u8>>,
}

impl InboundTransfer {
    pub fn new(from: String, name: String, mime: String, size: u64) -> Self {
        Self {
            from,
            name,
            mime,
            size,
            received: 0,
            accepted: false,
            chunks: Vec::new(),
        }
    }

    pub fn push_chunk(&mut self, data: Vec<u8>) {
        self.received += data.len() as u64;
        self.chunks.push(data);
    }

    /// The progress indicator reaches 100% exactly when every declared byte
    /// arrived.
    pub fn is_complete(&self) -> bool {
        self.received == self.size
    }

    /// Concatenates chunks in arrival order into the final artifact.
    pub fn assemble(self) -> Bytes {
        let mut out = Vec::with_capacity(self.received as usize);
        for chunk in self.chunks {
            out.extend_from_slice(&chunk);
        }
        Bytes::from(out)
    }
}
