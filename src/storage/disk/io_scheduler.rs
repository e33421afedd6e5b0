use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::trace;

use crate::common::{Result, StoreError};

use super::PersistedStream;

type Reply<T> = Sender<Result<T>>;

/// A stream I/O request. Buffers are owned so the request can cross
/// the thread boundary safely.
enum IoRequest {
    Read {
        position: u64,
        len: usize,
        reply: Reply<Vec<u8>>,
    },
    Write {
        position: u64,
        data: Vec<u8>,
        reply: Reply<()>,
    },
    Sync {
        reply: Reply<()>,
    },
}

/// IoScheduler serializes all stream I/O onto a background worker thread.
/// Callers block on a reply channel until their request completes.
pub struct IoScheduler {
    /// Channel sender for queuing requests
    request_sender: Option<Sender<IoRequest>>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl IoScheduler {
    /// Spawns the worker thread for `stream`.
    pub fn new(stream: Arc<dyn PersistedStream>) -> Result<Self> {
        let (sender, receiver) = bounded::<IoRequest>(128);
        let worker_handle = thread::Builder::new()
            .name("pagestore-io".to_string())
            .spawn(move || Self::run_worker(stream, receiver))?;

        Ok(Self {
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        })
    }

    pub fn read(&self, position: u64, len: usize) -> Result<Vec<u8>> {
        self.submit(|reply| IoRequest::Read {
            position,
            len,
            reply,
        })
    }

    pub fn write(&self, position: u64, data: Vec<u8>) -> Result<()> {
        self.submit(|reply| IoRequest::Write {
            position,
            data,
            reply,
        })
    }

    pub fn sync(&self) -> Result<()> {
        self.submit(|reply| IoRequest::Sync { reply })
    }

    fn submit<T>(&self, build: impl FnOnce(Reply<T>) -> IoRequest) -> Result<T> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| StoreError::IoScheduler("scheduler is shut down".to_string()))?;
        let (tx, rx) = bounded(1);
        sender
            .send(build(tx))
            .map_err(|e| StoreError::IoScheduler(format!("failed to schedule request: {}", e)))?;
        rx.recv().map_err(|e| {
            StoreError::IoScheduler(format!("failed to receive completion: {}", e))
        })?
    }

    /// Processes requests until every sender is dropped.
    fn run_worker(stream: Arc<dyn PersistedStream>, receiver: Receiver<IoRequest>) {
        for request in receiver.iter() {
            // a dropped reply receiver only means the caller gave up waiting
            match request {
                IoRequest::Read {
                    position,
                    len,
                    reply,
                } => {
                    trace!(position, len, "stream read");
                    let _ = reply.send(stream.seek_and_read(position, len));
                }
                IoRequest::Write {
                    position,
                    data,
                    reply,
                } => {
                    trace!(position, len = data.len(), "stream write");
                    let _ = reply.send(Self::write_at(stream.as_ref(), position, &data));
                }
                IoRequest::Sync { reply } => {
                    let _ = reply.send(stream.sync());
                }
            }
        }
    }

    fn write_at(stream: &dyn PersistedStream, position: u64, data: &[u8]) -> Result<()> {
        let end = position + data.len() as u64;
        if stream.size()? < end {
            stream.grow(end)?;
        }
        stream.seek_and_write(position, data)
    }
}

impl Drop for IoScheduler {
    fn drop(&mut self) {
        self.request_sender.take();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
