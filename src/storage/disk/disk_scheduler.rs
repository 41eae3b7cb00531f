use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::common::{PageId, Result, SiltError, PAGE_SIZE};

use super::DiskManager;

/// Owned page-sized I/O buffer handed through the scheduler queue.
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A queued page transfer. The buffer travels with the request and comes
/// back through the completion channel, so nothing outlives its owner.
enum DiskRequest {
    Read {
        page_id: PageId,
        done: mpsc::Sender<(PageBuf, Result<()>)>,
    },
    Write {
        page_id: PageId,
        data: PageBuf,
        done: mpsc::Sender<Result<()>>,
    },
}

/// DiskScheduler funnels page I/O through a background worker thread fed by
/// a bounded request queue. Callers block on a per-request completion
/// channel, so the interface stays synchronous while the file is touched
/// from a single thread.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_tx: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a scheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (request_tx, request_rx) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm = Arc::clone(&disk_manager);
        let stop = Arc::clone(&shutdown);
        let worker = thread::spawn(move || Self::run_worker(dm, request_rx, stop));

        Self {
            disk_manager,
            request_tx,
            shutdown,
            worker: Some(worker),
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Reads one logical page through the worker, blocking until the
    /// transfer completes.
    pub fn schedule_read(&self, page_id: PageId) -> Result<PageBuf> {
        let (done, completion) = mpsc::channel();
        self.request_tx
            .send(DiskRequest::Read { page_id, done })
            .map_err(|e| SiltError::DiskScheduler(format!("failed to queue read: {}", e)))?;

        let (buf, result) = completion
            .recv()
            .map_err(|e| SiltError::DiskScheduler(format!("read completion lost: {}", e)))?;
        result?;
        Ok(buf)
    }

    /// Writes one logical page through the worker, blocking until the
    /// transfer completes.
    pub fn schedule_write(&self, page_id: PageId, data: PageBuf) -> Result<()> {
        let (done, completion) = mpsc::channel();
        self.request_tx
            .send(DiskRequest::Write {
                page_id,
                data,
                done,
            })
            .map_err(|e| SiltError::DiskScheduler(format!("failed to queue write: {}", e)))?;

        completion
            .recv()
            .map_err(|e| SiltError::DiskScheduler(format!("write completion lost: {}", e)))?
    }

    fn run_worker(
        disk_manager: Arc<DiskManager>,
        request_rx: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain remaining requests before exiting.
                while let Ok(request) = request_rx.try_recv() {
                    Self::process(&disk_manager, request);
                }
                break;
            }

            match request_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, done } => {
                let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
                let result = disk_manager.read_page(page_id, &mut buf[..]);
                let _ = done.send((buf, result));
            }
            DiskRequest::Write {
                page_id,
                data,
                done,
            } => {
                let result = disk_manager.write_page(page_id, &data[..]);
                let _ = done.send(result);
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
