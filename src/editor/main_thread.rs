//! UI-thread marshalling.
//!
//! Editor handlers must run on the editor's single UI thread. I/O tasks
//! submit closures here; the editor's per-frame tick calls [`pump`] on the
//! UI thread to drain them. Each submission carries a one-shot completion
//! cell the submitter awaits with a deadline; a completion arriving after
//! the submitter gave up is swallowed.
//!
//! [`pump`]: MainThreadQueue::pump

use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() + Send>;

/// Many-submitter, single-consumer job queue drained on the frame tick.
pub struct MainThreadQueue {
    tx: mpsc::UnboundedSender<Job>,
    rx: Mutex<mpsc::UnboundedReceiver<Job>>,
}

impl Default for MainThreadQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MainThreadQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Enqueue `f` for the UI thread and return the completion cell.
    ///
    /// If the submitter stops waiting (deadline), the send into the cell
    /// fails silently inside the job; the result is discarded.
    pub fn submit<F, T>(&self, f: F) -> oneshot::Receiver<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = done_tx.send(f());
        });
        // A closed queue leaves the receiver to resolve with RecvError,
        // which submitters surface as a dispatch failure.
        let _ = self.tx.send(job);
        done_rx
    }

    /// Run every queued job. Call once per frame from the UI thread.
    /// Returns the number of jobs executed.
    pub fn pump(&self) -> usize {
        // Jobs submitted while pumping run this same frame; try_recv stops
        // when the queue is momentarily empty.
        let mut drained = 0;
        let mut rx = self.rx.lock().unwrap();
        while let Ok(job) = rx.try_recv() {
            job();
            drained += 1;
        }
        drained
    }
}
