//! Single-writer transaction dispatch.
//!
//! All mutating work for one database is serialized onto a dedicated writer
//! thread that owns the [`DatabaseConnection`]. Units of work are enqueued
//! onto a mailbox and executed in FIFO submission order; the thread is
//! spawned lazily on the first enqueue and joined when the owning database
//! is dropped, after draining everything still queued.

use crate::connection::DatabaseConnection;
use crate::database::AdapterRegistry;
use crate::error::{Error, Result};
use crate::notifier::ModelNotifier;
use crate::observer::ChangeBuffer;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use tracing::{debug, error};

/// Everything the writer thread owns: the connection, the adapter registry,
/// the change buffer of the in-flight transaction and the notifier used to
/// flush it.
pub(crate) struct WriterState {
    pub(crate) connection: DatabaseConnection,
    pub(crate) adapters: Arc<AdapterRegistry>,
    pub(crate) notifier: Arc<dyn ModelNotifier>,
    pub(crate) buffer: ChangeBuffer,
    /// Cancellation flag of the currently running transaction, if any.
    pub(crate) cancel_flag: Option<Arc<AtomicBool>>,
}

pub(crate) type Job = Box<dyn FnOnce(&mut WriterState) + Send>;

enum DispatcherState {
    /// Writer thread not spawned yet; the connection is parked here until
    /// first use.
    Cold(Option<Box<WriterState>>),
    Running(Worker),
    ShutDown,
}

struct Worker {
    sender: flume::Sender<Job>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl Worker {
    fn spawn(writer: WriterState) -> Result<Self> {
        let (sender, receiver) = flume::unbounded::<Job>();
        let thread = std::thread::Builder::new()
            .name("modelflow-writer".into())
            .spawn(move || {
                Worker::run(writer, &receiver);
            })
            .map_err(Error::Thread)?;
        let thread_id = thread.thread().id();
        Ok(Self {
            sender,
            thread: Some(thread),
            thread_id,
        })
    }

    fn run(mut writer: WriterState, receiver: &flume::Receiver<Job>) {
        debug!("writer thread started");
        // The channel keeps yielding queued jobs after the sender is
        // dropped, so shutdown drains the backlog before the loop ends.
        while let Ok(job) = receiver.recv() {
            job(&mut writer);
        }
        debug!("writer thread stopped");
    }
}

/// Serializes all write transactions of one database onto a single thread.
pub(crate) struct Dispatcher {
    state: Mutex<DispatcherState>,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub(crate) fn new(writer: WriterState) -> Self {
        Self {
            state: Mutex::new(DispatcherState::Cold(Some(Box::new(writer)))),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueue `job`. Jobs run in FIFO enqueue order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DispatcherShutdown`] once the dispatcher has been
    /// torn down, or [`Error::Thread`] if the writer thread could not be
    /// spawned.
    pub(crate) fn execute(&self, job: Job) -> Result<()> {
        let mut state = self.state.lock();
        if let DispatcherState::Cold(writer) = &mut *state {
            let writer = writer.take().expect("writer state present while cold");
            match Worker::spawn(*writer) {
                Ok(worker) => *state = DispatcherState::Running(worker),
                Err(err) => {
                    // The connection went down with the failed spawn; later
                    // calls must see a clean shutdown, not a poisoned state.
                    *state = DispatcherState::ShutDown;
                    return Err(err);
                }
            }
        }
        match &*state {
            DispatcherState::Running(worker) => {
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                let in_flight = Arc::clone(&self.in_flight);
                let job: Job = Box::new(move |writer| {
                    job(writer);
                    in_flight.fetch_sub(1, Ordering::AcqRel);
                });
                worker
                    .sender
                    .send(job)
                    .map_err(|_| Error::DispatcherShutdown)
            }
            _ => Err(Error::DispatcherShutdown),
        }
    }

    /// Whether the calling thread is the writer thread. Blocking on a
    /// freshly enqueued transaction from there would deadlock the mailbox.
    pub(crate) fn is_writer_thread(&self) -> bool {
        match &*self.state.lock() {
            DispatcherState::Running(worker) => worker.thread_id == std::thread::current().id(),
            _ => false,
        }
    }

    /// Number of enqueued or running transactions.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        let state = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, DispatcherState::ShutDown)
        };
        if let DispatcherState::Running(worker) = state {
            let pending = self.in_flight();
            if pending > 0 {
                debug!(pending, "waiting for queued transactions before shutdown");
            }
            let Worker { sender, thread, .. } = worker;
            drop(sender);
            if let Some(thread) = thread {
                if thread.join().is_err() {
                    error!("writer thread panicked");
                }
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::notifier::DirectNotifier;
    use crate::observer::ObserverRegistry;
    use std::sync::Mutex as StdMutex;

    fn test_dispatcher() -> Dispatcher {
        let writer = WriterState {
            connection: DatabaseConnection::open_in_memory().unwrap(),
            adapters: Arc::new(AdapterRegistry::new()),
            notifier: Arc::new(DirectNotifier::new(Arc::new(ObserverRegistry::new()))),
            buffer: ChangeBuffer::new(),
            cancel_flag: None,
        };
        Dispatcher::new(writer)
    }

    #[test]
    fn jobs_run_in_fifo_order() {
        let dispatcher = test_dispatcher();
        let order = Arc::new(StdMutex::new(Vec::new()));

        for i in 0..10 {
            let order = Arc::clone(&order);
            dispatcher
                .execute(Box::new(move |_| order.lock().unwrap().push(i)))
                .unwrap();
        }

        let (sender, receiver) = std::sync::mpsc::channel();
        dispatcher
            .execute(Box::new(move |_| sender.send(()).unwrap()))
            .unwrap();
        receiver.recv().unwrap();

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn shutdown_drains_queued_jobs() {
        let dispatcher = test_dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            dispatcher
                .execute(Box::new(move |_| {
                    counter.fetch_add(1, Ordering::AcqRel);
                }))
                .unwrap();
        }
        drop(dispatcher);
        assert_eq!(counter.load(Ordering::Acquire), 5);
    }

    #[test]
    fn cold_dispatcher_shut_down_rejects_work_without_panicking() {
        // Cold -> ShutDown without ever spawning, the same terminal state
        // execute() enters when the writer thread fails to spawn. Repeated
        // calls must keep returning the shutdown error.
        let dispatcher = test_dispatcher();
        dispatcher.shutdown();
        for _ in 0..2 {
            let result = dispatcher.execute(Box::new(|_| {}));
            assert!(matches!(result, Err(Error::DispatcherShutdown)));
        }
    }

    #[test]
    fn execute_after_shutdown_is_rejected() {
        let dispatcher = test_dispatcher();
        dispatcher.execute(Box::new(|_| {})).unwrap();
        dispatcher.shutdown();
        let result = dispatcher.execute(Box::new(|_| {}));
        assert!(matches!(result, Err(Error::DispatcherShutdown)));
    }

    #[test]
    fn writer_thread_identity() {
        let dispatcher = Arc::new(test_dispatcher());
        assert!(!dispatcher.is_writer_thread());
    }
}
