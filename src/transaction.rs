//! Cancellable, callback-driven units of work.
//!
//! A transaction wraps a closure over a [`TransactionContext`] and is
//! submitted to the database's dispatcher. The closure runs inside
//! BEGIN/COMMIT on the writer thread; errors roll the transaction back and
//! surface through the error callback, success flushes the accumulated
//! change notifications before the next queued transaction starts.
//!
//! Cancellation is cooperative. A transaction cancelled before it is picked
//! up never runs at all; a running one has to observe
//! [`TransactionContext::is_cancelled`] itself, SQL already issued is not
//! unwound beyond the enclosing rollback.

use crate::adapter::{RegisteredAdapter, SaveResult};
use crate::database::Database;
use crate::dispatcher::{Job, WriterState};
use crate::error::{Error, Result};
use crate::observer::{ChangeAction, ModelNotification};
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Enqueued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TransactionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Succeeded | TransactionState::Failed | TransactionState::Cancelled
        )
    }
}

struct TransactionShared {
    state: Mutex<TransactionState>,
    cancelled: Arc<AtomicBool>,
}

impl TransactionShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(TransactionState::Created),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }
}

/// Handle to an enqueued transaction.
pub struct TransactionHandle {
    shared: Arc<TransactionShared>,
}

impl TransactionHandle {
    /// Request cancellation. A transaction that has not started yet will
    /// not run at all; a running one keeps running until it observes
    /// [`TransactionContext::is_cancelled`].
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        *self.shared.state.lock()
    }
}

/// Where completion callbacks run.
///
/// The default runs them inline on the writer thread as part of transaction
/// finalization, which preserves the guarantee that a transaction's
/// callbacks fire before the next queued transaction starts. A custom
/// executor (a UI thread, a pool) trades that ordering for not occupying
/// the writer.
#[derive(Clone, Default)]
pub enum CallbackExecutor {
    #[default]
    Inline,
    Custom(Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>),
}

impl CallbackExecutor {
    fn run(&self, f: impl FnOnce() + Send + 'static) {
        match self {
            CallbackExecutor::Inline => f(),
            CallbackExecutor::Custom(executor) => executor(Box::new(f)),
        }
    }
}

impl std::fmt::Debug for CallbackExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackExecutor::Inline => f.write_str("Inline"),
            CallbackExecutor::Custom(_) => f.write_str("Custom"),
        }
    }
}

type UnitOfWork<R> = Box<dyn FnOnce(&mut TransactionContext<'_>) -> Result<R> + Send>;

/// Builder tying a unit of work to the dispatcher.
pub struct TransactionBuilder<'db, R> {
    database: &'db Database,
    work: UnitOfWork<R>,
    on_success: Option<Box<dyn FnOnce(&R) + Send>>,
    on_error: Option<Box<dyn FnOnce(&Error) + Send>>,
    on_completion: Option<Box<dyn FnOnce(TransactionState) + Send>>,
    executor: CallbackExecutor,
}

impl<'db, R: Send + 'static> TransactionBuilder<'db, R> {
    pub(crate) fn new(
        database: &'db Database,
        work: impl FnOnce(&mut TransactionContext<'_>) -> Result<R> + Send + 'static,
        executor: CallbackExecutor,
    ) -> Self {
        Self {
            database,
            work: Box::new(work),
            on_success: None,
            on_error: None,
            on_completion: None,
            executor,
        }
    }

    /// Invoked with the unit of work's result after a successful commit.
    #[must_use]
    pub fn on_success(mut self, f: impl FnOnce(&R) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Invoked when the unit of work or the commit failed. Without an error
    /// callback (and without a blocking caller) failures are only logged.
    #[must_use]
    pub fn on_error(mut self, f: impl FnOnce(&Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Invoked once with the terminal state, for success, failure and
    /// cancellation alike.
    #[must_use]
    pub fn on_completion(mut self, f: impl FnOnce(TransactionState) + Send + 'static) -> Self {
        self.on_completion = Some(Box::new(f));
        self
    }

    /// Override the database's default callback executor.
    #[must_use]
    pub fn callback_executor(mut self, executor: CallbackExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Enqueue onto the dispatcher and return a cancellation handle.
    ///
    /// # Errors
    ///
    /// Returns error if the dispatcher has shut down.
    pub fn enqueue(self) -> Result<TransactionHandle> {
        let shared = Arc::new(TransactionShared::new());
        let job = make_job(
            self.work,
            self.on_success,
            self.on_error,
            self.on_completion,
            Arc::clone(&shared),
            self.executor,
            None,
        );
        shared.set_state(TransactionState::Enqueued);
        self.database.dispatcher().execute(job)?;
        Ok(TransactionHandle { shared })
    }

    /// Enqueue and block until the transaction reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the unit of work's error on failure,
    /// [`Error::ReentrantBlocking`] when called from the writer thread
    /// (nested work belongs on the [`TransactionContext`] instead), or
    /// [`Error::DispatcherShutdown`] if the dispatcher went away.
    pub fn execute_blocking(self) -> Result<R> {
        if self.database.dispatcher().is_writer_thread() {
            return Err(Error::ReentrantBlocking);
        }
        let (reply, receiver) = oneshot::channel();
        let shared = Arc::new(TransactionShared::new());
        let job = make_job(
            self.work,
            self.on_success,
            self.on_error,
            self.on_completion,
            Arc::clone(&shared),
            self.executor,
            Some(reply),
        );
        shared.set_state(TransactionState::Enqueued);
        self.database.dispatcher().execute(job)?;
        receiver.recv().map_err(|_| Error::DispatcherShutdown)?
    }
}

#[allow(clippy::too_many_lines)]
fn make_job<R: Send + 'static>(
    work: UnitOfWork<R>,
    on_success: Option<Box<dyn FnOnce(&R) + Send>>,
    on_error: Option<Box<dyn FnOnce(&Error) + Send>>,
    on_completion: Option<Box<dyn FnOnce(TransactionState) + Send>>,
    shared: Arc<TransactionShared>,
    executor: CallbackExecutor,
    reply: Option<oneshot::Sender<Result<R>>>,
) -> Job {
    Box::new(move |writer: &mut WriterState| {
        if shared.cancelled.load(Ordering::Acquire) {
            debug!("transaction cancelled before start");
            shared.set_state(TransactionState::Cancelled);
            executor.run(move || {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(Error::Cancelled));
                }
                if let Some(done) = on_completion {
                    done(TransactionState::Cancelled);
                }
            });
            return;
        }

        shared.set_state(TransactionState::Running);
        writer.cancel_flag = Some(Arc::clone(&shared.cancelled));
        let result = run_unit(writer, work);
        writer.cancel_flag = None;

        match result {
            Ok(value) => {
                shared.set_state(TransactionState::Succeeded);
                executor.run(move || {
                    if let Some(success) = on_success {
                        success(&value);
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(Ok(value));
                    }
                    if let Some(done) = on_completion {
                        done(TransactionState::Succeeded);
                    }
                });
            }
            Err(err) => {
                let state = err.terminal_state();
                shared.set_state(state);
                let unhandled = on_error.is_none() && reply.is_none();
                if state == TransactionState::Failed && unhandled {
                    error!("unhandled transaction error: {err}");
                }
                executor.run(move || {
                    if state == TransactionState::Failed {
                        if let Some(on_error) = on_error {
                            on_error(&err);
                        }
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(Err(err));
                    }
                    if let Some(done) = on_completion {
                        done(state);
                    }
                });
            }
        }
    })
}

/// Run `work` inside BEGIN/COMMIT and flush or discard the change buffer.
///
/// The flush runs here, on the writer thread, strictly after the commit and
/// before the dispatcher picks up the next queued transaction. That keeps
/// notifications ordered with respect to later transactions reading the
/// same tables.
fn run_unit<R>(writer: &mut WriterState, work: UnitOfWork<R>) -> Result<R> {
    writer.connection.begin()?;
    writer.buffer.begin();

    let result = {
        let mut ctx = TransactionContext { writer };
        work(&mut ctx)
    };

    match result {
        Ok(value) => {
            if let Err(err) = writer.connection.commit() {
                let _ = writer.connection.rollback();
                writer.buffer.discard();
                return Err(err);
            }
            let WriterState {
                ref mut buffer,
                ref adapters,
                ref notifier,
                ..
            } = *writer;
            buffer.flush(|id| adapters.table_name(id), |n| notifier.notify(n));
            Ok(value)
        }
        Err(err) => {
            let _ = writer.connection.rollback();
            writer.buffer.discard();
            Err(err)
        }
    }
}

/// Database-connection-scoped receiver a unit of work runs against.
///
/// Every mutating adapter call made through the context registers the
/// touched table with the transaction's change buffer; notifications are
/// emitted only if the transaction commits.
pub struct TransactionContext<'a> {
    writer: &'a mut WriterState,
}

impl TransactionContext<'_> {
    /// Insert `model`, returning the generated row id and backfilling the
    /// autoincrement field.
    ///
    /// # Errors
    ///
    /// Constraint violations and missing adapters surface as errors.
    pub fn insert<M: Clone + Send + Sync + 'static>(&mut self, model: &mut M) -> Result<i64> {
        let adapter = self.writer.adapters.get::<M>()?;
        let rowid = adapter.insert(model, &self.writer.connection)?;
        self.record(&adapter, ChangeAction::Insert, model);
        Ok(rowid)
    }

    /// Update the row identified by the primary key of `model`. Zero
    /// affected rows is not an error and emits no notification.
    ///
    /// # Errors
    ///
    /// Returns error if the statement failed or no adapter is registered.
    pub fn update<M: Clone + Send + Sync + 'static>(&mut self, model: &M) -> Result<usize> {
        let adapter = self.writer.adapters.get::<M>()?;
        let rows = adapter.update(model, &self.writer.connection)?;
        if rows > 0 {
            self.record(&adapter, ChangeAction::Update, model);
        }
        Ok(rows)
    }

    /// Delete the row identified by the primary key of `model`.
    ///
    /// # Errors
    ///
    /// Returns error if the statement failed or no adapter is registered.
    pub fn delete<M: Clone + Send + Sync + 'static>(&mut self, model: &M) -> Result<usize> {
        let adapter = self.writer.adapters.get::<M>()?;
        let rows = adapter.delete(model, &self.writer.connection)?;
        if rows > 0 {
            self.record(&adapter, ChangeAction::Delete, model);
        }
        Ok(rows)
    }

    /// Update, falling back to insert when no row matched.
    ///
    /// # Errors
    ///
    /// Returns error if either statement failed or no adapter is
    /// registered.
    pub fn save<M: Clone + Send + Sync + 'static>(&mut self, model: &mut M) -> Result<SaveResult> {
        let adapter = self.writer.adapters.get::<M>()?;
        let result = adapter.save(model, &self.writer.connection)?;
        let action = match result {
            SaveResult::Inserted(_) => ChangeAction::Insert,
            SaveResult::Updated => ChangeAction::Update,
        };
        self.record(&adapter, action, model);
        Ok(result)
    }

    /// Whether a row with the primary key of `model` exists.
    ///
    /// # Errors
    ///
    /// Returns error if the query failed or no adapter is registered.
    pub fn exists<M: Clone + Send + Sync + 'static>(&self, model: &M) -> Result<bool> {
        let adapter = self.writer.adapters.get::<M>()?;
        adapter.exists(model, &self.writer.connection)
    }

    /// Load one model by primary key, consulting the table's cache first.
    ///
    /// # Errors
    ///
    /// Returns error if the key shape does not match the table or the query
    /// failed.
    pub fn load_by_key<M: Clone + Send + Sync + 'static>(
        &self,
        key: &[Value],
    ) -> Result<Option<M>> {
        let adapter = self.writer.adapters.get::<M>()?;
        adapter.load_by_key(key, &self.writer.connection)
    }

    /// Load every row of the table for `M`, in rowid order.
    ///
    /// # Errors
    ///
    /// Returns error if the query failed or no adapter is registered.
    pub fn query_list<M: Clone + Send + Sync + 'static>(&self) -> Result<Vec<M>> {
        let adapter = self.writer.adapters.get::<M>()?;
        adapter.query_list(&self.writer.connection)
    }

    /// Execute a raw statement. No change notification is recorded; pair
    /// with [`Self::notify_table_changed`] when the statement mutates an
    /// observed table.
    ///
    /// # Errors
    ///
    /// Returns error if the statement failed.
    pub fn execute_raw(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.writer.connection.execute(sql, params)
    }

    /// Run a raw query and map every row through `f`.
    ///
    /// # Errors
    ///
    /// Returns error if the query failed or `f` returned an error.
    pub fn query_raw<T>(
        &self,
        sql: &str,
        params: &[Value],
        f: impl FnMut(&crate::connection::SqlRow<'_>) -> Result<T>,
    ) -> Result<Vec<T>> {
        self.writer.connection.query_rows(sql, params, f)
    }

    /// Record a table-level change for the table of `M`, e.g. after a bulk
    /// statement issued through [`Self::execute_raw`].
    ///
    /// # Errors
    ///
    /// Returns error if no adapter is registered for `M`.
    pub fn notify_table_changed<M: Clone + Send + Sync + 'static>(
        &mut self,
        action: ChangeAction,
    ) -> Result<()> {
        let adapter = self.writer.adapters.get::<M>()?;
        self.writer.buffer.record(
            adapter.table_id(),
            ModelNotification::TableChange {
                table: adapter.table_name(),
                action,
            },
        );
        Ok(())
    }

    /// Whether the transaction has been asked to cancel. Checking is the
    /// unit of work's responsibility; return [`Error::Cancelled`] to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.writer
            .cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Run nested work against the same context.
    ///
    /// The enclosing transaction is reused rather than re-entering the
    /// dispatcher, so nesting can never deadlock. The nested work joins the
    /// outer commit; a nested error propagates unless the caller handles
    /// it, in which case statements already issued stay part of the outer
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut TransactionContext<'_>) -> Result<T>,
    ) -> Result<T> {
        f(self)
    }

    fn record<M: Clone + Send + Sync + 'static>(
        &mut self,
        adapter: &RegisteredAdapter<M>,
        action: ChangeAction,
        model: &M,
    ) {
        self.writer.buffer.record(
            adapter.table_id(),
            ModelNotification::model_change(adapter.table_name(), action, Arc::new(model.clone())),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adapter::test::{SimpleModel, SimpleModelAdapter};
    use crate::connection::DatabaseConnection;
    use crate::database::{Database, DatabaseConfig, Migration};
    use std::sync::mpsc;
    use std::sync::Mutex;

    struct CreateSimple;

    impl Migration for CreateSimple {
        fn version(&self) -> i64 {
            1
        }

        fn migrate(&self, connection: &DatabaseConnection) -> Result<()> {
            connection.execute_batch(
                "CREATE TABLE simple (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, score REAL)",
            )
        }
    }

    fn test_db() -> Database {
        let database = DatabaseConfig::in_memory()
            .migration(CreateSimple)
            .open()
            .unwrap();
        database.register_adapter(SimpleModelAdapter).unwrap();
        database
    }

    #[test]
    fn enqueued_transactions_commit_in_submission_order() {
        let database = test_db();

        for i in 0..10 {
            database
                .transact(move |ctx| {
                    let mut model = SimpleModel::named(&i.to_string());
                    ctx.insert(&mut model)
                })
                .enqueue()
                .unwrap();
        }

        let rows: Vec<SimpleModel> = database
            .transact(|ctx| ctx.query_list())
            .execute_blocking()
            .unwrap();
        let names: Vec<String> = rows.into_iter().map(|m| m.name).collect();
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn observer_sees_changes_only_after_commit() {
        let database = test_db();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cloned = Arc::clone(&seen);
        database.observe_tables(["simple"], move |n| {
            seen_cloned.lock().unwrap().push(n.action());
        });

        let seen_inside = Arc::clone(&seen);
        database
            .transact(move |ctx| {
                let mut model = SimpleModel::named("a");
                ctx.insert(&mut model)?;
                model.name = "b".to_owned();
                ctx.update(&model)?;
                ctx.delete(&model)?;
                // Nothing delivered while the unit of work is running.
                assert!(seen_inside.lock().unwrap().is_empty());
                Ok(())
            })
            .execute_blocking()
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ChangeAction::Insert,
                ChangeAction::Update,
                ChangeAction::Delete,
                ChangeAction::Change,
            ]
        );
    }

    #[test]
    fn rollback_emits_no_notifications() {
        let database = test_db();
        let seen = Arc::new(Mutex::new(0_usize));
        let seen_cloned = Arc::clone(&seen);
        database.observe_tables(["simple"], move |_| {
            *seen_cloned.lock().unwrap() += 1;
        });

        let mut probe = SimpleModel::named("doomed");
        let result = database
            .transact(move |ctx| {
                let mut model = SimpleModel::named("doomed");
                ctx.insert(&mut model)?;
                ctx.execute_raw("NOT VALID SQL", &[])?;
                Ok(())
            })
            .execute_blocking();
        assert!(result.is_err());
        assert_eq!(*seen.lock().unwrap(), 0);

        // The insert was rolled back with the transaction.
        probe.id = 1;
        let exists = database
            .transact(move |ctx| ctx.exists(&probe))
            .execute_blocking()
            .unwrap();
        assert!(!exists);
    }

    #[test]
    fn callbacks_fire_in_order_before_later_transactions() {
        let database = test_db();
        let events = Arc::new(Mutex::new(Vec::new()));

        let success = Arc::clone(&events);
        let completion = Arc::clone(&events);
        database
            .transact(|ctx| {
                let mut model = SimpleModel::named("first");
                ctx.insert(&mut model)
            })
            .on_success(move |_| success.lock().unwrap().push("success"))
            .on_completion(move |state| {
                assert_eq!(state, TransactionState::Succeeded);
                completion.lock().unwrap().push("completion");
            })
            .enqueue()
            .unwrap();

        let later = Arc::clone(&events);
        database
            .transact(move |_| {
                later.lock().unwrap().push("next transaction");
                Ok(())
            })
            .execute_blocking()
            .unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["success", "completion", "next transaction"]
        );
    }

    #[test]
    fn error_reaches_error_callback_then_completion() {
        let database = test_db();
        let events = Arc::new(Mutex::new(Vec::new()));

        let on_error = Arc::clone(&events);
        let on_completion = Arc::clone(&events);
        let handle = database
            .transact(|ctx| {
                ctx.execute_raw("NOT VALID SQL", &[])?;
                Ok(())
            })
            .on_error(move |err| {
                assert!(matches!(err, Error::Sqlite(_)));
                on_error.lock().unwrap().push("error");
            })
            .on_completion(move |state| {
                assert_eq!(state, TransactionState::Failed);
                on_completion.lock().unwrap().push("completion");
            })
            .enqueue()
            .unwrap();

        // Barrier transaction: the failed one has fully finalized after it.
        database.transact(|_| Ok(())).execute_blocking().unwrap();

        assert_eq!(*events.lock().unwrap(), vec!["error", "completion"]);
        assert_eq!(handle.state(), TransactionState::Failed);
    }

    #[test]
    fn cancel_before_start_skips_the_work() {
        let database = test_db();

        // Gate the writer so the target transaction stays queued.
        let (gate, gate_open) = mpsc::channel::<()>();
        database
            .transact(move |_| {
                gate_open.recv().ok();
                Ok(())
            })
            .enqueue()
            .unwrap();

        let (done, finished) = mpsc::channel();
        let handle = database
            .transact(|ctx| {
                let mut model = SimpleModel::named("never");
                ctx.insert(&mut model)
            })
            .on_completion(move |state| done.send(state).unwrap())
            .enqueue()
            .unwrap();

        handle.cancel();
        gate.send(()).unwrap();

        assert_eq!(finished.recv().unwrap(), TransactionState::Cancelled);
        assert_eq!(handle.state(), TransactionState::Cancelled);
        let rows: Vec<SimpleModel> = database
            .transact(|ctx| ctx.query_list())
            .execute_blocking()
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn running_transaction_observes_cancellation() {
        let database = test_db();

        let (started, wait_started) = mpsc::channel();
        let (cancelled, wait_cancelled) = mpsc::channel::<()>();
        let handle = database
            .transact(move |ctx| {
                let mut model = SimpleModel::named("partial");
                ctx.insert(&mut model)?;
                started.send(()).unwrap();
                wait_cancelled.recv().ok();
                if ctx.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                Ok(())
            })
            .enqueue()
            .unwrap();

        wait_started.recv().unwrap();
        handle.cancel();
        cancelled.send(()).unwrap();

        // Barrier: the cancelled transaction has rolled back after it.
        let rows: Vec<SimpleModel> = database
            .transact(|ctx| ctx.query_list())
            .execute_blocking()
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(handle.state(), TransactionState::Cancelled);
    }

    #[test]
    fn blocking_from_the_writer_thread_is_rejected() {
        let database = Arc::new(test_db());

        let inner = Arc::clone(&database);
        let result = database
            .transact(move |_| {
                let nested = inner.transact(|_| Ok(())).execute_blocking();
                assert!(matches!(nested, Err(Error::ReentrantBlocking)));
                Ok(())
            })
            .execute_blocking();
        assert!(result.is_ok());
    }

    #[test]
    fn nested_work_joins_the_outer_transaction() {
        let database = test_db();
        let seen = Arc::new(Mutex::new(0_usize));
        let seen_cloned = Arc::clone(&seen);
        database.observe_tables(["simple"], move |_| {
            *seen_cloned.lock().unwrap() += 1;
        });

        database
            .transact(|ctx| {
                let mut outer = SimpleModel::named("outer");
                ctx.insert(&mut outer)?;
                ctx.transact(|ctx| {
                    let mut inner = SimpleModel::named("inner");
                    ctx.insert(&mut inner)
                })?;
                Ok(())
            })
            .execute_blocking()
            .unwrap();

        // Two model changes plus one consolidated table change, all flushed
        // by the single outer commit.
        assert_eq!(*seen.lock().unwrap(), 3);
    }

    #[test]
    fn custom_executor_receives_callbacks() {
        let database = test_db();
        let ran_on = Arc::new(Mutex::new(Vec::new()));

        let executor_log = Arc::clone(&ran_on);
        let executor = CallbackExecutor::Custom(Arc::new(move |f| {
            executor_log.lock().unwrap().push("executor");
            f();
        }));

        let result: i64 = database
            .transact(|ctx| {
                let mut model = SimpleModel::named("custom");
                ctx.insert(&mut model)
            })
            .callback_executor(executor)
            .execute_blocking()
            .unwrap();
        assert_eq!(result, 1);
        assert_eq!(*ran_on.lock().unwrap(), vec!["executor"]);
    }

    #[test]
    fn raw_statement_with_manual_notification() {
        let database = test_db();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cloned = Arc::clone(&seen);
        database.observe_tables(["simple"], move |n| {
            seen_cloned.lock().unwrap().push((n.table(), n.action()));
        });

        database
            .transact(|ctx| {
                ctx.execute_raw(
                    "INSERT INTO simple (name) VALUES (?)",
                    &[Value::from("raw")],
                )?;
                ctx.notify_table_changed::<SimpleModel>(ChangeAction::Insert)?;
                Ok(())
            })
            .execute_blocking()
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("simple", ChangeAction::Insert),
                ("simple", ChangeAction::Change),
            ]
        );
    }
}
