//! Database handle: adapter registry, migrations, observation surface.
//!
//! A [`Database`] is an explicit context object. Everything scoped to one
//! underlying sqlite file hangs off it: the registered adapters, the
//! observer registry and the single-writer dispatcher that owns the
//! connection. Two databases never share state; holding two handles to
//! different files side by side is fully supported.
//!
//! Dropping the last handle joins the writer thread after draining every
//! transaction still queued.

use crate::adapter::{ModelAdapter, RegisteredAdapter};
use crate::cache::ModelCache;
use crate::connection::DatabaseConnection;
use crate::dispatcher::{Dispatcher, WriterState};
use crate::error::{Error, Result};
use crate::notifier::{ChannelNotifier, DirectNotifier, ModelNotifier};
use crate::observer::{ChangeBuffer, ModelNotification, ObserverHandle, ObserverRegistry};
use crate::transaction::{CallbackExecutor, TransactionBuilder, TransactionContext};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Adapters registered with one database, keyed by model type.
///
/// Registration assigns each table a dense id used by the change buffer's
/// touched-table set.
pub(crate) struct AdapterRegistry {
    inner: RwLock<RegistryInner>,
}

struct RegistryInner {
    /// `RegisteredAdapter<M>` boxed per model type `M`.
    by_type: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    table_ids: HashMap<&'static str, usize>,
    /// Table names by assigned id.
    tables: Vec<&'static str>,
}

impl AdapterRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                by_type: HashMap::new(),
                table_ids: HashMap::new(),
                tables: Vec::new(),
            }),
        }
    }

    fn register<A: ModelAdapter>(
        &self,
        adapter: Arc<A>,
        cache: Option<Arc<dyn ModelCache<A::Model>>>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let table = adapter.table_name();
        if inner.table_ids.contains_key(table) {
            return Err(Error::DuplicateTable(table));
        }
        if inner.by_type.contains_key(&TypeId::of::<A::Model>()) {
            return Err(Error::InvalidAdapter {
                table,
                reason: format!(
                    "model type `{}` is already bound to another table",
                    std::any::type_name::<A::Model>()
                ),
            });
        }

        let table_id = inner.tables.len();
        let registered = RegisteredAdapter::new(adapter, table_id, cache)?;
        inner.tables.push(table);
        inner.table_ids.insert(table, table_id);
        inner
            .by_type
            .insert(TypeId::of::<A::Model>(), Box::new(registered));
        debug!(table, table_id, "adapter registered");
        Ok(())
    }

    pub(crate) fn get<M: Clone + Send + Sync + 'static>(&self) -> Result<RegisteredAdapter<M>> {
        let inner = self.inner.read();
        inner
            .by_type
            .get(&TypeId::of::<M>())
            .and_then(|boxed| boxed.downcast_ref::<RegisteredAdapter<M>>())
            .cloned()
            .ok_or(Error::MissingAdapter(std::any::type_name::<M>()))
    }

    pub(crate) fn table_name(&self, table_id: usize) -> Option<&'static str> {
        self.inner.read().tables.get(table_id).copied()
    }
}

/// One schema change step, identified by a monotonically increasing version.
///
/// Applied inside its own transaction against `PRAGMA user_version`; a
/// failed step rolls back atomically and leaves the recorded version
/// untouched, so the next open retries it.
pub trait Migration {
    /// Target schema version this step migrates to.
    fn version(&self) -> i64;

    /// Apply the schema change.
    ///
    /// # Errors
    ///
    /// Any error aborts the open and rolls this step back.
    fn migrate(&self, connection: &DatabaseConnection) -> Result<()>;
}

fn run_migrations(
    connection: &DatabaseConnection,
    mut migrations: Vec<Box<dyn Migration>>,
) -> Result<()> {
    migrations.sort_by_key(|m| m.version());
    let current = connection.user_version()?;
    for migration in migrations {
        let version = migration.version();
        if version <= current {
            continue;
        }
        connection.begin()?;
        let applied = migration
            .migrate(connection)
            .and_then(|()| connection.set_user_version(version));
        match applied {
            Ok(()) => connection.commit()?,
            Err(err) => {
                let _ = connection.rollback();
                return Err(Error::Migration {
                    version,
                    source: Box::new(err),
                });
            }
        }
        info!(version, "migration applied");
    }
    Ok(())
}

/// How committed changes leave the writer thread.
pub enum NotifierStrategy {
    /// Invoke registered observers directly on the writer thread.
    Direct,
    /// Publish erased notifications onto a stream for external consumers,
    /// e.g. a process-boundary bridge. Observers registered on this
    /// database are not invoked.
    Broadcast(flume::Sender<ModelNotification>),
}

/// Builder for a [`Database`].
pub struct DatabaseConfig {
    path: Option<PathBuf>,
    migrations: Vec<Box<dyn Migration>>,
    notifier: NotifierStrategy,
    executor: CallbackExecutor,
}

impl DatabaseConfig {
    /// Configure an in-memory database. Contents vanish on drop.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            migrations: Vec::new(),
            notifier: NotifierStrategy::Direct,
            executor: CallbackExecutor::Inline,
        }
    }

    /// Configure a database backed by the file at `path`, created on first
    /// open.
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::in_memory()
        }
    }

    /// Add a migration step. Steps may be added in any order, they are
    /// applied sorted by version.
    #[must_use]
    pub fn migration(mut self, migration: impl Migration + 'static) -> Self {
        self.migrations.push(Box::new(migration));
        self
    }

    /// Select how committed changes are published.
    #[must_use]
    pub fn notifier(mut self, strategy: NotifierStrategy) -> Self {
        self.notifier = strategy;
        self
    }

    /// Default executor for transaction completion callbacks. Individual
    /// transactions may override it.
    #[must_use]
    pub fn callback_executor(mut self, executor: CallbackExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Open the database, applying pending migrations first.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or a migration step
    /// failed. A failed step is rolled back and will be retried on the next
    /// open.
    pub fn open(self) -> Result<Database> {
        let connection = match &self.path {
            Some(path) => DatabaseConnection::open(path)?,
            None => DatabaseConnection::open_in_memory()?,
        };
        run_migrations(&connection, self.migrations)?;

        let adapters = Arc::new(AdapterRegistry::new());
        let observers = Arc::new(ObserverRegistry::new());
        let notifier: Arc<dyn ModelNotifier> = match self.notifier {
            NotifierStrategy::Direct => Arc::new(DirectNotifier::new(Arc::clone(&observers))),
            NotifierStrategy::Broadcast(sender) => Arc::new(ChannelNotifier::from_sender(sender)),
        };
        let writer = WriterState {
            connection,
            adapters: Arc::clone(&adapters),
            notifier,
            buffer: ChangeBuffer::new(),
            cancel_flag: None,
        };
        Ok(Database {
            adapters,
            observers,
            dispatcher: Dispatcher::new(writer),
            default_executor: self.executor,
        })
    }
}

/// Handle to one open database.
pub struct Database {
    adapters: Arc<AdapterRegistry>,
    observers: Arc<ObserverRegistry>,
    dispatcher: Dispatcher,
    default_executor: CallbackExecutor,
}

impl Database {
    /// Open an in-memory database with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        DatabaseConfig::in_memory().open()
    }

    /// Register the adapter for one table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTable`] if the table name is taken and
    /// [`Error::InvalidAdapter`] if the binding table is unusable or the
    /// model type is already bound.
    pub fn register_adapter<A: ModelAdapter>(&self, adapter: A) -> Result<()> {
        self.adapters.register(Arc::new(adapter), None)
    }

    /// Register an adapter with a model cache attached to its table.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::register_adapter`].
    pub fn register_adapter_with_cache<A: ModelAdapter>(
        &self,
        adapter: A,
        cache: Arc<dyn ModelCache<A::Model>>,
    ) -> Result<()> {
        self.adapters.register(Arc::new(adapter), Some(cache))
    }

    /// Look up the registered adapter for model type `M`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAdapter`] if `M` was never registered.
    pub fn adapter_for<M: Clone + Send + Sync + 'static>(&self) -> Result<RegisteredAdapter<M>> {
        self.adapters.get::<M>()
    }

    /// Build a transaction around `work`. Nothing runs until the builder is
    /// enqueued or executed.
    pub fn transact<R: Send + 'static>(
        &self,
        work: impl FnOnce(&mut TransactionContext<'_>) -> Result<R> + Send + 'static,
    ) -> TransactionBuilder<'_, R> {
        TransactionBuilder::new(self, work, self.default_executor.clone())
    }

    /// Register `callback` for committed changes to `tables`.
    ///
    /// With the default [`NotifierStrategy::Direct`] the callback runs on
    /// the writer thread between transactions, so it should return quickly.
    pub fn observe_tables(
        &self,
        tables: impl IntoIterator<Item = impl Into<String>>,
        callback: impl Fn(&ModelNotification) + Send + Sync + 'static,
    ) -> ObserverHandle {
        self.observers.register(tables, callback)
    }

    /// Remove an observer registration. Returns `false` if it was already
    /// removed.
    pub fn remove_observer(&self, handle: ObserverHandle) -> bool {
        self.observers.unregister(handle)
    }

    /// Number of transactions enqueued or running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}
