//! This crate provides the core runtime of a small sqlite object mapper:
//! per-table model adapters, a single-writer transaction dispatcher and a
//! table-change observation pipeline similar to Room (Android) and Core Data
//! (iOS). Query building beyond the generated per-table statements is not
//! included, but raw SQL can be issued through the same transaction context.
//!
//! # Basic example
//!
//! ```rust
//! use modelflow::adapter::{Column, ModelAdapter};
//! use modelflow::connection::DatabaseConnection;
//! use modelflow::database::{DatabaseConfig, Migration};
//! use modelflow::error::Result;
//! use modelflow::value::{SqlType, Value};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Todo {
//!     id: i64,
//!     title: String,
//! }
//!
//! struct TodoAdapter;
//!
//! const TODO_COLUMNS: [Column; 2] = [
//!     Column::new("id", SqlType::Integer).primary_key().autoincrement(),
//!     Column::new("title", SqlType::Text),
//! ];
//!
//! impl ModelAdapter for TodoAdapter {
//!     type Model = Todo;
//!
//!     fn table_name(&self) -> &'static str {
//!         "todo"
//!     }
//!
//!     fn columns(&self) -> &[Column] {
//!         &TODO_COLUMNS
//!     }
//!
//!     fn new_model(&self) -> Todo {
//!         Todo::default()
//!     }
//!
//!     fn get_value(&self, model: &Todo, column: usize) -> Value {
//!         match column {
//!             0 if model.id == 0 => Value::Null,
//!             0 => Value::Integer(model.id),
//!             1 => Value::Text(model.title.clone()),
//!             _ => Value::Null,
//!         }
//!     }
//!
//!     fn set_value(&self, model: &mut Todo, column: usize, value: Value) {
//!         match column {
//!             0 => model.id = value.as_integer().unwrap_or_default(),
//!             1 => model.title = value.as_text().unwrap_or_default().to_owned(),
//!             _ => {}
//!         }
//!     }
//! }
//!
//! struct CreateTodo;
//!
//! impl Migration for CreateTodo {
//!     fn version(&self) -> i64 {
//!         1
//!     }
//!
//!     fn migrate(&self, connection: &DatabaseConnection) -> Result<()> {
//!         connection.execute_batch(
//!             "CREATE TABLE todo (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT)",
//!         )
//!     }
//! }
//!
//! // Open a database and register the table binding.
//! let database = DatabaseConfig::in_memory().migration(CreateTodo).open().unwrap();
//! database.register_adapter(TodoAdapter).unwrap();
//! // Observe committed changes to the table.
//! let handle = database.observe_tables(["todo"], |notification| {
//!     println!("changed: {notification:?}");
//! });
//! // All writes go through transactions on the dispatcher.
//! let id = database
//!     .transact(|ctx| {
//!         let mut todo = Todo { id: 0, title: "write docs".to_owned() };
//!         ctx.insert(&mut todo)
//!     })
//!     .execute_blocking()
//!     .unwrap();
//! assert_eq!(id, 1);
//! database.remove_observer(handle);
//! ```
//!
//! # How it works
//!
//! Every table binds a model type through an [`adapter::ModelAdapter`]: a
//! static column table plus typed accessors per column index. Registration
//! with a [`database::Database`] validates the binding and assembles the
//! table's SQL once; the generic insert/update/delete/save/load operations
//! are driven off that binding with no per-call reflection.
//!
//! All mutating work is expressed as transactions and serialized onto one
//! writer thread owned by the database (see [`transaction`]). While a unit
//! of work runs, every adapter mutation is recorded in a change buffer.
//! When the transaction commits, the buffer is flushed through the
//! database's notifier before the next queued transaction starts: model
//! changes in mutation order, then one consolidated table-level change per
//! touched table. A rolled back transaction discards the buffer and emits
//! nothing.
//!
//! # Change delivery
//!
//! With the default [`database::NotifierStrategy::Direct`], observers
//! registered via [`database::Database::observe_tables`] are invoked on the
//! writer thread. [`database::NotifierStrategy::Broadcast`] publishes the
//! type-erased notifications onto a channel instead, for bridging to other
//! delivery mechanisms.
//!
//! # Single process
//!
//! Change observation only covers writes that go through a database's own
//! dispatcher. Writes by other processes, or through a second connection to
//! the same file, are not observed.

pub mod adapter;
pub mod cache;
pub mod connection;
pub mod database;
mod dispatcher;
pub mod error;
pub mod notifier;
pub mod observer;
pub mod transaction;
pub mod value;
