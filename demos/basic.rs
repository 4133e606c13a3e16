use modelflow::adapter::{Column, ModelAdapter};
use modelflow::connection::DatabaseConnection;
use modelflow::database::{DatabaseConfig, Migration};
use modelflow::error::Result;
use modelflow::value::{SqlType, Value};
use tempdir::TempDir;

// Simple example which inserts, updates and deletes rows from two threads
// while an observer watches the table. It should print one line per
// committed change, e.g.
// ```
// [worker-1] insert on foo
// foo changed: Insert
// foo changed: Change
// ```
fn main() {
    let tmp_dir = TempDir::new("modelflow-basic").unwrap();
    let db_file = tmp_dir.path().join("db.sqlite3");

    let database = DatabaseConfig::at_path(&db_file)
        .migration(CreateFoo)
        .open()
        .unwrap();
    database.register_adapter(FooAdapter).unwrap();

    let (sender, receiver) = std::sync::mpsc::channel();
    let observer_handle = database.observe_tables(["foo"], move |notification| {
        sender
            .send((notification.table(), notification.action()))
            .unwrap();
    });

    let database = std::sync::Arc::new(database);
    let thread_handles = ["worker-1", "worker-2"]
        .into_iter()
        .map(|name| {
            let database = std::sync::Arc::clone(&database);
            std::thread::spawn(move || {
                println!("[{name}] insert on foo");
                let mut foo = Foo {
                    id: 0,
                    value: 400,
                };
                database
                    .transact(move |ctx| {
                        ctx.insert(&mut foo)?;
                        foo.value += 1;
                        ctx.update(&foo)?;
                        Ok(())
                    })
                    .execute_blocking()
                    .unwrap();
            })
        })
        .collect::<Vec<_>>();

    for thread_handle in thread_handles {
        thread_handle.join().unwrap();
    }
    database.remove_observer(observer_handle);

    while let Ok((table, action)) = receiver.try_recv() {
        println!("{table} changed: {action:?}");
    }
}

#[derive(Debug, Clone, Default)]
struct Foo {
    id: i64,
    value: i64,
}

struct FooAdapter;

const FOO_COLUMNS: [Column; 2] = [
    Column::new("id", SqlType::Integer)
        .primary_key()
        .autoincrement(),
    Column::new("value", SqlType::Integer),
];

impl ModelAdapter for FooAdapter {
    type Model = Foo;

    fn table_name(&self) -> &'static str {
        "foo"
    }

    fn columns(&self) -> &[Column] {
        &FOO_COLUMNS
    }

    fn new_model(&self) -> Foo {
        Foo::default()
    }

    fn get_value(&self, model: &Foo, column: usize) -> Value {
        match column {
            0 if model.id == 0 => Value::Null,
            0 => Value::Integer(model.id),
            1 => Value::Integer(model.value),
            _ => Value::Null,
        }
    }

    fn set_value(&self, model: &mut Foo, column: usize, value: Value) {
        match column {
            0 => model.id = value.as_integer().unwrap_or_default(),
            1 => model.value = value.as_integer().unwrap_or_default(),
            _ => {}
        }
    }
}

struct CreateFoo;

impl Migration for CreateFoo {
    fn version(&self) -> i64 {
        1
    }

    fn migrate(&self, connection: &DatabaseConnection) -> Result<()> {
        connection.execute_batch(
            "CREATE TABLE foo (id INTEGER PRIMARY KEY AUTOINCREMENT, value INTEGER)",
        )
    }
}
