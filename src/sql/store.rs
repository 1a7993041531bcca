//! `SQLite`-backed structured store with sample data.

use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::ensure_select;
use crate::error::SqlError;

/// Tool description shown to the router when it chooses between tools.
pub const SQL_TOOL_DESCRIPTION: &str = "SQL Tool - Query structured data from a SQLite database.

Use this tool when:
- User asks for specific facts, numbers, or statistics
- User wants to query structured data (employees, products, sales, etc.)
- User asks \"how many\", \"what is the\", \"list all\", \"find\", etc.
- User needs exact matches or calculations

Database contains:
- employees: Employee information (name, department, salary, hire_date, email)
- products: Product catalog (name, category, price, stock, description)
- sales: Sales transactions (product_id, employee_id, sale_date, quantity, total_amount)

Examples:
- \"How many employees are in Engineering?\"
- \"What is the total sales amount for January?\"
- \"List all products in the Electronics category\"
- \"Find employees with salary above 100000\"";

const SCHEMA_SQL: &str = "
CREATE TABLE employees (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    department TEXT NOT NULL,
    salary REAL,
    hire_date TEXT,
    email TEXT
);
CREATE TABLE products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    price REAL,
    stock INTEGER,
    description TEXT
);
CREATE TABLE sales (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER,
    employee_id INTEGER,
    sale_date TEXT,
    quantity INTEGER,
    total_amount REAL,
    FOREIGN KEY (product_id) REFERENCES products(id),
    FOREIGN KEY (employee_id) REFERENCES employees(id)
);
";

const EMPLOYEES: [(&str, &str, f64, &str, &str); 6] = [
    ("Alice Johnson", "Engineering", 120_000.0, "2020-01-15", "alice@company.com"),
    ("Bob Smith", "Sales", 95_000.0, "2019-03-20", "bob@company.com"),
    ("Carol White", "Engineering", 115_000.0, "2021-06-10", "carol@company.com"),
    ("David Brown", "Marketing", 88_000.0, "2020-11-05", "david@company.com"),
    ("Eva Davis", "Sales", 92_000.0, "2022-02-14", "eva@company.com"),
    ("Frank Miller", "Engineering", 125_000.0, "2018-09-01", "frank@company.com"),
];

const PRODUCTS: [(&str, &str, f64, i64, &str); 5] = [
    ("Laptop Pro", "Electronics", 1299.99, 45, "High-performance laptop for professionals"),
    ("Wireless Mouse", "Electronics", 29.99, 150, "Ergonomic wireless mouse"),
    ("Office Chair", "Furniture", 299.99, 30, "Comfortable ergonomic office chair"),
    ("Desk Lamp", "Furniture", 49.99, 80, "LED desk lamp with adjustable brightness"),
    ("Monitor 27in", "Electronics", 399.99, 25, "27-inch 4K monitor"),
];

const SALES: [(i64, i64, &str, i64, f64); 6] = [
    (1, 2, "2024-01-15", 2, 2599.98),
    (2, 2, "2024-01-16", 5, 149.95),
    (3, 4, "2024-01-17", 1, 299.99),
    (4, 5, "2024-01-18", 3, 149.97),
    (1, 5, "2024-01-19", 1, 1299.99),
    (5, 2, "2024-01-20", 2, 799.98),
];

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub data_type: String,
}

/// One table and its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnInfo>,
}

/// User tables of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    /// Tables in creation order.
    pub tables: Vec<TableSchema>,
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, table) in self.tables.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "Table: {}", table.name)?;
            for column in &table.columns {
                writeln!(f, "  - {} ({})", column.name, column.data_type)?;
            }
        }
        Ok(())
    }
}

/// Rows returned by a guarded query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// One JSON object per row, keyed by column name.
    pub rows: Vec<Map<String, Value>>,
}

impl QueryOutput {
    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

/// Handle on the database file. Connections are opened per call.
#[derive(Debug, Clone)]
pub struct SqlStore {
    path: PathBuf,
}

impl SqlStore {
    /// Creates a handle; the file is not touched.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a handle and provisions the sample database when the file
    /// is missing, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] if provisioning fails.
    pub fn open_or_provision(path: impl Into<PathBuf>) -> Result<Self, SqlError> {
        let store = Self::new(path);
        store.provision_sample(false)?;
        Ok(store)
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the database file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Creates the sample database.
    ///
    /// Does nothing when the file exists unless `force` is set, in which
    /// case the file is replaced. Returns whether a database was written.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError`] on filesystem or `SQLite` failures.
    pub fn provision_sample(&self, force: bool) -> Result<bool, SqlError> {
        if self.exists() {
            if !force {
                debug!(path = %self.path.display(), "database exists, skipping provisioning");
                return Ok(false);
            }
            std::fs::remove_file(&self.path)?;
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(&self.path)?;
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA_SQL)?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO employees (name, department, salary, hire_date, email) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (name, department, salary, hire_date, email) in EMPLOYEES {
                insert.execute(params![name, department, salary, hire_date, email])?;
            }

            let mut insert = tx.prepare(
                "INSERT INTO products (name, category, price, stock, description) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (name, category, price, stock, description) in PRODUCTS {
                insert.execute(params![name, category, price, stock, description])?;
            }

            let mut insert = tx.prepare(
                "INSERT INTO sales (product_id, employee_id, sale_date, quantity, total_amount) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (product_id, employee_id, sale_date, quantity, total) in SALES {
                insert.execute(params![product_id, employee_id, sale_date, quantity, total])?;
            }
        }
        tx.commit()?;

        info!(path = %self.path.display(), "provisioned sample database");
        Ok(true)
    }

    fn open_read_only(&self) -> Result<Connection, SqlError> {
        if !self.exists() {
            return Err(SqlError::NotProvisioned {
                path: self.path.clone(),
            });
        }
        Ok(Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?)
    }

    /// Reads the user tables and their columns.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::NotProvisioned`] if the file is missing.
    pub fn schema(&self) -> Result<Schema, SqlError> {
        let conn = self.open_read_only()?;
        let mut tables_stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid",
        )?;
        let names = tables_stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut columns_stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = columns_stmt
                .query_map([&name], |row| {
                    Ok(ColumnInfo {
                        name: row.get(0)?,
                        data_type: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            tables.push(TableSchema { name, columns });
        }

        Ok(Schema { tables })
    }

    /// Runs a guarded SELECT and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::Rejected`] for non-SELECT statements (nothing is
    /// executed) and [`SqlError::Sqlite`] for invalid SQL.
    pub fn execute(&self, statement: &str) -> Result<QueryOutput, SqlError> {
        let statement = ensure_select(statement)?;
        let conn = self.open_read_only()?;
        let mut stmt = conn.prepare(statement)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Map::new();
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), to_json(row.get_ref(i)?));
            }
            out.push(record);
        }

        debug!(rows = out.len(), "query executed");
        Ok(QueryOutput { columns, rows: out })
    }

    /// Tool description used in routing prompts.
    #[must_use]
    pub const fn describe_tool(&self) -> &'static str {
        SQL_TOOL_DESCRIPTION
    }
}
