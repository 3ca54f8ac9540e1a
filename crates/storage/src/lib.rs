use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, Row, SqlitePool};
use thiserror::Error;

use roster_core::admission::{self, EmployeeDraft};
use roster_core::types::{Employee, EmployeePatch};

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`, creating the
    /// employees table when it does not exist yet.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle to operate on employee records.
    pub fn employees(&self) -> EmployeeRepository {
        EmployeeRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// Repository for the `employees` table.
#[derive(Clone)]
pub struct EmployeeRepository {
    pool: SqlitePool,
}

impl EmployeeRepository {
    /// Inserts a new employee, assigning `max(id) + 1`.
    ///
    /// The duplicate lookup, the max-id lookup, and the insert run inside a
    /// single transaction; the unique index on `(lower(name), age)` catches
    /// writers that race the check anyway.
    pub async fn create(
        &self,
        draft: &EmployeeDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Employee, EmployeeError> {
        let mut tx = self.pool.begin().await?;

        let duplicate = sqlx::query("SELECT id FROM employees WHERE lower(name) = ? AND age = ?")
            .bind(admission::fold_name(&draft.name))
            .bind(draft.age)
            .fetch_optional(&mut *tx)
            .await?;
        if duplicate.is_some() {
            return Err(EmployeeError::Duplicate {
                name: draft.name.clone(),
                age: draft.age,
            });
        }

        let row = sqlx::query("SELECT MAX(id) AS max_id FROM employees")
            .fetch_one(&mut *tx)
            .await?;
        let max_id: Option<i64> = row.get("max_id");
        let id = admission::next_id(max_id).ok_or(EmployeeError::CapacityExceeded)?;

        let insert = sqlx::query("INSERT INTO employees (id, name, age, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(&draft.name)
            .bind(draft.age)
            .bind(to_rfc3339(created_at))
            .execute(&mut *tx)
            .await;
        match insert {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE) =>
            {
                return Err(EmployeeError::Duplicate {
                    name: draft.name.clone(),
                    age: draft.age,
                });
            }
            Err(err) => return Err(EmployeeError::Database(err)),
        }

        tx.commit().await?;

        Ok(Employee {
            id,
            name: draft.name.clone(),
            age: draft.age,
            created_at,
            updated_at: None,
        })
    }

    /// Loads a single employee by id.
    pub async fn fetch(&self, id: i64) -> Result<Employee, EmployeeError> {
        let row = sqlx::query_as::<_, EmployeeRow>(
            "SELECT id, name, age, created_at, updated_at FROM employees WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(EmployeeError::NotFound)?;

        Ok(row.into_domain())
    }

    /// Applies a partial update, preserving any field the patch omits.
    pub async fn update(
        &self,
        id: i64,
        patch: &EmployeePatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Employee, EmployeeError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, EmployeeRow>(
            "SELECT id, name, age, created_at, updated_at FROM employees WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EmployeeError::NotFound)?
        .into_domain();

        let name = patch.name.clone().unwrap_or(current.name);
        let age = patch.age.unwrap_or(current.age);

        let collision =
            sqlx::query("SELECT id FROM employees WHERE lower(name) = ? AND age = ? AND id != ?")
                .bind(admission::fold_name(&name))
                .bind(age)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if collision.is_some() {
            return Err(EmployeeError::Duplicate { name, age });
        }

        sqlx::query("UPDATE employees SET name = ?, age = ?, updated_at = ? WHERE id = ?")
            .bind(&name)
            .bind(age)
            .bind(to_rfc3339(updated_at))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Employee {
            id,
            name,
            age,
            created_at: current.created_at,
            updated_at: Some(updated_at),
        })
    }

    /// Removes a single employee by id.
    pub async fn delete(&self, id: i64) -> Result<(), EmployeeError> {
        let result = sqlx::query("DELETE FROM employees WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EmployeeError::NotFound);
        }
        Ok(())
    }

    /// Lists every employee in store order.
    pub async fn list(&self) -> Result<Vec<Employee>, EmployeeError> {
        let rows = sqlx::query_as::<_, EmployeeRow>(
            "SELECT id, name, age, created_at, updated_at FROM employees",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EmployeeRow::into_domain).collect())
    }

    /// Removes every employee, returning how many rows were deleted.
    pub async fn clear(&self) -> Result<u64, EmployeeError> {
        let result = sqlx::query("DELETE FROM employees").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Database row for an employee record.
#[derive(Debug, sqlx::FromRow)]
struct EmployeeRow {
    id: i64,
    name: String,
    age: i64,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl EmployeeRow {
    fn into_domain(self) -> Employee {
        Employee {
            id: self.id,
            name: self.name,
            age: self.age,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Errors that can occur while operating on employee records.
///
/// The display strings double as the API error messages.
#[derive(Debug, Error)]
pub enum EmployeeError {
    #[error("Duplicate entry: Employee with name \"{name}\" and age {age} already exists.")]
    Duplicate { name: String, age: i64 },
    #[error("Employee ID limit exceeded. Cannot add more than 30 employees.")]
    CapacityExceeded,
    #[error("Employee not found.")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
