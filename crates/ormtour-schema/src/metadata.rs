//! A registry of table definitions created and dropped together.

use crate::create::{CreateTable, drop_table_sql};
use ormtour_core::error::{SchemaError, SchemaErrorKind};
use ormtour_core::{Connection, Error, Model, Result};

/// One registered table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    /// Tables this one references through foreign keys.
    pub depends_on: Vec<&'static str>,
    pub create_sql: String,
}

impl TableDef {
    fn of<M: Model>() -> Self {
        let mut depends_on = Vec::new();
        for field in M::fields() {
            if let Some((table, _)) = field.references() {
                if !depends_on.contains(&table) {
                    depends_on.push(table);
                }
            }
        }
        Self {
            name: M::TABLE_NAME,
            depends_on,
            create_sql: CreateTable::<M>::new().if_not_exists().build(),
        }
    }
}

/// Table metadata for a set of models.
///
/// ```ignore
/// let metadata = Metadata::new().register::<User>()?.register::<Address>()?;
/// metadata.create_all(&conn)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    tables: Vec<TableDef>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model's table. Registering the same table twice fails.
    pub fn register<M: Model>(mut self) -> Result<Self> {
        if self.contains(M::TABLE_NAME) {
            return Err(Error::Schema(SchemaError {
                kind: SchemaErrorKind::DuplicateTable,
                table: Some(M::TABLE_NAME.to_string()),
                message: "Table is already registered".to_string(),
            }));
        }

        for field in M::fields() {
            if field.foreign_key.is_some() && field.references().is_none() {
                return Err(Error::Schema(SchemaError {
                    kind: SchemaErrorKind::Invalid,
                    table: Some(M::TABLE_NAME.to_string()),
                    message: format!(
                        "Foreign key on '{}' must have the form 'table.column'",
                        field.column_name
                    ),
                }));
            }
        }

        self.tables.push(TableDef::of::<M>());
        Ok(self)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t.name == table)
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables ordered so every table comes after the tables it references.
    ///
    /// Ties keep registration order. References to tables outside this
    /// registry, and self references, are ignored.
    pub fn sorted_tables(&self) -> Result<Vec<&TableDef>> {
        let n = self.tables.len();
        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while order.len() < n {
            let next = (0..n).find(|&i| {
                !placed[i]
                    && self.tables[i].depends_on.iter().all(|dep| {
                        *dep == self.tables[i].name
                            || !self.contains(dep)
                            || self
                                .tables
                                .iter()
                                .position(|t| t.name == *dep)
                                .is_some_and(|j| placed[j])
                    })
            });

            let Some(i) = next else {
                let stuck: Vec<_> = (0..n)
                    .filter(|&i| !placed[i])
                    .map(|i| self.tables[i].name)
                    .collect();
                return Err(Error::Schema(SchemaError {
                    kind: SchemaErrorKind::DependencyCycle,
                    table: stuck.first().map(|t| (*t).to_string()),
                    message: format!("Foreign key cycle between tables: {}", stuck.join(", ")),
                }));
            };

            placed[i] = true;
            order.push(&self.tables[i]);
        }

        Ok(order)
    }

    /// Emit CREATE TABLE IF NOT EXISTS for every table in dependency order.
    pub fn create_all(&self, conn: &dyn Connection) -> Result<()> {
        for table in self.sorted_tables()? {
            tracing::info!(table = table.name, "Creating table");
            tracing::debug!(sql = %table.create_sql, "CREATE TABLE");
            conn.execute(&table.create_sql, &[])?;
        }
        Ok(())
    }

    /// Drop every table, dependents first.
    pub fn drop_all(&self, conn: &dyn Connection) -> Result<()> {
        for table in self.sorted_tables()?.into_iter().rev() {
            tracing::info!(table = table.name, "Dropping table");
            conn.execute(&drop_table_sql(table.name, true), &[])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormtour_macros::Model;
    use ormtour_sqlite::SqliteConnection;

    #[derive(Model, Debug, Clone)]
    #[orm(table = "user_account")]
    struct User {
        #[orm(primary_key, auto_increment)]
        id: Option<i64>,
        name: String,
    }

    #[derive(Model, Debug, Clone)]
    struct Address {
        #[orm(primary_key, auto_increment)]
        id: Option<i64>,
        email_address: String,
        #[orm(foreign_key = "user_account.id")]
        user_id: i64,
    }

    #[derive(Model, Debug, Clone)]
    struct Employee {
        #[orm(primary_key, auto_increment)]
        id: Option<i64>,
        #[orm(foreign_key = "employee.id")]
        manager_id: Option<i64>,
        #[orm(foreign_key = "department.id")]
        department_id: Option<i64>,
    }

    #[derive(Model, Debug, Clone)]
    #[orm(table = "chicken")]
    struct Chicken {
        #[orm(primary_key, auto_increment)]
        id: Option<i64>,
        #[orm(foreign_key = "egg.id")]
        egg_id: Option<i64>,
    }

    #[derive(Model, Debug, Clone)]
    #[orm(table = "egg")]
    struct Egg {
        #[orm(primary_key, auto_increment)]
        id: Option<i64>,
        #[orm(foreign_key = "chicken.id")]
        chicken_id: Option<i64>,
    }

    fn names(metadata: &Metadata) -> Vec<&'static str> {
        metadata
            .sorted_tables()
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let metadata = Metadata::new()
            .register::<Address>()
            .unwrap()
            .register::<User>()
            .unwrap();
        assert_eq!(names(&metadata), vec!["user_account", "address"]);
        assert_eq!(metadata.tables()[0].depends_on, vec!["user_account"]);
    }

    #[test]
    fn test_self_and_unregistered_references_ignored() {
        let metadata = Metadata::new().register::<Employee>().unwrap();
        assert_eq!(names(&metadata), vec!["employee"]);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let err = Metadata::new()
            .register::<User>()
            .unwrap()
            .register::<User>()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError { kind: SchemaErrorKind::DuplicateTable, .. })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let metadata = Metadata::new()
            .register::<Chicken>()
            .unwrap()
            .register::<Egg>()
            .unwrap();
        let err = metadata.sorted_tables().unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError { kind: SchemaErrorKind::DependencyCycle, .. })
        ));
        assert!(err.to_string().contains("chicken, egg"));
    }

    #[test]
    fn test_create_and_drop_all() {
        let conn = SqliteConnection::open_memory().unwrap();
        let metadata = Metadata::new()
            .register::<User>()
            .unwrap()
            .register::<Address>()
            .unwrap();

        metadata.create_all(&conn).unwrap();
        // Idempotent thanks to IF NOT EXISTS.
        metadata.create_all(&conn).unwrap();

        let rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .unwrap();
        let tables: Vec<String> = rows.scalars().unwrap();
        assert_eq!(tables, vec!["address".to_string(), "user_account".to_string()]);

        metadata.drop_all(&conn).unwrap();
        let rows = conn
            .query(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                &[],
            )
            .unwrap();
        assert_eq!(rows.scalars::<i64>().unwrap(), vec![0]);
    }
}
