//! The session: identity map plus unit of work over one connection.

use crate::identity_map::{Entry, IdentityKey, IdentityMap};
use crate::instance::{Instance, ObjectState, Tracked, same_object};
use crate::result::ScalarResult;
use ormtour_core::error::{
    QueryError, QueryErrorKind, SessionError, SessionErrorKind, TransactionError,
    TransactionErrorKind,
};
use ormtour_core::{Connection, Error, Model, Result, Rows, Value};
use ormtour_query::{Expr, Select, Statement, Update, update};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration for Session behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Flush pending changes before every query issued through the session.
    pub autoflush: bool,
    /// Expire persistent objects after commit so the next query reloads them.
    pub expire_on_commit: bool,
    /// Begin a transaction on the first query, not only on the first flush.
    pub auto_begin: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autoflush: true,
            expire_on_commit: true,
            auto_begin: true,
        }
    }
}

impl SessionConfig {
    pub fn autoflush(mut self, value: bool) -> Self {
        self.autoflush = value;
        self
    }

    pub fn expire_on_commit(mut self, value: bool) -> Self {
        self.expire_on_commit = value;
        self
    }

    pub fn auto_begin(mut self, value: bool) -> Self {
        self.auto_begin = value;
        self
    }
}

struct DirtyUpdate {
    key: IdentityKey,
    statement: Update,
}

/// Tracks objects and writes their changes back in one transaction.
///
/// ```ignore
/// let mut session = Session::new(conn);
/// let user = Instance::new(User::new("user3"));
/// session.add(&user)?;
/// let found = session.scalars(&select::<User>().filter(User::NAME.eq("user3")))?.one()?;
/// assert!(found.ptr_eq(&user));
/// session.commit()?;
/// session.close()?;
/// ```
pub struct Session {
    id: u64,
    conn: Arc<dyn Connection>,
    config: SessionConfig,
    identity: IdentityMap,
    /// Objects waiting for INSERT, in the order they were added.
    pending: Vec<Arc<dyn Tracked>>,
    /// Objects inserted inside the transaction that is still open.
    inserted: Vec<Arc<dyn Tracked>>,
    owns_transaction: bool,
    /// Set when a flush fails; cleared by rollback.
    failure: Option<String>,
}

impl Session {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self::with_config(conn, SessionConfig::default())
    }

    pub fn with_config(conn: Arc<dyn Connection>, config: SessionConfig) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session = id, ?config, "Session opened");
        Self {
            id,
            conn,
            config,
            identity: IdentityMap::default(),
            pending: Vec::new(),
            inserted: Vec::new(),
            owns_transaction: false,
            failure: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    // ------------------------------------------------------------------
    // Object tracking
    // ------------------------------------------------------------------

    /// Attach an object.
    ///
    /// Transient objects become pending. A detached object that carries a
    /// primary key becomes persistent again, unless another object with
    /// the same identity is already in this session.
    pub fn add<M: Model>(&mut self, instance: &Instance<M>) -> Result<()> {
        self.ensure_usable()?;
        let object = instance.erased();

        match (object.session_id(), object.state()) {
            (Some(owner), _) if owner == self.id => return Ok(()),
            (Some(owner), ObjectState::Pending | ObjectState::Persistent) => {
                return Err(session_error(
                    SessionErrorKind::IdentityConflict,
                    format!("Object is already attached to session {}", owner),
                ));
            }
            _ => {}
        }

        if object.state() == ObjectState::Detached {
            if let Some(pk) = object.identity() {
                let key = IdentityKey::new(M::TABLE_NAME, pk);
                if self.identity.get(&key.table, &key.pk).is_some() {
                    return Err(session_error(
                        SessionErrorKind::IdentityConflict,
                        format!(
                            "Can't attach instance; another instance with key {} is already present in this session",
                            key
                        ),
                    ));
                }
                tracing::debug!(session = self.id, key = %key, "Re-attaching detached object");
                object.set_state(ObjectState::Persistent, Some(self.id));
                self.identity.insert(Entry::new(key, object));
                return Ok(());
            }
        }

        object.set_state(ObjectState::Pending, Some(self.id));
        self.pending.push(object);
        Ok(())
    }

    pub fn add_all<'a, M, I>(&mut self, instances: I) -> Result<()>
    where
        M: Model,
        I: IntoIterator<Item = &'a Instance<M>>,
    {
        for instance in instances {
            self.add(instance)?;
        }
        Ok(())
    }

    /// Remove one object from the session.
    ///
    /// Pending objects become transient; persistent ones become detached.
    pub fn expunge<M: Model>(&mut self, instance: &Instance<M>) -> Result<()> {
        let object = instance.erased();

        if let Some(pos) = self.pending.iter().position(|p| same_object(p, &object)) {
            self.pending.remove(pos);
            object.set_state(ObjectState::Transient, None);
            return Ok(());
        }

        if self.identity.remove_object(&object).is_some() {
            self.inserted.retain(|o| !same_object(o, &object));
            object.set_state(ObjectState::Detached, None);
            return Ok(());
        }

        Err(session_error(
            SessionErrorKind::NotTracked,
            "Instance is not present in this session".to_string(),
        ))
    }

    /// Detach every object.
    pub fn expunge_all(&mut self) {
        for object in self.pending.drain(..) {
            object.set_state(ObjectState::Transient, None);
        }
        for entry in self.identity.drain() {
            entry.object.set_state(ObjectState::Detached, None);
        }
        self.inserted.clear();
    }

    /// Mark every persistent object for reload on its next query.
    pub fn expire_all(&mut self) {
        for entry in self.identity.iter_mut() {
            entry.expired = true;
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Pending objects of type `M`, in the order they were added.
    pub fn new_objects<M: Model>(&self) -> Vec<Instance<M>> {
        self.pending
            .iter()
            .filter_map(Instance::from_erased)
            .collect()
    }

    /// Keys of every persistent object, in the order they were loaded.
    pub fn identity_keys(&self) -> Vec<IdentityKey> {
        self.identity.iter().map(|e| e.key.clone()).collect()
    }

    pub fn contains<M: Model>(&self, instance: &Instance<M>) -> bool {
        let object = instance.erased();
        self.pending.iter().any(|p| same_object(p, &object))
            || self.identity.contains_object(&object)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending plus persistent objects.
    pub fn tracked_count(&self) -> usize {
        self.pending.len() + self.identity.len()
    }

    /// Persistent objects whose fields changed since they were loaded.
    pub fn dirty_count(&self) -> usize {
        self.identity
            .iter()
            .filter(|e| !e.changes().is_empty())
            .count()
    }

    /// Whether a failed flush is waiting for `rollback()`.
    pub fn needs_rollback(&self) -> bool {
        self.failure.is_some()
    }

    /// Whether this session has a transaction open.
    pub fn in_transaction(&self) -> bool {
        self.owns_transaction
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Load objects, returning already-tracked instances where the
    /// identity map has them.
    #[tracing::instrument(level = "debug", skip(self, stmt), fields(session = self.id, table = M::TABLE_NAME))]
    pub fn scalars<M: Model>(&mut self, stmt: &Select<M>) -> Result<ScalarResult<M>> {
        self.before_query()?;
        let (sql, params) = stmt.build();
        let rows = self.conn.query(&sql, &params)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let model = M::from_row(row)?;
            items.push(self.merge_loaded(model)?);
        }
        tracing::debug!(rows = items.len(), "Loaded objects");
        Ok(ScalarResult::new(items))
    }

    /// Look an object up by primary key, consulting the identity map first.
    ///
    /// Pass the key by value: `get(user.read().id)` keeps a read guard
    /// alive for the whole call, so refreshing `user` fails.
    pub fn get<M: Model>(&mut self, pk: impl Into<Value>) -> Result<Option<Instance<M>>> {
        self.ensure_usable()?;
        let [pk_column] = M::PRIMARY_KEY else {
            return Err(Error::build(format!(
                "get() needs a single-column primary key; '{}' has {}",
                M::TABLE_NAME,
                M::PRIMARY_KEY.len()
            )));
        };
        let pk = pk.into();

        if let Some(entry) = self.identity.get(M::TABLE_NAME, std::slice::from_ref(&pk)) {
            if !entry.expired {
                if let Some(instance) = Instance::from_erased(&entry.object) {
                    return Ok(Some(instance));
                }
            }
        }

        let stmt = Select::<M>::new().filter(Expr::qualified(M::TABLE_NAME, *pk_column).eq(pk));
        Ok(self.scalars(&stmt)?.first())
    }

    /// Run any statement through the session's connection and return its rows.
    pub fn execute(&mut self, stmt: &impl Statement) -> Result<Rows> {
        self.before_query()?;
        let (sql, params) = stmt.build();
        self.conn.query(&sql, &params)
    }

    fn before_query(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.config.autoflush {
            self.flush()?;
        }
        if self.config.auto_begin {
            self.begin_if_needed()?;
        }
        Ok(())
    }

    /// Resolve a freshly decoded row against the identity map.
    fn merge_loaded<M: Model>(&mut self, model: M) -> Result<Instance<M>> {
        let Some(pk) = model.identity() else {
            return Ok(Instance::new(model));
        };

        if let Some(entry) = self.identity.get_mut(M::TABLE_NAME, &pk) {
            let Some(instance) = Instance::<M>::from_erased(&entry.object) else {
                return Err(session_error(
                    SessionErrorKind::IdentityConflict,
                    format!("Key {} is held by an object of another type", entry.key),
                ));
            };
            // Unflushed edits win over the stored row.
            if entry.expired && entry.changes().is_empty() {
                let Some(mut fields) = instance.try_write() else {
                    return Err(session_error(
                        SessionErrorKind::InstanceLocked,
                        format!("Cannot refresh {} while it is borrowed", entry.key),
                    ));
                };
                *fields = model;
                drop(fields);
                entry.snapshot = entry.object.values();
                entry.expired = false;
            }
            return Ok(instance);
        }

        let instance = Instance::new(model);
        let object = instance.erased();
        object.set_state(ObjectState::Persistent, Some(self.id));
        self.identity
            .insert(Entry::new(IdentityKey::new(M::TABLE_NAME, pk), object));
        Ok(instance)
    }

    // ------------------------------------------------------------------
    // Unit of work
    // ------------------------------------------------------------------

    /// Write pending inserts and dirty updates to the database.
    ///
    /// All statements run before any object is modified. If one fails, the
    /// transaction is rolled back, every object keeps its prior state, and
    /// the session refuses further work until [`rollback`](Self::rollback).
    #[tracing::instrument(level = "debug", skip(self), fields(session = self.id))]
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_usable()?;
        let updates = self.dirty_updates();
        if self.pending.is_empty() && updates.is_empty() {
            return Ok(());
        }

        self.begin_if_needed()?;

        let decoded = match self.write_changes(&updates) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        let inserted = self.pending.len();
        for (object, model) in self.pending.drain(..).zip(decoded) {
            object.apply(model);
            object.set_state(ObjectState::Persistent, Some(self.id));
            match object.identity() {
                Some(pk) => {
                    let key = IdentityKey::new(object.table(), pk);
                    self.identity.insert(Entry::new(key, Arc::clone(&object)));
                }
                None => {
                    tracing::warn!(table = object.table(), "Inserted row has no primary key");
                }
            }
            self.inserted.push(object);
        }

        for update in &updates {
            if let Some(entry) = self.identity.get_mut(&update.key.table, &update.key.pk) {
                entry.snapshot = entry.object.values();
            }
        }

        tracing::debug!(inserted, updated = updates.len(), "Flush complete");
        Ok(())
    }

    fn dirty_updates(&self) -> Vec<DirtyUpdate> {
        self.identity
            .iter()
            .filter_map(|entry| {
                let changes = entry.changes();
                if changes.is_empty() {
                    return None;
                }
                let mut statement = update(entry.object.table());
                for (column, value) in changes {
                    statement = statement.set(column, value);
                }
                for (column, value) in entry.object.primary_key_columns().iter().zip(&entry.key.pk)
                {
                    statement = statement.filter(Expr::col(*column).eq(value.clone()));
                }
                Some(DirtyUpdate {
                    key: entry.key.clone(),
                    statement,
                })
            })
            .collect()
    }

    /// Execute every statement of the flush. Objects are not touched.
    fn write_changes(&self, updates: &[DirtyUpdate]) -> Result<Vec<Box<dyn Any + Send>>> {
        let mut decoded = Vec::with_capacity(self.pending.len());

        for object in &self.pending {
            let (sql, params) = object.insert_statement();
            let row = self.conn.query_one(&sql, &params)?.ok_or_else(|| {
                Error::Query(QueryError {
                    kind: QueryErrorKind::Database,
                    sql: Some(sql.clone()),
                    message: "INSERT .. RETURNING produced no row".to_string(),
                    source: None,
                })
            })?;
            decoded.push(object.decode(&row)?);
        }

        for update in updates {
            let (sql, params) = update.statement.build();
            let affected = self.conn.execute(&sql, &params)?;
            if affected != 1 {
                return Err(Error::Query(QueryError {
                    kind: QueryErrorKind::NotFound,
                    sql: Some(sql),
                    message: format!(
                        "UPDATE statement on table '{}' expected to update 1 row(s); {} were matched",
                        update.key.table, affected
                    ),
                    source: None,
                }));
            }
        }

        Ok(decoded)
    }

    fn fail(&mut self, error: &Error) {
        tracing::warn!(session = self.id, error = %error, "Flush failed; rolling back");
        if self.owns_transaction {
            self.owns_transaction = false;
            if let Err(e) = self.conn.rollback() {
                tracing::warn!(error = %e, "Rollback after failed flush failed");
            }
        }
        self.failure = Some(error.to_string());
    }

    /// Flush, then commit the session's transaction.
    #[tracing::instrument(level = "debug", skip(self), fields(session = self.id))]
    pub fn commit(&mut self) -> Result<()> {
        self.flush()?;

        if self.owns_transaction {
            self.conn.commit()?;
            self.owns_transaction = false;
        }
        self.inserted.clear();

        if self.config.expire_on_commit {
            self.expire_all();
        }
        tracing::debug!(tracked = self.identity.len(), "Committed");
        Ok(())
    }

    /// Roll back the open transaction.
    ///
    /// Objects inserted inside it lose their key and become transient.
    /// Persistent objects are expired. Pending objects stay pending.
    #[tracing::instrument(level = "debug", skip(self), fields(session = self.id))]
    pub fn rollback(&mut self) -> Result<()> {
        let result = self.rollback_transaction();
        self.discard_inserted();
        self.expire_all();
        self.failure = None;
        result
    }

    /// Roll back, then detach everything. The session may be reused.
    pub fn close(&mut self) -> Result<()> {
        let result = self.rollback_transaction();
        self.discard_inserted();
        self.expunge_all();
        self.failure = None;
        tracing::debug!(session = self.id, "Session closed");
        result
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        if !self.owns_transaction {
            return Ok(());
        }
        self.owns_transaction = false;
        self.conn.rollback()
    }

    fn discard_inserted(&mut self) {
        for object in self.inserted.drain(..) {
            self.identity.remove_object(&object);
            object.clear_primary_key();
            object.set_state(ObjectState::Transient, None);
        }
    }

    /// Open the session's own transaction.
    ///
    /// A transaction opened by someone else on the shared connection is
    /// never joined: its COMMIT or ROLLBACK would decide the fate of this
    /// session's writes.
    fn begin_if_needed(&mut self) -> Result<()> {
        if self.owns_transaction {
            return Ok(());
        }
        if self.conn.in_transaction() {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive,
                message: format!(
                    "Session {} cannot begin: another transaction is open on its connection",
                    self.id
                ),
            }));
        }
        self.conn.begin()?;
        self.owns_transaction = true;
        tracing::debug!(session = self.id, "BEGIN (implicit)");
        Ok(())
    }

    fn ensure_usable(&self) -> Result<()> {
        match &self.failure {
            None => Ok(()),
            Some(reason) => Err(session_error(
                SessionErrorKind::NeedsRollback,
                format!(
                    "This session's transaction has been rolled back due to a previous \
                     exception during flush. To begin a new transaction, call rollback() \
                     first. Original exception was: {}",
                    reason
                ),
            )),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.owns_transaction || self.tracked_count() > 0 {
            if let Err(e) = self.close() {
                tracing::warn!(session = self.id, error = %e, "Closing dropped session failed");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .field("persistent", &self.identity.len())
            .field("in_transaction", &self.owns_transaction)
            .field("needs_rollback", &self.failure.is_some())
            .finish()
    }
}

fn session_error(kind: SessionErrorKind, message: String) -> Error {
    Error::Session(SessionError { kind, message })
}
