//! Shared handles to model objects.
//!
//! An [`Instance`] is what a session hands out: cloning it clones the
//! handle, not the object, so every clone observes the same fields and
//! the same [`ObjectState`].

use ormtour_core::{Model, Result, Row, Value};
use ormtour_query::{InsertBuilder, Statement};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::{
    Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};

/// Where an object stands relative to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    /// Not in any session and not known to be in the database.
    Transient,
    /// Added to a session, waiting to be inserted by the next flush.
    Pending,
    /// Present in the database and in a session's identity map.
    Persistent,
    /// Was persistent, but its session has been closed or it was expunged.
    Detached,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectState::Transient => "transient",
            ObjectState::Pending => "pending",
            ObjectState::Persistent => "persistent",
            ObjectState::Detached => "detached",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
struct Attachment {
    state: ObjectState,
    session: Option<u64>,
}

struct Shared<M> {
    model: RwLock<M>,
    attachment: Mutex<Attachment>,
}

impl<M> Shared<M> {
    fn attachment(&self) -> Attachment {
        *self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, M> {
        self.model.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, M> {
        self.model.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_write(&self) -> Option<RwLockWriteGuard<'_, M>> {
        match self.model.try_write() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

/// A shared, lockable model object.
///
/// ```ignore
/// let user = Instance::new(User { id: None, name: "user3".into(), .. });
/// session.add(&user)?;
/// session.flush()?;
/// assert!(user.read().id.is_some());
/// ```
pub struct Instance<M: Model> {
    shared: Arc<Shared<M>>,
}

impl<M: Model> Instance<M> {
    /// Wrap a model object; the new instance is transient.
    pub fn new(model: M) -> Self {
        Self {
            shared: Arc::new(Shared {
                model: RwLock::new(model),
                attachment: Mutex::new(Attachment {
                    state: ObjectState::Transient,
                    session: None,
                }),
            }),
        }
    }

    /// Borrow the fields.
    ///
    /// Do not hold the guard across a session call: a flush that writes
    /// back generated keys blocks until it is released, and a query that
    /// would refresh this object fails with `InstanceLocked`.
    pub fn read(&self) -> RwLockReadGuard<'_, M> {
        self.shared.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, M> {
        self.shared.write()
    }

    /// The write guard, or `None` while another guard is held.
    pub(crate) fn try_write(&self) -> Option<RwLockWriteGuard<'_, M>> {
        self.shared.try_write()
    }

    /// A copy of the current field values.
    pub fn get(&self) -> M
    where
        M: Clone,
    {
        self.read().clone()
    }

    pub fn state(&self) -> ObjectState {
        self.shared.attachment().state
    }

    /// The primary key, once every key column has a value.
    pub fn primary_key(&self) -> Option<Vec<Value>> {
        self.read().identity()
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn erased(&self) -> Arc<dyn Tracked> {
        Arc::clone(&self.shared) as Arc<dyn Tracked>
    }

    /// Recover the typed handle, if `object` holds an `M`.
    pub(crate) fn from_erased(object: &Arc<dyn Tracked>) -> Option<Self> {
        Arc::clone(object)
            .into_any()
            .downcast::<Shared<M>>()
            .ok()
            .map(|shared| Self { shared })
    }
}

impl<M: Model> Clone for Instance<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: Model> From<M> for Instance<M> {
    fn from(model: M) -> Self {
        Self::new(model)
    }
}

impl<M: Model + fmt::Debug> fmt::Debug for Instance<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("state", &self.state())
            .field("model", &*self.read())
            .finish()
    }
}

/// The type-erased view a session keeps of each object.
pub(crate) trait Tracked: Send + Sync {
    fn table(&self) -> &'static str;
    fn primary_key_columns(&self) -> &'static [&'static str];
    fn state(&self) -> ObjectState;
    fn session_id(&self) -> Option<u64>;
    fn set_state(&self, state: ObjectState, session: Option<u64>);
    /// Current column values.
    fn values(&self) -> Vec<(&'static str, Value)>;
    fn identity(&self) -> Option<Vec<Value>>;
    /// `INSERT .. RETURNING *` for the current field values.
    fn insert_statement(&self) -> (String, Vec<Value>);
    /// Decode a database row without touching the object.
    fn decode(&self, row: &Row) -> Result<Box<dyn Any + Send>>;
    /// Overwrite the fields with a value produced by `decode`.
    fn apply(&self, decoded: Box<dyn Any + Send>);
    fn clear_primary_key(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Model> Tracked for Shared<M> {
    fn table(&self) -> &'static str {
        M::TABLE_NAME
    }

    fn primary_key_columns(&self) -> &'static [&'static str] {
        M::PRIMARY_KEY
    }

    fn state(&self) -> ObjectState {
        self.attachment().state
    }

    fn session_id(&self) -> Option<u64> {
        self.attachment().session
    }

    fn set_state(&self, state: ObjectState, session: Option<u64>) {
        let mut attachment = self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        attachment.state = state;
        attachment.session = session;
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        self.read().to_row()
    }

    fn identity(&self) -> Option<Vec<Value>> {
        self.read().identity()
    }

    fn insert_statement(&self) -> (String, Vec<Value>) {
        let model = self.read();
        let insert = InsertBuilder::new(&*model).returning();
        insert.build()
    }

    fn decode(&self, row: &Row) -> Result<Box<dyn Any + Send>> {
        Ok(Box::new(M::from_row(row)?))
    }

    fn apply(&self, decoded: Box<dyn Any + Send>) {
        if let Ok(model) = decoded.downcast::<M>() {
            *self.write() = *model;
        }
    }

    fn clear_primary_key(&self) {
        self.write().clear_primary_key();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Whether two erased handles point at the same object.
pub(crate) fn same_object(a: &Arc<dyn Tracked>, b: &Arc<dyn Tracked>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormtour_macros::Model;

    #[derive(Model, Debug, Clone, PartialEq)]
    struct Tag {
        #[orm(primary_key, auto_increment)]
        id: Option<i64>,
        label: String,
    }

    #[derive(Model, Debug, Clone)]
    struct Note {
        #[orm(primary_key, auto_increment)]
        id: Option<i64>,
    }

    fn tag(label: &str) -> Instance<Tag> {
        Instance::new(Tag {
            id: None,
            label: label.to_string(),
        })
    }

    #[test]
    fn test_clones_share_the_object() {
        let a = tag("rust");
        let b = a.clone();
        b.write().label = "sql".to_string();
        assert_eq!(a.read().label, "sql");
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&tag("sql")));
    }

    #[test]
    fn test_new_instance_is_transient() {
        let a = tag("rust");
        assert_eq!(a.state(), ObjectState::Transient);
        assert!(a.primary_key().is_none());
        a.write().id = Some(7);
        assert_eq!(a.primary_key(), Some(vec![Value::BigInt(7)]));
    }

    #[test]
    fn test_erased_round_trip_keeps_identity() {
        let a = tag("rust");
        let erased = a.erased();
        let back = Instance::<Tag>::from_erased(&erased).unwrap();
        assert!(back.ptr_eq(&a));
        assert!(Instance::<Note>::from_erased(&erased).is_none());
        assert!(same_object(&erased, &back.erased()));
    }

    #[test]
    fn test_decode_then_apply() {
        let a = tag("old");
        let erased = a.erased();
        let row = Row::new(
            vec!["id".into(), "label".into()],
            vec![Value::BigInt(3), Value::Text("new".into())],
        );
        let decoded = erased.decode(&row).unwrap();
        assert_eq!(a.read().label, "old");
        erased.apply(decoded);
        assert_eq!(
            a.get(),
            Tag {
                id: Some(3),
                label: "new".into()
            }
        );
        erased.clear_primary_key();
        assert!(a.read().id.is_none());
    }

    #[test]
    fn test_insert_statement_returns_row() {
        let (sql, params) = tag("rust").erased().insert_statement();
        assert_eq!(sql, "INSERT INTO \"tag\" (\"label\") VALUES (?1) RETURNING *");
        assert_eq!(params, vec![Value::Text("rust".into())]);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(ObjectState::Persistent.to_string(), "persistent");
        let json = serde_json::to_string(&ObjectState::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }
}
