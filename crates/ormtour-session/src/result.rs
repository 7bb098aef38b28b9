//! Typed query results.

use crate::instance::Instance;
use ormtour_core::error::{SessionError, SessionErrorKind};
use ormtour_core::{Error, Model, Result};

/// Objects returned by [`Session::scalars`](crate::Session::scalars).
pub struct ScalarResult<M: Model> {
    items: Vec<Instance<M>>,
}

impl<M: Model> ScalarResult<M> {
    pub(crate) fn new(items: Vec<Instance<M>>) -> Self {
        Self { items }
    }

    pub fn first(&self) -> Option<Instance<M>> {
        self.items.first().cloned()
    }

    /// The only object; anything other than exactly one is an error.
    pub fn one(&self) -> Result<Instance<M>> {
        match self.items.as_slice() {
            [only] => Ok(only.clone()),
            items => Err(Error::Session(SessionError {
                kind: SessionErrorKind::ResultCount,
                message: format!("Expected exactly one row, found {}", items.len()),
            })),
        }
    }

    pub fn all(self) -> Vec<Instance<M>> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance<M>> {
        self.items.iter()
    }
}

impl<M: Model> IntoIterator for ScalarResult<M> {
    type Item = Instance<M>;
    type IntoIter = std::vec::IntoIter<Instance<M>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<M: Model + std::fmt::Debug> std::fmt::Debug for ScalarResult<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.items).finish()
    }
}
