//! Types shared by the interner, the registry tables and the handle

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// An object a resource identifier can refer to.
///
/// The registry only ever keeps a `Weak` to it, so binding never extends the
/// object's lifetime.
pub type Referent = Arc<dyn Any + Send + Sync>;

/// Raw value fed to the key interner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawKey {
    /// A resource id string.
    Text(String),
    /// An integer, usually an object identity standing in for a value with no
    /// string form.
    Int(u64),
}

impl RawKey {
    /// Raw key derived from the identity of a shared object.
    pub fn of<T: ?Sized>(object: &Arc<T>) -> Self {
        Self::from(ObjectId::of(object))
    }

    /// The id string, if this key is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawKey::Text(text) => Some(text),
            RawKey::Int(_) => None,
        }
    }
}

impl fmt::Display for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawKey::Text(text) => write!(f, "{text:?}"),
            RawKey::Int(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for RawKey {
    fn from(value: &str) -> Self {
        RawKey::Text(value.to_owned())
    }
}

impl From<String> for RawKey {
    fn from(value: String) -> Self {
        RawKey::Text(value)
    }
}

impl From<&String> for RawKey {
    fn from(value: &String) -> Self {
        RawKey::Text(value.clone())
    }
}

impl From<u64> for RawKey {
    fn from(value: u64) -> Self {
        RawKey::Int(value)
    }
}

impl From<ObjectId> for RawKey {
    fn from(value: ObjectId) -> Self {
        RawKey::Int(value.0 as u64)
    }
}

/// Identity of a bound object: the address of its shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Identity of the allocation behind `object`.
    pub fn of<T: ?Sized>(object: &Arc<T>) -> Self {
        Self(Arc::as_ptr(object) as *const () as usize)
    }

    /// Raw address value.
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Key of one binding act: which object was bound under which id string.
///
/// Several objects bound to the same id over time each get their own key, so
/// the object map can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub object: ObjectId,
    pub id: String,
}

impl CompositeKey {
    pub fn new(object: ObjectId, id: impl Into<String>) -> Self {
        Self {
            object,
            id: id.into(),
        }
    }
}

/// Fresh random token used for generated ids.
pub(crate) fn fresh_token() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_ignores_pointer_metadata() {
        let concrete = Arc::new(42u32);
        let erased: Referent = concrete.clone();
        assert_eq!(ObjectId::of(&concrete), ObjectId::of(&erased));
    }

    #[test]
    fn raw_key_conversions() {
        assert_eq!(RawKey::from("a"), RawKey::Text("a".into()));
        assert_eq!(RawKey::from(7u64), RawKey::Int(7));
        assert_eq!(RawKey::from("a").as_text(), Some("a"));
        assert_eq!(RawKey::Int(3).as_text(), None);

        let object = Arc::new("parent");
        assert_eq!(
            RawKey::of(&object),
            RawKey::Int(ObjectId::of(&object).as_usize() as u64)
        );
    }

    #[test]
    fn fresh_tokens_are_unique() {
        assert_ne!(fresh_token(), fresh_token());
    }
}
