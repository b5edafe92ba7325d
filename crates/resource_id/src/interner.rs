//! Process-wide key interner
//!
//! Every distinct raw value maps to at most one live [`ResourceKey`]. The
//! intern table only holds `Weak` references; when the last strong reference
//! to a key goes away, the key removes its own row and the next
//! [`intern`] call for the same raw value creates a fresh key.

use crate::types::RawKey;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static INTERNER: Lazy<Mutex<HashMap<RawKey, Weak<KeyInner>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique serial of an interned key. Serials are never reused, so a
/// table row keyed by a dead key's serial can never be confused with a row
/// for a later key created from the same raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u64);

#[derive(Debug)]
struct KeyInner {
    raw: RawKey,
    id: KeyId,
}

impl Drop for KeyInner {
    fn drop(&mut self) {
        let mut table = INTERNER.lock();
        // A fresh key for the same raw value may already occupy the row.
        if table
            .get(&self.raw)
            .is_some_and(|slot| slot.strong_count() == 0)
        {
            table.remove(&self.raw);
        }
    }
}

/// Interned, shared key. Clones are the same instance.
#[derive(Clone)]
pub struct ResourceKey(Arc<KeyInner>);

impl ResourceKey {
    pub fn raw(&self) -> &RawKey {
        &self.0.raw
    }

    pub fn id(&self) -> KeyId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &ResourceKey) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakResourceKey {
        WeakResourceKey {
            inner: Arc::downgrade(&self.0),
        }
    }
}

impl PartialEq for ResourceKey {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ResourceKey {}

impl Hash for ResourceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceKey")
            .field("raw", &self.0.raw)
            .field("id", &self.0.id)
            .finish()
    }
}

/// Non-owning observer of a [`ResourceKey`], used by the registry tables.
#[derive(Debug, Clone)]
pub(crate) struct WeakResourceKey {
    inner: Weak<KeyInner>,
}

impl WeakResourceKey {
    pub(crate) fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

/// Return the live key for `raw`, creating it if none exists.
pub fn intern(raw: impl Into<RawKey>) -> ResourceKey {
    let raw = raw.into();
    let mut table = INTERNER.lock();
    if let Some(existing) = table.get(&raw).and_then(Weak::upgrade) {
        return ResourceKey(existing);
    }

    let key = Arc::new(KeyInner {
        raw: raw.clone(),
        id: KeyId(NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed)),
    });
    table.insert(raw, Arc::downgrade(&key));
    ResourceKey(key)
}

/// Whether a live key currently exists for `raw`.
pub fn is_interned(raw: &RawKey) -> bool {
    INTERNER
        .lock()
        .get(raw)
        .is_some_and(|slot| slot.strong_count() > 0)
}

/// Number of live interned keys.
pub fn live_keys() -> usize {
    INTERNER
        .lock()
        .values()
        .filter(|slot| slot.strong_count() > 0)
        .count()
}
