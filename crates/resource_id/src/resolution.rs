//! Resolution of resource identifiers to objects
//!
//! Lookup order, first hit wins:
//!
//! 1. the handle's own binding in the object map;
//! 2. the binding recorded for its resource key under its parent scope;
//! 3. the most recently bound live object with the same id;
//! 4. registered resolver hooks, in registration order.
//!
//! Only a hook's answer becomes the handle's binding. Hits from steps 2 and 3
//! are not recorded on the handle, so a later rebind under the same id is
//! seen by every unbound handle. Hooks run with no registry lock held, so
//! they may use the registry themselves.

use crate::handle::{BoundObject, IdentifierHandle};
use crate::interner::ResourceKey;
use crate::notice::{self, Notice};
use crate::registry::{Registry, Tables};
use crate::types::{CompositeKey, Referent};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

type HookFn = dyn Fn(&str) -> Option<Referent> + Send + Sync;

/// External resolver consulted when the registry has nothing for an id.
///
/// Clones compare equal to each other and can be used to remove the hook.
#[derive(Clone)]
pub struct ResolverHook(Arc<HookFn>);

impl ResolverHook {
    /// Wrap a resolver function.
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn(&str) -> Option<Referent> + Send + Sync + 'static,
    {
        Self(Arc::new(resolve))
    }

    /// Ask the hook for the object named `id`.
    pub fn call(&self, id: &str) -> Option<Referent> {
        (self.0)(id)
    }

    /// Whether both values wrap the same registered function.
    pub fn same_as(&self, other: &ResolverHook) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl PartialEq for ResolverHook {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for ResolverHook {}

impl fmt::Debug for ResolverHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolverHook({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// Ordered list of resolver hooks.
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<ResolverHook>>,
}

impl HookRegistry {
    /// Empty hook list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `hook` after every hook already registered.
    pub fn register(&self, hook: ResolverHook) {
        self.hooks.write().push(hook);
    }

    /// Remove the first registration of `hook`, or every hook when `None`.
    /// Returns whether anything was removed.
    pub fn remove(&self, hook: Option<&ResolverHook>) -> bool {
        let mut hooks = self.hooks.write();
        match hook {
            Some(hook) => match hooks.iter().position(|registered| registered.same_as(hook)) {
                Some(index) => {
                    hooks.remove(index);
                    true
                }
                None => false,
            },
            None => {
                let removed = !hooks.is_empty();
                hooks.clear();
                removed
            }
        }
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Whether no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    fn snapshot(&self) -> Vec<ResolverHook> {
        self.hooks.read().clone()
    }
}

impl Tables {
    /// Object bound to `key` within `parent`, provided the recorded binding
    /// was made under the same id string.
    fn scoped(&mut self, parent: &ResourceKey, key: &ResourceKey, id: &str) -> Option<Referent> {
        let composite = self
            .scopes
            .get(&parent.id())?
            .members
            .get(&key.id())?
            .composite
            .clone();
        if composite.id != id {
            return None;
        }
        self.objects.lookup(&composite)
    }

    /// Newest live object assigned to `key` under the same id string. Stale
    /// entries found on the way are popped.
    fn newest(&mut self, key: &ResourceKey, id: &str) -> Option<Referent> {
        let Tables { objects, order, .. } = self;
        let history = &mut order.get_mut(&key.id())?.history;
        while let Some(composite) = history.last() {
            if composite.id == id {
                if let Some(object) = objects.lookup(composite) {
                    return Some(object);
                }
            }
            trace!(id, object = %composite.object, "popping stale assignment");
            history.pop();
        }
        None
    }
}

/// Clear the handle's binding if it still names `bound` and that object is
/// gone. A binding that is alive but unknown to the queried registry is kept.
fn forget_dead_binding(handle: &IdentifierHandle, bound: BoundObject) -> Option<BoundObject> {
    if bound.is_alive() {
        return None;
    }
    let mut binding = handle.binding.lock();
    let unchanged = binding
        .object
        .as_ref()
        .is_some_and(|current| current.identity == bound.identity && !current.is_alive());
    if unchanged {
        binding.object.take()
    } else {
        None
    }
}

impl Registry {
    /// Object `handle` refers to, if any can be found.
    pub fn resolve(&self, handle: &IdentifierHandle) -> Option<Referent> {
        let id = handle.id();
        let key = handle.resource_key();
        let (bound, parent) = {
            let binding = handle.binding.lock();
            (binding.object.clone(), binding.parent.clone())
        };

        let found = {
            let mut tables = self.tables();
            if let Some(object) = bound
                .as_ref()
                .and_then(|bound| tables.objects.lookup(&CompositeKey::new(bound.identity, id)))
            {
                return Some(object);
            }
            parent
                .as_ref()
                .and_then(|parent| tables.scoped(parent, key, id))
                .or_else(|| tables.newest(key, id))
        };
        drop(parent);

        if let Some(lost) = bound.and_then(|bound| forget_dead_binding(handle, bound)) {
            notice::emit(Notice::LivenessLost {
                id: id.to_owned(),
                object: lost.identity,
            });
        }

        if found.is_some() {
            return found;
        }

        for hook in self.hooks.snapshot() {
            if let Some(object) = hook.call(id) {
                debug!(id, ?hook, "resolver hook supplied object");
                self.bind(handle, &object, false, None);
                return Some(object);
            }
        }

        None
    }

    /// [`Registry::resolve`] downcast to a concrete type.
    pub fn resolve_as<T>(&self, handle: &IdentifierHandle) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolve(handle)?.downcast::<T>().ok()
    }

    /// Register a hook consulted after the registry's own tables.
    pub fn register_hook(&self, hook: ResolverHook) {
        self.hooks.register(hook);
    }

    /// See [`HookRegistry::remove`].
    pub fn remove_hook(&self, hook: Option<&ResolverHook>) -> bool {
        self.hooks.remove(hook)
    }
}
