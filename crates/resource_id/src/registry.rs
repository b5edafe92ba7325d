//! Resource identifier registry
//!
//! Three coordinated tables, all weak with respect to what they point at:
//!
//! * the object map, `CompositeKey -> Weak<object>`;
//! * the assignment order, `ResourceKey -> [CompositeKey]`, most recent last;
//! * the parent scope tree, `ParentKey -> ResourceKey -> CompositeKey`.
//!
//! Dead rows are evicted when a read trips over them and by a periodic sweep
//! driven from [`Registry::bind`]. Upgraded referents are always released
//! after the table lock has been dropped, so no object's `Drop` ever runs
//! while the registry is locked.

use crate::config::RegistryConfig;
use crate::handle::{BoundObject, IdentifierHandle};
use crate::interner::{KeyId, ResourceKey, WeakResourceKey};
use crate::notice::{self, Notice};
use crate::resolution::HookRegistry;
use crate::types::{CompositeKey, ObjectId, Referent};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

static GLOBAL: Lazy<Registry> = Lazy::new(|| Registry::with_config(RegistryConfig::from_env()));

#[derive(Debug, Default)]
pub(crate) struct ObjectMap {
    rows: HashMap<CompositeKey, Weak<dyn Any + Send + Sync>>,
}

impl ObjectMap {
    /// Upgrade the row for `composite`, evicting it if its object is gone.
    pub(crate) fn lookup(&mut self, composite: &CompositeKey) -> Option<Referent> {
        let live = self.rows.get(composite)?.upgrade();
        if live.is_none() {
            trace!(id = %composite.id, object = %composite.object, "evicting dead object row");
            self.rows.remove(composite);
        }
        live
    }

    fn insert(&mut self, composite: CompositeKey, object: &Referent) {
        self.rows.insert(composite, Arc::downgrade(object));
    }

    fn is_live(&self, composite: &CompositeKey) -> bool {
        self.rows
            .get(composite)
            .is_some_and(|row| row.strong_count() > 0)
    }
}

#[derive(Debug)]
pub(crate) struct AssignmentOrder {
    key: WeakResourceKey,
    pub(crate) history: Vec<CompositeKey>,
}

#[derive(Debug)]
pub(crate) struct ScopedEntry {
    key: WeakResourceKey,
    pub(crate) composite: CompositeKey,
}

#[derive(Debug)]
pub(crate) struct ParentScope {
    parent: WeakResourceKey,
    pub(crate) members: HashMap<KeyId, ScopedEntry>,
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) objects: ObjectMap,
    pub(crate) order: HashMap<KeyId, AssignmentOrder>,
    pub(crate) scopes: HashMap<KeyId, ParentScope>,
    inserts_since_sweep: usize,
    live_after_sweep: usize,
}

impl Tables {
    /// The object a bind would displace: the handle's own binding, else the
    /// last object assigned to its resource key.
    fn displaced(&mut self, bound: Option<ObjectId>, id: &str, key: &ResourceKey) -> Option<Referent> {
        if let Some(object) = bound.and_then(|object| self.objects.lookup(&CompositeKey::new(object, id))) {
            return Some(object);
        }
        let last = self.order.get(&key.id())?.history.last()?.clone();
        self.objects.lookup(&last)
    }

    fn scope(&mut self, parent: &ResourceKey, key: &ResourceKey, composite: CompositeKey) {
        let scope = self
            .scopes
            .entry(parent.id())
            .or_insert_with(|| ParentScope {
                parent: parent.downgrade(),
                members: HashMap::new(),
            });
        scope.members.insert(
            key.id(),
            ScopedEntry {
                key: key.downgrade(),
                composite,
            },
        );
    }

    fn push_order(&mut self, key: &ResourceKey, composite: CompositeKey) {
        self.order
            .entry(key.id())
            .or_insert_with(|| AssignmentOrder {
                key: key.downgrade(),
                history: Vec::new(),
            })
            .history
            .push(composite);
    }

    fn maybe_sweep(&mut self, threshold: usize) {
        self.inserts_since_sweep += 1;
        if self.inserts_since_sweep >= threshold.max(self.live_after_sweep) {
            self.sweep();
        }
    }

    fn sweep(&mut self) -> usize {
        let before = self.row_count();
        self.inserts_since_sweep = 0;

        let Tables {
            objects,
            order,
            scopes,
            ..
        } = self;

        objects.rows.retain(|_, row| row.strong_count() > 0);

        order.retain(|_, row| {
            row.history.retain(|composite| objects.is_live(composite));
            row.key.is_alive() && !row.history.is_empty()
        });

        scopes.retain(|_, scope| {
            scope.members.retain(|_, entry| {
                entry.key.is_alive() && objects.is_live(&entry.composite)
            });
            scope.parent.is_alive() && !scope.members.is_empty()
        });

        self.live_after_sweep = self.objects.rows.len();
        let removed = before.saturating_sub(self.row_count());
        trace!(removed, "swept dead registry rows");
        removed
    }

    fn row_count(&self) -> usize {
        self.objects.rows.len()
            + self.order.values().map(|row| row.history.len()).sum::<usize>()
            + self.scopes.values().map(|scope| scope.members.len()).sum::<usize>()
    }
}

/// Sizes of the registry tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Rows in the object map
    pub objects: usize,
    /// Resource keys with an assignment history
    pub resource_keys: usize,
    /// Total entries across all assignment histories
    pub assignments: usize,
    /// Parent keys in the scope tree
    pub parent_scopes: usize,
    /// Total scoped entries across all parents
    pub scoped_entries: usize,
    /// Registered resolution hooks
    pub hooks: usize,
}

/// Resource identifier registry.
///
/// [`Registry::global`] is the process-wide instance used by the convenience
/// methods on [`IdentifierHandle`]. Separate instances share the process-wide
/// key interner but nothing else.
#[derive(Debug)]
pub struct Registry {
    tables: Mutex<Tables>,
    pub(crate) hooks: HookRegistry,
    config: RegistryConfig,
}

impl Registry {
    /// Empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Empty registry using `config`.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            hooks: HookRegistry::new(),
            config,
        }
    }

    /// The process-wide registry, configured from the environment.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Configuration this registry was created with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Bind `object` to `handle`.
    ///
    /// A `parent` replaces the handle's parent key. With `warn` set, binding
    /// an object other than the last one known under this id emits
    /// [`Notice::RebindingConflict`]. Objects are compared by identity, so
    /// binding an equal but distinct copy also counts as a conflict.
    pub fn bind(
        &self,
        handle: &IdentifierHandle,
        object: &Referent,
        warn: bool,
        parent: Option<ResourceKey>,
    ) {
        let identity = ObjectId::of(object);
        let id = handle.id();
        let key = handle.resource_key();

        let mut binding = handle.binding.lock();
        let replaced_parent = match parent {
            Some(parent) => binding.parent.replace(parent),
            None => None,
        };

        let displaced = {
            let mut tables = self.tables.lock();
            let bound = binding.object.as_ref().map(|bound| bound.identity);
            let displaced = tables.displaced(bound, id, key);
            binding.object = Some(BoundObject::new(object));

            let composite = CompositeKey::new(identity, id);
            if let Some(parent) = &binding.parent {
                tables.scope(parent, key, composite.clone());
            }
            tables.objects.insert(composite.clone(), object);
            tables.push_order(key, composite);
            tables.maybe_sweep(self.config.sweep_threshold);
            displaced
        };
        drop(binding);
        drop(replaced_parent);

        debug!(id, object = %identity, "bound object to resource id");

        let conflicting = displaced.is_some_and(|old| ObjectId::of(&old) != identity);
        if warn && self.config.warn_on_rebind && conflicting {
            notice::emit(Notice::RebindingConflict { id: id.to_owned() });
        }
    }

    /// Evict every row whose key, parent or object is gone. Returns the
    /// number of rows removed.
    pub fn purge(&self) -> usize {
        self.tables.lock().sweep()
    }

    /// Current table sizes, dead rows included.
    pub fn stats(&self) -> RegistryStats {
        let tables = self.tables.lock();
        RegistryStats {
            objects: tables.objects.rows.len(),
            resource_keys: tables.order.len(),
            assignments: tables.order.values().map(|row| row.history.len()).sum(),
            parent_scopes: tables.scopes.len(),
            scoped_entries: tables.scopes.values().map(|scope| scope.members.len()).sum(),
            hooks: self.hooks.len(),
        }
    }

    pub(crate) fn tables(&self) -> parking_lot::MutexGuard<'_, Tables> {
        self.tables.lock()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
