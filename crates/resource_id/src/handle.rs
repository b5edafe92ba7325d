//! Resource identifier handle
//!
//! An [`IdentifierHandle`] names a resource by an id string and resolves to
//! the object bound under that id anywhere in the process, for as long as
//! that object is alive. Handles compare and hash as their id string.

use crate::errors::{ResourceIdError, Result};
use crate::interner::{intern, ResourceKey};
use crate::notice::{self, Notice};
use crate::registry::Registry;
use crate::resolution::ResolverHook;
use crate::types::{fresh_token, ObjectId, RawKey, Referent};
use crate::uri;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Where a handle's id string comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    /// An explicit id.
    Fixed { id: String },
    /// `prefix` joined with a random token generated once.
    Generated { prefix: String, token: String },
}

impl IdSource {
    fn render(&self) -> String {
        match self {
            IdSource::Fixed { id } => id.clone(),
            IdSource::Generated { prefix, token } => {
                let mut id = prefix.clone();
                if !id.ends_with('/') {
                    id.push('/');
                }
                id.push_str(token);
                id
            }
        }
    }
}

/// Object a handle was last bound to, observed without keeping it alive.
#[derive(Debug, Clone)]
pub(crate) struct BoundObject {
    pub(crate) identity: ObjectId,
    referent: Weak<dyn Any + Send + Sync>,
}

impl BoundObject {
    pub(crate) fn new(object: &Referent) -> Self {
        Self {
            identity: ObjectId::of(object),
            referent: Arc::downgrade(object),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.referent.strong_count() > 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct Binding {
    pub(crate) object: Option<BoundObject>,
    pub(crate) parent: Option<ResourceKey>,
}

/// Unique identifier referring to a resource.
///
/// Any handle constructed with the same id resolves to the object most
/// relevant to it: its own binding, the binding made within its parent
/// scope, or the newest live object bound under that id.
///
/// ```
/// use quakeml_resource_id::{IdentifierHandle, Referent};
/// use std::sync::Arc;
///
/// let event: Referent = Arc::new("event payload".to_string());
/// let original = IdentifierHandle::new("smi:doc.example/event/1");
/// original.bind(&event);
///
/// let elsewhere = IdentifierHandle::new("smi:doc.example/event/1");
/// assert_eq!(elsewhere, original);
/// assert!(elsewhere.resolve_as::<String>().is_some());
/// ```
#[derive(Serialize, Deserialize)]
#[serde(from = "IdSource", into = "IdSource")]
pub struct IdentifierHandle {
    source: IdSource,
    id: String,
    key: ResourceKey,
    pub(crate) binding: Mutex<Binding>,
}

impl IdentifierHandle {
    /// Handle with a fixed id.
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_parts(IdSource::Fixed { id: id.into() }, None)
    }

    /// Handle with a generated id under the configured default prefix.
    pub fn generated() -> Self {
        Self::with_prefix(Registry::global().config().default_prefix.clone())
    }

    /// Handle with a generated id under `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::from_parts(
            IdSource::Generated {
                prefix: prefix.into(),
                token: fresh_token(),
            },
            None,
        )
    }

    /// Start building a handle.
    pub fn builder() -> HandleBuilder {
        HandleBuilder::default()
    }

    /// Copy of `other` including its parent scope.
    pub fn from_handle(other: &IdentifierHandle) -> Self {
        let binding = other.binding.lock();
        Self {
            source: other.source.clone(),
            id: other.id.clone(),
            key: other.key.clone(),
            binding: Mutex::new(Binding {
                object: binding.object.clone(),
                parent: binding.parent.clone(),
            }),
        }
    }

    fn from_parts(source: IdSource, parent: Option<ResourceKey>) -> Self {
        let id = source.render();
        let key = intern(id.as_str());
        Self {
            source,
            id,
            key,
            binding: Mutex::new(Binding {
                object: None,
                parent,
            }),
        }
    }

    /// The full id string.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Where the id string comes from.
    pub fn source(&self) -> &IdSource {
        &self.source
    }

    /// Whether the id was given explicitly.
    pub fn is_fixed(&self) -> bool {
        matches!(self.source, IdSource::Fixed { .. })
    }

    /// Prefix of a generated id.
    pub fn prefix(&self) -> Option<&str> {
        match &self.source {
            IdSource::Generated { prefix, .. } => Some(prefix),
            IdSource::Fixed { .. } => None,
        }
    }

    /// Random token of a generated id.
    pub fn token(&self) -> Option<&str> {
        match &self.source {
            IdSource::Generated { token, .. } => Some(token),
            IdSource::Fixed { .. } => None,
        }
    }

    /// Interned key shared by every handle with this id.
    pub fn resource_key(&self) -> &ResourceKey {
        &self.key
    }

    /// Key of the parent scope, if any.
    pub fn parent(&self) -> Option<ResourceKey> {
        self.binding.lock().parent.clone()
    }

    /// Identity of the object this handle was last bound to.
    pub fn object_id(&self) -> Option<ObjectId> {
        self.binding.lock().object.as_ref().map(|bound| bound.identity)
    }

    /// Replace the id, making the handle fixed.
    ///
    /// The handle is re-interned under the new id and forgets its bound
    /// object. Hashed collections keyed by the old id will no longer find it,
    /// so this emits [`Notice::UnstableId`].
    pub fn set_id(&mut self, value: impl Into<RawKey>) -> Result<()> {
        let id = match value.into() {
            RawKey::Text(id) => id,
            other => {
                return Err(ResourceIdError::InvalidIdType {
                    found: other.to_string(),
                })
            }
        };
        notice::emit(Notice::UnstableId {
            previous: self.id.clone(),
            id: id.clone(),
        });
        self.source = IdSource::Fixed { id };
        self.rekey();
        Ok(())
    }

    /// Change the prefix of a generated id. Fixed ids are left untouched.
    pub fn set_prefix(&mut self, value: impl Into<String>) {
        let IdSource::Generated { prefix, .. } = &mut self.source else {
            return;
        };
        *prefix = value.into();
        let previous = std::mem::take(&mut self.id);
        self.rekey();
        notice::emit(Notice::UnstableId {
            previous,
            id: self.id.clone(),
        });
    }

    /// Drop the prefix of a generated id.
    pub fn clear_prefix(&mut self) {
        self.set_prefix("");
    }

    /// Always fails: a handle cannot lose its id.
    pub fn clear_id(&mut self) -> Result<()> {
        Err(ResourceIdError::ImmutableAttributeViolation {
            attribute: "id",
            action: "deleted",
        })
    }

    /// Always fails: tokens are generated once.
    pub fn set_token(&mut self, _token: impl Into<String>) -> Result<()> {
        Err(ResourceIdError::ImmutableAttributeViolation {
            attribute: "token",
            action: "set manually",
        })
    }

    /// Always fails: tokens cannot be removed.
    pub fn clear_token(&mut self) -> Result<()> {
        Err(ResourceIdError::ImmutableAttributeViolation {
            attribute: "token",
            action: "deleted",
        })
    }

    fn rekey(&mut self) {
        self.id = self.source.render();
        self.key = intern(self.id.as_str());
        self.binding.get_mut().object = None;
    }

    /// Bind `object` in the global registry, warning on conflicting
    /// rebinds.
    pub fn bind(&self, object: &Referent) {
        Registry::global().bind(self, object, true, None);
    }

    /// Bind `object` in the global registry; `parent` rescopes the handle.
    pub fn bind_with(&self, object: &Referent, warn: bool, parent: Option<ResourceKey>) {
        Registry::global().bind(self, object, warn, parent);
    }

    /// Object this handle refers to in the global registry.
    pub fn resolve(&self) -> Option<Referent> {
        Registry::global().resolve(self)
    }

    /// [`IdentifierHandle::resolve`] downcast to a concrete type.
    pub fn resolve_as<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        Registry::global().resolve_as(self)
    }

    /// The id formatted as a standard resource URI. `None` uses the
    /// configured default authority.
    pub fn to_standard_uri(&self, authority: Option<&str>) -> Result<String> {
        let config = Registry::global().config();
        uri::standardize(&self.id, authority.unwrap_or(&config.default_authority))
    }

    /// New handle whose id is the standard URI of this one, bound to the
    /// same object in the global registry.
    pub fn to_standard_handle(&self, authority: Option<&str>) -> Result<IdentifierHandle> {
        Registry::global().standard_handle(self, authority)
    }

    /// Register a resolver hook with the global registry.
    pub fn register_hook(hook: ResolverHook) {
        Registry::global().register_hook(hook);
    }

    /// Remove a resolver hook from the global registry.
    pub fn remove_hook(hook: Option<&ResolverHook>) -> bool {
        Registry::global().remove_hook(hook)
    }
}

impl Registry {
    /// New handle whose id is the standard URI of `handle`, bound to the
    /// object `handle` currently resolves to, in the same parent scope.
    pub fn standard_handle(
        &self,
        handle: &IdentifierHandle,
        authority: Option<&str>,
    ) -> Result<IdentifierHandle> {
        let authority = authority.unwrap_or(&self.config().default_authority);
        let standard = IdentifierHandle::new(uri::standardize(handle.id(), authority)?);
        if let Some(object) = self.resolve(handle) {
            self.bind(&standard, &object, false, handle.parent());
        }
        Ok(standard)
    }
}

/// Step-by-step construction of an [`IdentifierHandle`].
#[derive(Debug, Default)]
pub struct HandleBuilder {
    id: Option<String>,
    prefix: Option<String>,
    parent: Option<ResourceKey>,
    object: Option<Referent>,
}

impl HandleBuilder {
    /// Fixed id. Without one, an id is generated from the prefix.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Prefix for a generated id.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Parent scope named by its raw key.
    pub fn parent(mut self, parent: impl Into<RawKey>) -> Self {
        self.parent = Some(intern(parent));
        self
    }

    /// Parent scope given as an interned key.
    pub fn parent_key(mut self, parent: ResourceKey) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Object to bind as soon as the handle exists.
    pub fn object(mut self, object: Referent) -> Self {
        self.object = Some(object);
        self
    }

    /// Build against the global registry.
    pub fn build(self) -> IdentifierHandle {
        self.build_in(Registry::global())
    }

    /// Build against `registry`, binding the initial object there.
    pub fn build_in(self, registry: &Registry) -> IdentifierHandle {
        let source = match self.id {
            Some(id) => IdSource::Fixed { id },
            None => IdSource::Generated {
                prefix: self
                    .prefix
                    .unwrap_or_else(|| registry.config().default_prefix.clone()),
                token: fresh_token(),
            },
        };
        let handle = IdentifierHandle::from_parts(source, self.parent);
        if let Some(object) = &self.object {
            registry.bind(&handle, object, true, None);
        }
        handle
    }
}

/// Copies keep the resource key and bound object but not the parent scope.
impl Clone for IdentifierHandle {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            id: self.id.clone(),
            key: self.key.clone(),
            binding: Mutex::new(Binding {
                object: self.binding.lock().object.clone(),
                parent: None,
            }),
        }
    }
}

/// Restores re-intern the key; parent scope and bound object are
/// process-local and start out empty.
impl From<IdSource> for IdentifierHandle {
    fn from(source: IdSource) -> Self {
        Self::from_parts(source, None)
    }
}

impl From<IdentifierHandle> for IdSource {
    fn from(handle: IdentifierHandle) -> Self {
        handle.source.clone()
    }
}

impl From<&str> for IdentifierHandle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for IdentifierHandle {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl PartialEq for IdentifierHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for IdentifierHandle {}

impl PartialEq<str> for IdentifierHandle {
    fn eq(&self, other: &str) -> bool {
        self.id == other
    }
}

impl PartialEq<&str> for IdentifierHandle {
    fn eq(&self, other: &&str) -> bool {
        self.id == *other
    }
}

impl PartialEq<String> for IdentifierHandle {
    fn eq(&self, other: &String) -> bool {
        &self.id == other
    }
}

impl PartialEq<IdentifierHandle> for str {
    fn eq(&self, other: &IdentifierHandle) -> bool {
        self == other.id
    }
}

impl PartialEq<IdentifierHandle> for &str {
    fn eq(&self, other: &IdentifierHandle) -> bool {
        *self == other.id
    }
}

impl PartialEq<IdentifierHandle> for String {
    fn eq(&self, other: &IdentifierHandle) -> bool {
        *self == other.id
    }
}

impl Hash for IdentifierHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.as_str().hash(state);
    }
}

impl Borrow<str> for IdentifierHandle {
    fn borrow(&self) -> &str {
        &self.id
    }
}

impl AsRef<str> for IdentifierHandle {
    fn as_ref(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for IdentifierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl fmt::Debug for IdentifierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentifierHandle(id=\"{}\")", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::{HashMap, HashSet};

    fn unique_id(label: &str) -> String {
        format!("smi:test/{label}/{}", fresh_token())
    }

    fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn fixed_handles_with_equal_ids_are_interchangeable() {
        let id = unique_id("eq");
        let a = IdentifierHandle::new(id.clone());
        let b = IdentifierHandle::new(id.as_str());
        assert_eq!(a, b);
        assert_eq!(a, id);
        assert_eq!(a, id.as_str());
        assert_eq!(id, a);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a), hash_of(id.as_str()));
        assert!(a.resource_key().ptr_eq(b.resource_key()));
    }

    #[test]
    fn handles_work_as_string_keyed_map_keys() {
        let mut map = HashMap::new();
        map.insert(IdentifierHandle::new("foo"), "bar");
        assert_eq!(map.get("foo"), Some(&"bar"));

        let set: HashSet<IdentifierHandle> = ["a", "b", "a"].into_iter().map(IdentifierHandle::from).collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn generated_ids_use_prefix_and_token() {
        let handle = IdentifierHandle::with_prefix("event");
        let token = handle.token().unwrap().to_string();
        assert_eq!(handle.id(), format!("event/{token}"));
        assert_eq!(handle.prefix(), Some("event"));
        assert!(!handle.is_fixed());

        let slash = IdentifierHandle::with_prefix("smi:local/");
        assert_eq!(slash.id(), format!("smi:local/{}", slash.token().unwrap()));

        assert_ne!(IdentifierHandle::generated(), IdentifierHandle::generated());
    }

    #[test]
    fn default_prefix_is_smi_local() {
        let handle = IdentifierHandle::builder().build_in(&Registry::new());
        assert!(handle.id().starts_with("smi:local/"));
        assert_eq!(handle.prefix(), Some("smi:local"));
    }

    #[test]
    fn fixed_handle_has_no_prefix_or_token() {
        let handle = IdentifierHandle::new("2012-04-11--385392");
        assert!(handle.is_fixed());
        assert_eq!(handle.prefix(), None);
        assert_eq!(handle.token(), None);
    }

    #[test]
    fn token_and_id_cannot_be_removed_or_overwritten() {
        let mut handle = IdentifierHandle::generated();
        let before = handle.id().to_string();
        assert!(matches!(
            handle.set_token("nope"),
            Err(ResourceIdError::ImmutableAttributeViolation { attribute: "token", .. })
        ));
        assert!(matches!(
            handle.clear_token(),
            Err(ResourceIdError::ImmutableAttributeViolation { attribute: "token", .. })
        ));
        assert!(matches!(
            handle.clear_id(),
            Err(ResourceIdError::ImmutableAttributeViolation { attribute: "id", .. })
        ));
        assert_eq!(handle.id(), before);
    }

    #[test]
    fn set_id_requires_text_and_warns() {
        let mut handle = IdentifierHandle::generated();
        let err = handle.set_id(5u64).unwrap_err();
        assert!(matches!(err, ResourceIdError::InvalidIdType { .. }));

        let previous = handle.id().to_string();
        let id = unique_id("renamed");
        let (result, notices) = notice::capture(|| handle.set_id(id.as_str()));
        result.unwrap();
        assert_eq!(notices, vec![Notice::UnstableId { previous, id: id.clone() }]);
        assert!(handle.is_fixed());
        assert_eq!(handle.id(), id);
        assert!(handle.resource_key().ptr_eq(IdentifierHandle::new(id).resource_key()));
    }

    #[test]
    fn set_prefix_recomputes_generated_id() {
        let mut handle = IdentifierHandle::with_prefix("smi:local");
        let token = handle.token().unwrap().to_string();
        handle.set_prefix("quakeml:obspy.org");
        assert_eq!(handle.id(), format!("quakeml:obspy.org/{token}"));
        handle.clear_prefix();
        assert_eq!(handle.id(), format!("/{token}"));

        let mut fixed = IdentifierHandle::new("fixed");
        fixed.set_prefix("ignored");
        assert_eq!(fixed.id(), "fixed");
    }

    #[test]
    fn clone_keeps_key_and_object_but_drops_parent() {
        let registry = Registry::new();
        let x: Referent = Arc::new(1u8);
        let parent = intern(unique_id("parent"));
        let handle = IdentifierHandle::builder()
            .id(unique_id("clone"))
            .parent_key(parent.clone())
            .object(x.clone())
            .build_in(&registry);

        let copy = handle.clone();
        assert_eq!(copy, handle);
        assert!(copy.resource_key().ptr_eq(handle.resource_key()));
        assert_eq!(copy.object_id(), handle.object_id());
        assert_eq!(copy.parent(), None);
        assert_eq!(handle.parent(), Some(parent.clone()));

        let full = IdentifierHandle::from_handle(&handle);
        assert_eq!(full.parent(), Some(parent));
        assert_eq!(full.object_id(), Some(ObjectId::of(&x)));
    }

    #[test]
    fn builder_binds_initial_object() {
        let registry = Registry::new();
        let x: Referent = Arc::new("x".to_string());
        let id = unique_id("builder");
        let _owner = IdentifierHandle::builder()
            .id(id.clone())
            .object(x.clone())
            .build_in(&registry);

        let other = IdentifierHandle::new(id);
        let resolved = registry.resolve(&other).unwrap();
        assert_eq!(ObjectId::of(&resolved), ObjectId::of(&x));
    }

    #[test]
    fn text_and_debug_forms() {
        let handle = IdentifierHandle::new("foo");
        assert_eq!(handle.to_string(), "foo");
        assert_eq!(format!("{handle:?}"), "IdentifierHandle(id=\"foo\")");
    }

    #[test]
    fn standard_uri_does_not_mutate_handle() {
        let handle = IdentifierHandle::new("some_id");
        assert_eq!(handle.to_standard_uri(None).unwrap(), "smi:local/some_id");
        assert_eq!(handle.to_standard_uri(Some("obspy.org")).unwrap(), "smi:obspy.org/some_id");
        assert_eq!(handle.id(), "some_id");
    }

    #[test]
    fn standard_handle_carries_object_and_parent() {
        let registry = Registry::new();
        let x: Referent = Arc::new("pick".to_string());
        let parent = intern(unique_id("event"));
        let local = format!("pick-{}", fresh_token());
        let handle = IdentifierHandle::builder()
            .id(local.clone())
            .parent_key(parent.clone())
            .build_in(&registry);
        registry.bind(&handle, &x, true, None);

        let (standard, notices) =
            notice::capture(|| registry.standard_handle(&handle, None).unwrap());
        assert!(notices.is_empty());
        assert_eq!(standard.id(), format!("smi:local/{local}"));
        assert_eq!(standard.parent(), Some(parent));

        let lookup = IdentifierHandle::new(standard.id());
        let resolved = registry.resolve(&lookup).unwrap();
        assert_eq!(ObjectId::of(&resolved), ObjectId::of(&x));
    }

    #[test]
    fn standard_handle_of_unresolved_id_is_unbound() {
        let registry = Registry::new();
        let handle = IdentifierHandle::new(format!("orphan-{}", fresh_token()));
        let standard = registry.standard_handle(&handle, Some("obspy.org")).unwrap();
        assert!(standard.id().starts_with("smi:obspy.org/orphan-"));
        assert_eq!(standard.object_id(), None);
    }

    #[test]
    fn standard_handle_rejects_unformattable_id() {
        let handle = IdentifierHandle::new("bad:id");
        assert!(matches!(
            handle.to_standard_handle(None),
            Err(ResourceIdError::InvalidUri { .. })
        ));
    }
}
