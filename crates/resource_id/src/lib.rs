//! Resource identifiers for QuakeML-style event data
//!
//! A resource identifier is a string key that other records use to refer to
//! an object. This crate lets any [`IdentifierHandle`] carrying that key
//! resolve to the object bound under it, anywhere in the process, for as long
//! as the object is alive. The registry never owns the objects it tracks.

pub mod config;
pub mod errors;
pub mod handle;
pub mod interner;
pub mod notice;
pub mod registry;
pub mod resolution;
pub mod types;
pub mod uri;

pub use config::RegistryConfig;
pub use errors::*;
pub use handle::{HandleBuilder, IdSource, IdentifierHandle};
pub use interner::{intern, KeyId, ResourceKey};
pub use notice::Notice;
pub use registry::{Registry, RegistryStats};
pub use resolution::{HookRegistry, ResolverHook};
pub use types::*;
pub use uri::{is_standard_uri, standardize};
