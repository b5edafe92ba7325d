use quakeml_resource_id::{IdSource, IdentifierHandle, Referent, Registry};
use std::sync::Arc;

#[test]
fn fixed_handle_round_trips_through_json() {
    let registry = Registry::new();
    let id = format!("smi:serde/event/{}", uuid::Uuid::new_v4());
    let object: Referent = Arc::new(42u32);
    let handle = IdentifierHandle::builder()
        .id(id.clone())
        .parent("smi:serde/catalog")
        .object(object.clone())
        .build_in(&registry);

    let json = serde_json::to_string(&handle).unwrap();
    assert_eq!(json, format!(r#"{{"fixed":{{"id":"{id}"}}}}"#));

    let restored: IdentifierHandle = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, handle);
    assert!(restored.is_fixed());
    assert!(restored.resource_key().ptr_eq(handle.resource_key()));
    assert_eq!(restored.parent(), None);
    assert_eq!(restored.object_id(), None);

    let resolved = registry.resolve_as::<u32>(&restored).unwrap();
    assert_eq!(*resolved, 42);
}

#[test]
fn generated_handle_keeps_prefix_and_token() {
    let handle = IdentifierHandle::with_prefix("smi:serde");
    let json = serde_json::to_value(&handle).unwrap();
    assert_eq!(json["generated"]["prefix"], "smi:serde");
    assert_eq!(json["generated"]["token"], handle.token().unwrap());

    let restored: IdentifierHandle = serde_json::from_value(json).unwrap();
    assert_eq!(restored.id(), handle.id());
    assert_eq!(restored.prefix(), Some("smi:serde"));
    assert_eq!(restored.token(), handle.token());
    assert_eq!(
        restored.source(),
        &IdSource::Generated {
            prefix: "smi:serde".to_string(),
            token: handle.token().unwrap().to_string(),
        }
    );
}

#[test]
fn restored_handle_reinterns_a_released_key() {
    let id = format!("smi:serde/released/{}", uuid::Uuid::new_v4());
    let json = serde_json::to_string(&IdentifierHandle::new(id.clone())).unwrap();
    assert!(!quakeml_resource_id::interner::is_interned(&id.as_str().into()));

    let restored: IdentifierHandle = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.id(), id);
    assert!(quakeml_resource_id::interner::is_interned(&id.as_str().into()));
}
