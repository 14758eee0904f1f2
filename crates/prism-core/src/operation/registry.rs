//! Process-wide operation registry and introspection.
//!
//! Registration is additive: a name, once taken, keeps its class for the
//! lifetime of the process.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use super::{OperationCategory, OperationClass, PropertySpec};
use crate::error::{ConfigurationError, PrismResult};

static OPERATIONS: LazyLock<RwLock<BTreeMap<String, Arc<OperationClass>>>> = LazyLock::new(|| {
    let mut map = BTreeMap::new();
    for class in super::sources::classes()
        .into_iter()
        .chain(super::filters::classes())
        .chain(super::compose::classes())
        .chain(super::sinks::classes())
        .chain(super::meta::classes())
    {
        map.insert(class.name().to_string(), Arc::new(class));
    }
    tracing::debug!("registered {} built-in operations", map.len());
    RwLock::new(map)
});

/// Add `class` to the registry.
pub fn register_operation(class: OperationClass) -> PrismResult<()> {
    let mut ops = OPERATIONS.write();
    if ops.contains_key(class.name()) {
        return Err(ConfigurationError::DuplicateOperation(class.name().to_string()).into());
    }
    tracing::info!("registered operation {}", class.name());
    ops.insert(class.name().to_string(), Arc::new(class));
    Ok(())
}

/// Find a class by name. Unqualified names also match `prism:<name>`.
pub fn lookup(name: &str) -> PrismResult<Arc<OperationClass>> {
    let ops = OPERATIONS.read();
    let found = ops.get(name).or_else(|| {
        if name.contains(':') {
            None
        } else {
            ops.get(&format!("prism:{name}"))
        }
    });
    found
        .cloned()
        .ok_or_else(|| ConfigurationError::UnknownOperation(name.to_string()).into())
}

/// Names of every registered operation a node can be created from.
pub fn list_operations() -> Vec<String> {
    OPERATIONS
        .read()
        .values()
        .filter(|c| c.category() != OperationCategory::Meta)
        .map(|c| c.name().to_string())
        .collect()
}

pub fn has_operation(name: &str) -> bool {
    lookup(name).is_ok()
}

pub fn list_properties(operation: &str) -> PrismResult<Vec<PropertySpec>> {
    Ok(lookup(operation)?.properties().to_vec())
}

pub fn list_keys(operation: &str) -> PrismResult<Vec<String>> {
    Ok(lookup(operation)?.keys().keys().cloned().collect())
}

pub fn get_key(operation: &str, key: &str) -> PrismResult<Option<String>> {
    Ok(lookup(operation)?.keys().get(key).cloned())
}

pub fn list_property_keys(operation: &str, property: &str) -> PrismResult<Vec<String>> {
    let class = lookup(operation)?;
    let spec = find(&class, property)?;
    Ok(spec.keys().keys().cloned().collect())
}

pub fn get_property_key(operation: &str, property: &str, key: &str) -> PrismResult<Option<String>> {
    let class = lookup(operation)?;
    let spec = find(&class, property)?;
    Ok(spec.keys().get(key).cloned())
}

fn find<'a>(class: &'a OperationClass, property: &str) -> PrismResult<&'a PropertySpec> {
    class.find_property(property).ok_or_else(|| {
        ConfigurationError::UnknownProperty {
            operation: class.name().to_string(),
            property: property.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OperationContext;
    use crate::error::PrismError;
    use crate::operation::Operation;

    struct Noop;

    impl Operation for Noop {
        fn process(&self, _ctx: &mut OperationContext<'_>) -> PrismResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_lists_builtins() {
        let ops = list_operations();
        for name in ["prism:color", "prism:over", "prism:box-blur", "prism:write-buffer"] {
            assert!(ops.iter().any(|o| o == name), "{name} missing");
        }
        assert!(!ops.iter().any(|o| o == "prism:graph"));
    }

    #[test]
    fn test_registry_unqualified_lookup() {
        assert!(has_operation("nop"));
        assert!(has_operation("prism:nop"));
        assert!(!has_operation("prism:does-not-exist"));
    }

    #[test]
    fn test_registry_rejects_duplicate() {
        let class = || OperationClass::new("test:registry-dup", OperationCategory::PointFilter, Noop);
        register_operation(class()).unwrap();
        let err = register_operation(class()).unwrap_err();
        assert!(matches!(
            err,
            PrismError::Configuration(ConfigurationError::DuplicateOperation(_))
        ));
    }

    #[test]
    fn test_registry_keys() {
        assert_eq!(
            get_key("prism:box-blur", "categories").unwrap().as_deref(),
            Some("area-filter")
        );
        assert!(list_keys("prism:over").unwrap().contains(&"title".to_string()));
        assert!(get_key("prism:nope", "title").is_err());
    }

    #[test]
    fn test_registry_property_keys() {
        let keys = list_property_keys("prism:box-blur", "radius").unwrap();
        assert!(keys.contains(&"unit".to_string()));
        assert_eq!(
            get_property_key("prism:box-blur", "radius", "unit").unwrap().as_deref(),
            Some("pixel-distance")
        );
        assert!(list_property_keys("prism:box-blur", "nope").is_err());
    }
}
