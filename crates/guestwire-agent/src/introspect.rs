//! Method introspection.
//!
//! Builds the method list carried in an [`ObjectDescriptor`]. Every method
//! an object declares is included except the attributes in
//! [`EXCLUDED_ATTRS`], which either make no sense remotely or are served by
//! dedicated operations (`str`, `repr`, `getattr`, ...).

use crate::value::GuestObject;
use guestwire_protocol::{MethodDescriptor, ObjectDescriptor, ObjectId};
use std::collections::BTreeSet;

/// Attributes never exposed as remote methods.
pub const EXCLUDED_ATTRS: &[&str] = &[
    "__class__",
    "__cmp__",
    "__del__",
    "__delattr__",
    "__dir__",
    "__doc__",
    "__getattr__",
    "__getattribute__",
    "__hash__",
    "__init__",
    "__metaclass__",
    "__module__",
    "__new__",
    "__reduce__",
    "__reduce_ex__",
    "__repr__",
    "__setattr__",
    "__slots__",
    "__str__",
    "__weakref__",
    "__dict__",
    "__members__",
    "__methods__",
];

/// Whether `name` is withheld from descriptors.
pub fn is_excluded(name: &str) -> bool {
    EXCLUDED_ATTRS.contains(&name)
}

/// The invocable methods of `obj`, in declaration order.
///
/// Names are unique; the first declaration wins.
pub fn describe(obj: &dyn GuestObject) -> Vec<MethodDescriptor> {
    let mut seen = BTreeSet::new();
    obj.methods()
        .into_iter()
        .filter(|m| !is_excluded(&m.name))
        .filter(|m| seen.insert(m.name.clone()))
        .collect()
}

/// Full descriptor for an object registered under `id`.
pub fn descriptor(id: ObjectId, obj: &dyn GuestObject) -> ObjectDescriptor {
    ObjectDescriptor {
        id,
        class_name: obj.class_name().to_string(),
        module_name: obj.module_name().to_string(),
        methods: describe(obj),
    }
}

/// Sorted attribute and method names of `obj`, as `dir()` lists them.
pub fn dir_of(obj: &dyn GuestObject) -> Vec<String> {
    let names: BTreeSet<String> = obj
        .methods()
        .into_iter()
        .map(|m| m.name)
        .chain(obj.attr_names())
        .collect();
    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[derive(Debug)]
    struct Widget;

    impl GuestObject for Widget {
        fn class_name(&self) -> &str {
            "Widget"
        }

        fn module_name(&self) -> &str {
            "shop"
        }

        fn methods(&self) -> Vec<MethodDescriptor> {
            vec![
                MethodDescriptor::new("spin", Some("Spin the widget.")),
                MethodDescriptor::new("__init__", None),
                MethodDescriptor::new("__repr__", None),
                MethodDescriptor::new("stop", None),
                MethodDescriptor::new("__enter__", None),
                MethodDescriptor::new("spin", Some("Duplicate.")),
            ]
        }

        fn attr_names(&self) -> Vec<String> {
            vec!["colour".into()]
        }
    }

    #[test]
    fn test_describe_filters_blocklist() {
        let names: Vec<String> = describe(&Widget).into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["spin", "stop", "__enter__"]);
    }

    #[test]
    fn test_describe_keeps_docs_and_first_declaration() {
        let methods = describe(&Widget);
        assert_eq!(methods[0].doc.as_deref(), Some("Spin the widget."));
    }

    #[test]
    fn test_every_public_method_is_described() {
        let described: BTreeSet<String> = describe(&Widget).into_iter().map(|m| m.name).collect();
        for method in Widget.methods() {
            assert_eq!(
                described.contains(&method.name),
                !is_excluded(&method.name),
                "{}",
                method.name
            );
        }
    }

    #[test]
    fn test_descriptor() {
        let id = ObjectId::new(Uuid::nil(), 3);
        let desc = descriptor(id, &Widget);
        assert_eq!(desc.id, id);
        assert_eq!(desc.class_name, "Widget");
        assert_eq!(desc.module_name, "shop");
        assert_eq!(desc.methods.len(), 3);
    }

    #[test]
    fn test_dir_is_sorted_and_complete() {
        let names = dir_of(&Widget);
        assert!(names.windows(2).all(|w| w[0] < w[1]));
        assert!(names.contains(&"colour".to_string()));
        assert!(names.contains(&"__init__".to_string()));
    }
}
