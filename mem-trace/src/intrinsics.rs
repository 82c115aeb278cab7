//! Monkey-patch-resistant introspection helpers
//!
//! [`Intrinsics::capture`] copies the realm's primitives when the
//! instrumentation runtime starts, before any user code runs. Every helper
//! below calls the captured copies, so replacing `realm.builtins` afterwards
//! does not change their behavior.

use crate::host::{Builtins, HostError, JsObject, PropertyDescriptor, Realm, Value};

/// Built-in primitives captured at initialization
#[derive(Debug, Clone, Copy)]
pub struct Intrinsics {
    builtins: Builtins,
}

impl Intrinsics {
    pub fn capture(realm: &Realm) -> Self {
        log::debug!("Capturing realm intrinsics");
        Self {
            builtins: realm.builtins,
        }
    }

    /// First descriptor for `prop` found walking the prototype chain from `o`
    pub fn get_property_descriptor(&self, o: &JsObject, prop: &str) -> Option<PropertyDescriptor> {
        let mut current = Some(o.clone());
        while let Some(t) = current {
            if let Some(desc) = (self.builtins.get_own_property_descriptor)(&t, prop) {
                return Some(desc);
            }
            current = (self.builtins.get_prototype_of)(&t);
        }
        None
    }

    /// True if the descriptor found for `prop` has a getter or a setter
    pub fn is_getter_setter(&self, o: &JsObject, prop: &str) -> bool {
        self.get_property_descriptor(o, prop)
            .map_or(false, |desc| desc.is_accessor())
    }

    pub fn get_own_property_descriptor(&self, o: &JsObject, prop: &str) -> Option<PropertyDescriptor> {
        (self.builtins.get_own_property_descriptor)(o, prop)
    }

    pub fn get_prototype_of(&self, o: &JsObject) -> Option<JsObject> {
        (self.builtins.get_prototype_of)(o)
    }

    /// `Object.prototype.hasOwnProperty.call(o, prop)`
    pub fn has_own_property(&self, o: &JsObject, prop: &str) -> bool {
        (self.builtins.has_own_property)(o, prop)
    }

    pub fn define_property(
        &self,
        o: &JsObject,
        prop: &str,
        desc: PropertyDescriptor,
    ) -> Result<(), HostError> {
        (self.builtins.define_property)(o, prop, desc)
    }

    /// Textual source of a function; `Ok(None)` when the host hides it
    pub fn function_source(&self, f: &JsObject) -> Result<Option<String>, HostError> {
        (self.builtins.function_to_string)(f)
    }

    /// Objects and functions (as opposed to primitives)
    pub fn is_object(value: &Value) -> bool {
        matches!(value, Value::Object(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn getter(realm: &Realm) -> JsObject {
        realm.new_native_function("get")
    }

    #[test]
    fn test_descriptor_found_on_prototype_chain() {
        let realm = Realm::new();
        let intrinsics = Intrinsics::capture(&realm);
        let base = realm.new_object();
        base.set("shared", Value::Number(1.0));
        let middle = JsObject::new(Some(&base));
        let leaf = JsObject::new(Some(&middle));

        let desc = intrinsics.get_property_descriptor(&leaf, "shared").unwrap();
        assert_eq!(desc.value.and_then(|v| v.as_number()), Some(1.0));
        assert!(!intrinsics.has_own_property(&leaf, "shared"));
        assert!(intrinsics.has_own_property(&base, "shared"));
    }

    #[test]
    fn test_absent_property_is_not_found() {
        let realm = Realm::new();
        let intrinsics = Intrinsics::capture(&realm);
        let o = JsObject::new(Some(&realm.new_object()));
        assert!(intrinsics.get_property_descriptor(&o, "missing").is_none());

        // Root object with no prototype at all
        let root = JsObject::new(None);
        assert!(intrinsics.get_property_descriptor(&root, "missing").is_none());
        assert!(!intrinsics.is_getter_setter(&root, "missing"));
    }

    #[test]
    fn test_getter_only_property_is_getter_setter() {
        let realm = Realm::new();
        let intrinsics = Intrinsics::capture(&realm);
        let proto = realm.new_object();
        intrinsics
            .define_property(&proto, "size", PropertyDescriptor::accessor(Some(getter(&realm)), None))
            .unwrap();
        let o = JsObject::new(Some(&proto));

        assert!(intrinsics.is_getter_setter(&o, "size"));
        assert!(intrinsics.is_getter_setter(&proto, "size"));
    }

    #[test]
    fn test_shadowing_data_property_wins() {
        let realm = Realm::new();
        let intrinsics = Intrinsics::capture(&realm);
        let proto = realm.new_object();
        intrinsics
            .define_property(&proto, "x", PropertyDescriptor::accessor(None, Some(getter(&realm))))
            .unwrap();
        let o = JsObject::new(Some(&proto));
        o.set("x", Value::Bool(true));

        assert!(!intrinsics.is_getter_setter(&o, "x"));
        assert!(intrinsics.is_getter_setter(&proto, "x"));
    }

    #[test]
    fn test_captured_primitives_survive_monkey_patching() {
        let mut realm = Realm::new();
        let intrinsics = Intrinsics::capture(&realm);
        let o = realm.new_object();
        o.set("x", Value::Null);

        // User code replaces the globals after the runtime initialized
        realm.builtins.get_own_property_descriptor = |_, _| None;
        realm.builtins.get_prototype_of = |_| None;
        realm.builtins.has_own_property = |_, _| false;
        realm.builtins.define_property = |_, _, _| Err(HostError::NotAFunction);

        assert!(intrinsics.get_property_descriptor(&o, "x").is_some());
        assert!(intrinsics.has_own_property(&o, "x"));
        assert!(intrinsics.get_prototype_of(&o).is_some());
        intrinsics
            .define_property(&o, "y", PropertyDescriptor::data(Value::Null))
            .unwrap();

        // A fresh capture sees the patched versions
        let late = Intrinsics::capture(&realm);
        assert!(late.get_property_descriptor(&o, "x").is_none());
    }

    #[test]
    fn test_is_object() {
        let realm = Realm::new();
        assert!(Intrinsics::is_object(&Value::Object(realm.new_object())));
        assert!(!Intrinsics::is_object(&Value::Number(3.0)));
        assert!(!Intrinsics::is_object(&Value::Null));
    }
}
