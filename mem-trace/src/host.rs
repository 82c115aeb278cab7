//! Host object model
//!
//! A minimal model of the runtime values instrumented code works with:
//! reference-counted objects with own properties, property descriptors and a
//! prototype link, and function objects with a textual source form.
//!
//! A [`Realm`] exposes its built-in primitives as a table of plain function
//! pointers ([`Builtins`]). Like a script redefining
//! `Object.getOwnPropertyDescriptor`, code holding the realm may replace any
//! entry at any time; [`crate::intrinsics::Intrinsics`] captures a copy first.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Errors raised by host primitives
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Value is not a function")]
    NotAFunction,

    #[error("Cannot define property {0:?}: object is not extensible")]
    NotExtensible(String),

    #[error("Cannot redefine non-configurable property {0:?}")]
    NotConfigurable(String),

    #[error("Cyclic prototype chain")]
    PrototypeCycle,
}

/// A host value
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(JsObject),
}

impl Value {
    pub fn as_object(&self) -> Option<&JsObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<JsObject> for Value {
    fn from(o: JsObject) -> Self {
        Value::Object(o)
    }
}

/// Property descriptor as returned by `getOwnPropertyDescriptor`
#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    pub value: Option<Value>,
    pub get: Option<JsObject>,
    pub set: Option<JsObject>,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// Writable, enumerable, configurable data property (plain assignment)
    pub fn data(value: Value) -> Self {
        Self {
            value: Some(value),
            writable: true,
            enumerable: true,
            configurable: true,
            ..Default::default()
        }
    }

    /// Accessor property with the given getter and/or setter
    pub fn accessor(get: Option<JsObject>, set: Option<JsObject>) -> Self {
        Self {
            get,
            set,
            enumerable: true,
            configurable: true,
            ..Default::default()
        }
    }

    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }
}

/// What happens when a function object is stringified
#[derive(Debug, Clone)]
enum Callable {
    /// Function defined in (possibly instrumented) script source
    Script { source: String },
    /// Host-provided function; stringifies to `[native code]`
    Native { name: String },
    /// Function whose text the host refuses to reveal
    Opaque,
}

#[derive(Debug)]
struct ObjectData {
    properties: HashMap<String, PropertyDescriptor>,
    /// Non-owning own data properties, e.g. a prototype's `constructor`.
    /// They read as ordinary data properties while the target is alive.
    back_links: HashMap<String, WeakObject>,
    prototype: Option<JsObject>,
    extensible: bool,
    callable: Option<Callable>,
}

/// Shared handle to a host object. Clones refer to the same object.
#[derive(Clone)]
pub struct JsObject(Rc<RefCell<ObjectData>>);

impl JsObject {
    fn with_callable(prototype: Option<&JsObject>, callable: Option<Callable>) -> Self {
        JsObject(Rc::new(RefCell::new(ObjectData {
            properties: HashMap::new(),
            back_links: HashMap::new(),
            prototype: prototype.cloned(),
            extensible: true,
            callable,
        })))
    }

    /// Ordinary object with the given prototype (`None` for a root object)
    pub fn new(prototype: Option<&JsObject>) -> Self {
        Self::with_callable(prototype, None)
    }

    /// Function defined by the given source text
    pub fn script_function(source: impl Into<String>, prototype: Option<&JsObject>) -> Self {
        Self::with_callable(
            prototype,
            Some(Callable::Script {
                source: source.into(),
            }),
        )
    }

    /// Host-provided function
    pub fn native_function(name: impl Into<String>, prototype: Option<&JsObject>) -> Self {
        Self::with_callable(prototype, Some(Callable::Native { name: name.into() }))
    }

    /// Function whose source cannot be obtained
    pub fn opaque_function(prototype: Option<&JsObject>) -> Self {
        Self::with_callable(prototype, Some(Callable::Opaque))
    }

    pub fn is_callable(&self) -> bool {
        self.0.borrow().callable.is_some()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &JsObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address used as an identity key. Stable for as long as any strong or
    /// weak handle to the object exists.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    pub fn is_extensible(&self) -> bool {
        self.0.borrow().extensible
    }

    /// `Object.preventExtensions`
    pub fn prevent_extensions(&self) {
        self.0.borrow_mut().extensible = false;
    }

    /// Plain assignment `o[name] = value` of an own data property
    pub fn set(&self, name: &str, value: Value) {
        let mut data = self.0.borrow_mut();
        data.back_links.remove(name);
        data.properties.insert(name.to_string(), PropertyDescriptor::data(value));
    }

    /// Hidden data property referring to `target` without keeping it alive
    fn set_back_link(&self, name: &str, target: &JsObject) {
        let mut data = self.0.borrow_mut();
        data.properties.remove(name);
        data.back_links.insert(name.to_string(), target.downgrade());
    }

    /// `Object.setPrototypeOf`
    pub fn set_prototype(&self, prototype: Option<&JsObject>) -> Result<(), HostError> {
        let mut cursor = prototype.cloned();
        while let Some(p) = cursor {
            if p.ptr_eq(self) {
                return Err(HostError::PrototypeCycle);
            }
            cursor = p.0.borrow().prototype.clone();
        }
        self.0.borrow_mut().prototype = prototype.cloned();
        Ok(())
    }

    fn own_property(&self, name: &str) -> Option<PropertyDescriptor> {
        let data = self.0.borrow();
        if let Some(desc) = data.properties.get(name) {
            return Some(desc.clone());
        }
        data.back_links
            .get(name)
            .and_then(WeakObject::upgrade)
            .map(|target| hidden_data(Value::Object(target)))
    }

    fn has_own(&self, name: &str) -> bool {
        let data = self.0.borrow();
        data.properties.contains_key(name)
            || data.back_links.get(name).is_some_and(WeakObject::is_alive)
    }

    fn prototype(&self) -> Option<JsObject> {
        self.0.borrow().prototype.clone()
    }

    fn define(&self, name: &str, desc: PropertyDescriptor) -> Result<(), HostError> {
        match self.own_property(name) {
            Some(existing) if !existing.configurable => {
                return Err(HostError::NotConfigurable(name.to_string()));
            }
            None if !self.is_extensible() => {
                return Err(HostError::NotExtensible(name.to_string()));
            }
            _ => {}
        }
        let mut data = self.0.borrow_mut();
        data.back_links.remove(name);
        data.properties.insert(name.to_string(), desc);
        Ok(())
    }

    fn source_text(&self) -> Result<Option<String>, HostError> {
        match &self.0.borrow().callable {
            Some(Callable::Script { source }) => Ok(Some(source.clone())),
            Some(Callable::Native { name }) => {
                Ok(Some(format!("function {}() {{ [native code] }}", name)))
            }
            Some(Callable::Opaque) => Ok(None),
            None => Err(HostError::NotAFunction),
        }
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsObject({:#x})", self.addr())
    }
}

/// Weak handle that does not keep the object alive
#[derive(Debug, Clone)]
pub struct WeakObject(Weak<RefCell<ObjectData>>);

impl WeakObject {
    pub fn upgrade(&self) -> Option<JsObject> {
        self.0.upgrade().map(JsObject)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// True if this handle was created from `o`
    pub fn points_to(&self, o: &JsObject) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&o.0))
    }
}

/// `Object.getOwnPropertyDescriptor`
pub type GetOwnPropertyDescriptorFn = fn(&JsObject, &str) -> Option<PropertyDescriptor>;
/// `Object.getPrototypeOf`
pub type GetPrototypeOfFn = fn(&JsObject) -> Option<JsObject>;
/// `Object.prototype.hasOwnProperty`
pub type HasOwnPropertyFn = fn(&JsObject, &str) -> bool;
/// `Object.defineProperty`
pub type DefinePropertyFn = fn(&JsObject, &str, PropertyDescriptor) -> Result<(), HostError>;
/// `Function.prototype.toString`; `Ok(None)` when the host hides the text
pub type FunctionToStringFn = fn(&JsObject) -> Result<Option<String>, HostError>;

/// The realm's replaceable built-in primitives
#[derive(Clone, Copy)]
pub struct Builtins {
    pub get_own_property_descriptor: GetOwnPropertyDescriptorFn,
    pub get_prototype_of: GetPrototypeOfFn,
    pub has_own_property: HasOwnPropertyFn,
    pub define_property: DefinePropertyFn,
    pub function_to_string: FunctionToStringFn,
}

impl Builtins {
    /// The unmodified primitives
    pub fn standard() -> Self {
        Self {
            get_own_property_descriptor: |o, p| o.own_property(p),
            get_prototype_of: |o| o.prototype(),
            has_own_property: |o, p| o.has_own(p),
            define_property: |o, p, desc| o.define(p, desc),
            function_to_string: |f| f.source_text(),
        }
    }
}

impl fmt::Debug for Builtins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtins").finish_non_exhaustive()
    }
}

/// A global environment: built-ins plus the intrinsic prototypes
#[derive(Debug)]
pub struct Realm {
    /// Replaceable by user code at any time
    pub builtins: Builtins,
    object_prototype: JsObject,
    function_prototype: JsObject,
    weak_maps: bool,
}

impl Realm {
    /// Realm whose host supports identity-keyed weak maps
    pub fn new() -> Self {
        let object_prototype = JsObject::new(None);
        let function_prototype = JsObject::native_function("", Some(&object_prototype));
        Self {
            builtins: Builtins::standard(),
            object_prototype,
            function_prototype,
            weak_maps: true,
        }
    }

    /// Realm of an older host without weak maps
    pub fn without_weak_maps() -> Self {
        Self {
            weak_maps: false,
            ..Self::new()
        }
    }

    pub fn supports_weak_maps(&self) -> bool {
        self.weak_maps
    }

    pub fn object_prototype(&self) -> &JsObject {
        &self.object_prototype
    }

    pub fn function_prototype(&self) -> &JsObject {
        &self.function_prototype
    }

    /// `{}`
    pub fn new_object(&self) -> JsObject {
        JsObject::new(Some(&self.object_prototype))
    }

    /// A script function together with its `prototype` object.
    ///
    /// The function owns its prototype; the prototype's `constructor` only
    /// links back, so dropping the last handle to the function frees both.
    pub fn new_function(&self, source: impl Into<String>) -> JsObject {
        let f = JsObject::script_function(source, Some(&self.function_prototype));
        let proto = self.new_object();
        proto.set_back_link("constructor", &f);
        f.0.borrow_mut()
            .properties
            .insert("prototype".to_string(), hidden_data(Value::Object(proto)));
        f
    }

    /// A host-provided function (no `prototype` object)
    pub fn new_native_function(&self, name: impl Into<String>) -> JsObject {
        JsObject::native_function(name, Some(&self.function_prototype))
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

fn hidden_data(value: Value) -> PropertyDescriptor {
    PropertyDescriptor {
        value: Some(value),
        writable: true,
        ..Default::default()
    }
}
