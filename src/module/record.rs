use serde_json::{Map, Value};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// Shared exports container of one module
///
/// Every clone points at the same value, so a module that requires another
/// one still mid-evaluation sees whatever has been exported so far.
#[derive(Debug, Clone)]
pub struct Exports(Rc<RefCell<Value>>);

impl Exports {
    pub fn new(value: Value) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Snapshot of the current value
    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    /// Replace the whole exported value
    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = value;
    }

    /// Set one named export, turning a non-object value into an object first
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let mut exports = self.0.borrow_mut();
        if !exports.is_object() {
            *exports = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut *exports {
            map.insert(key.into(), value);
        }
    }

    pub fn borrow(&self) -> Ref<'_, Value> {
        self.0.borrow()
    }

    /// Mutable access; must not be held across a `require` call
    pub fn borrow_mut(&self) -> RefMut<'_, Value> {
        self.0.borrow_mut()
    }

    /// Whether both handles share one container
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Exports {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

/// Bookkeeping for one loaded (or loading) module
///
/// `parent` and `children` are keys into the registry's module map; the
/// registry owns every record.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// `"."` for the entry module, the filename otherwise
    pub id: String,
    pub filename: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    /// `node_modules` directories searched for bare requests
    pub paths: Vec<String>,
    pub exports: Exports,
    pub loaded: bool,
}

impl ModuleRecord {
    pub fn new(id: impl Into<String>, filename: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            parent: parent.map(str::to_string),
            children: Vec::new(),
            paths: Vec::new(),
            exports: Exports::default(),
            loaded: false,
        }
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }
}
