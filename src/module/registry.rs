use crate::archive::Filesystem;
use crate::config::Config;
use crate::error::{AsarError, Result};
use crate::module::evaluator::{
    Evaluation, Evaluator, JsonEvaluator, ScriptEvaluator, SharedEvaluator,
};
use crate::module::record::{Exports, ModuleRecord};
use crate::module::resolver::{node_module_paths, Resolution, Resolver};
use crate::path;
use indexmap::IndexMap;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, warn};

/// Id given to the entry module's record
pub const MAIN_MODULE_ID: &str = ".";

/// Process-wide evaluators and built-ins, shadowed by per-registry entries
struct Defaults {
    extensions: IndexMap<String, SharedEvaluator>,
    builtins: IndexMap<String, Value>,
}

fn defaults() -> &'static RwLock<Defaults> {
    static DEFAULTS: OnceLock<RwLock<Defaults>> = OnceLock::new();
    DEFAULTS.get_or_init(|| {
        let mut extensions: IndexMap<String, SharedEvaluator> = IndexMap::new();
        extensions.insert(".js".to_string(), Arc::new(ScriptEvaluator));
        extensions.insert(".json".to_string(), Arc::new(JsonEvaluator));
        RwLock::new(Defaults {
            extensions,
            builtins: IndexMap::new(),
        })
    })
}

/// Register an evaluator for every registry in the process
///
/// A new extension is appended to the resolution order; re-registering an
/// existing one keeps its position.
pub fn register_default_extension<E>(ext: impl Into<String>, evaluator: E)
where
    E: Evaluator + Send + Sync + 'static,
{
    let mut defaults = defaults().write().unwrap_or_else(PoisonError::into_inner);
    defaults.extensions.insert(ext.into(), Arc::new(evaluator));
}

/// Register a built-in value for every registry in the process
pub fn register_default_builtin(name: impl Into<String>, value: Value) {
    let mut defaults = defaults().write().unwrap_or_else(PoisonError::into_inner);
    defaults.builtins.insert(name.into(), value);
}

/// Loaded modules of one archive, plus the evaluators that load them
///
/// Evaluation is synchronous and re-entrant: an evaluator may call back into
/// the registry through its [`Require`] handle. The registry is not `Send`;
/// share the underlying [`Filesystem`] instead.
pub struct ModuleRegistry {
    fs: Arc<Filesystem>,
    resolver: Resolver,
    /// Append-only resolution order; an extension keeps its first slot
    extension_order: RefCell<Vec<String>>,
    /// Pick up process-wide extensions registered after construction
    follow_defaults: bool,
    extensions: RefCell<IndexMap<String, SharedEvaluator>>,
    builtins: RefCell<IndexMap<String, Value>>,
    builtin_exports: RefCell<HashMap<String, Exports>>,
    modules: RefCell<IndexMap<String, ModuleRecord>>,
    main: RefCell<Option<String>>,
}

impl ModuleRegistry {
    pub fn new(fs: Arc<Filesystem>) -> Self {
        Self::with_config(fs, &Config::default())
    }

    pub fn with_config(fs: Arc<Filesystem>, config: &Config) -> Self {
        let registry = Self {
            fs,
            resolver: Resolver::new(config.lookup_paths.clone()),
            extension_order: RefCell::new(config.extensions.clone().unwrap_or_default()),
            follow_defaults: config.extensions.is_none(),
            extensions: RefCell::new(IndexMap::new()),
            builtins: RefCell::new(IndexMap::new()),
            builtin_exports: RefCell::new(HashMap::new()),
            modules: RefCell::new(IndexMap::new()),
            main: RefCell::new(None),
        };
        registry.sync_default_extensions();
        registry
    }

    pub fn fs(&self) -> &Arc<Filesystem> {
        &self.fs
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Register an evaluator for this registry only
    pub fn register_extension<E>(&self, ext: impl Into<String>, evaluator: E)
    where
        E: Evaluator + Send + Sync + 'static,
    {
        let ext = ext.into();
        self.sync_default_extensions();
        {
            let mut order = self.extension_order.borrow_mut();
            if !order.contains(&ext) {
                order.push(ext.clone());
            }
        }
        self.extensions.borrow_mut().insert(ext, Arc::new(evaluator));
        // The extension set changed, so cached misses may now resolve
        self.resolver.clear_resolutions();
    }

    /// Register a built-in value for this registry only
    pub fn register_builtin(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.builtin_exports.borrow_mut().remove(&name);
        self.builtins.borrow_mut().insert(name, value);
    }

    /// Extensions tried during resolution, in order
    ///
    /// Starts from the configured order, or the process-wide defaults when
    /// none is configured. Extensions registered later are appended and
    /// never move an existing entry.
    pub fn extensions(&self) -> Vec<String> {
        self.sync_default_extensions();
        self.extension_order.borrow().clone()
    }

    /// Append process-wide extensions this registry has not seen yet
    fn sync_default_extensions(&self) {
        if !self.follow_defaults {
            return;
        }
        let defaults = defaults().read().unwrap_or_else(PoisonError::into_inner);
        let mut order = self.extension_order.borrow_mut();
        for ext in defaults.extensions.keys() {
            if !order.contains(ext) {
                order.push(ext.clone());
            }
        }
    }

    fn evaluator_for(&self, ext: &str) -> Option<SharedEvaluator> {
        if let Some(evaluator) = self.extensions.borrow().get(ext) {
            return Some(Arc::clone(evaluator));
        }
        let defaults = defaults().read().unwrap_or_else(PoisonError::into_inner);
        defaults.extensions.get(ext).map(Arc::clone)
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        if self.builtins.borrow().contains_key(name) {
            return true;
        }
        let defaults = defaults().read().unwrap_or_else(PoisonError::into_inner);
        defaults.builtins.contains_key(name)
    }

    /// Shared exports of a built-in; the same container on every call
    pub fn builtin(&self, name: &str) -> Option<Exports> {
        if let Some(exports) = self.builtin_exports.borrow().get(name) {
            return Some(exports.clone());
        }

        let value = match self.builtins.borrow().get(name) {
            Some(value) => value.clone(),
            None => {
                let defaults = defaults().read().unwrap_or_else(PoisonError::into_inner);
                defaults.builtins.get(name)?.clone()
            }
        };
        let exports = Exports::new(value);
        self.builtin_exports
            .borrow_mut()
            .insert(name.to_string(), exports.clone());
        Some(exports)
    }

    /// Resolve `request` as made from the module at `parent`
    pub fn resolve_filename(
        &self,
        request: &str,
        parent: Option<&str>,
        is_main: bool,
    ) -> Result<Resolution> {
        if self.is_builtin(request) {
            return Ok(Resolution::Builtin(request.to_string()));
        }

        let extensions = self.extensions();
        match self
            .resolver
            .resolve(&self.fs, request, parent, &extensions)?
        {
            Some(filename) => Ok(Resolution::File(filename)),
            None => {
                if is_main {
                    debug!(request, "entry module not found");
                }
                Err(AsarError::ModuleNotFound {
                    request: request.to_string(),
                    require_stack: self.require_stack(parent),
                })
            }
        }
    }

    /// Filenames from `parent` up through its ancestors
    fn require_stack(&self, parent: Option<&str>) -> Vec<String> {
        let modules = self.modules.borrow();
        let mut stack = Vec::new();
        let mut current = parent.map(str::to_string);
        while let Some(filename) = current {
            if stack.len() > modules.len() {
                break;
            }
            current = modules
                .get(&filename)
                .and_then(|record| record.parent.clone());
            stack.push(filename);
        }
        stack
    }

    /// Require `request` on behalf of the module at `parent`
    pub fn require(&self, request: &str, parent: Option<&str>) -> Result<Exports> {
        validate_request(request)?;
        match self.resolve_filename(request, parent, false)? {
            Resolution::Builtin(name) => self.builtin(&name).ok_or_else(|| {
                AsarError::ModuleNotFound {
                    request: name,
                    require_stack: self.require_stack(parent),
                }
            }),
            Resolution::File(filename) => self.load(&filename, parent),
        }
    }

    /// Load the module at an already resolved `filename`
    ///
    /// A module already in the cache, even one still being evaluated, returns
    /// its current exports.
    pub fn load(&self, filename: &str, parent: Option<&str>) -> Result<Exports> {
        self.load_module(filename, filename, parent)
    }

    fn load_module(&self, id: &str, filename: &str, parent: Option<&str>) -> Result<Exports> {
        if let Some(exports) = self.cached_exports(filename) {
            self.attach_child(parent, filename);
            return Ok(exports);
        }

        let ext = path::extname(filename);
        let evaluator = self
            .evaluator_for(ext)
            .ok_or_else(|| AsarError::UnsupportedExtension(ext.to_string()))?;

        let record = ModuleRecord::new(id, filename, parent)
            .with_paths(node_module_paths(path::dirname(filename)));
        let exports = record.exports.clone();
        self.modules
            .borrow_mut()
            .insert(filename.to_string(), record.clone());
        self.attach_child(parent, filename);

        debug!(filename, parent, "loading module");
        match self.evaluate(evaluator.as_ref(), &record) {
            Ok(()) => {
                if let Some(record) = self.modules.borrow_mut().get_mut(filename) {
                    record.loaded = true;
                }
                Ok(exports)
            }
            Err(err) => {
                warn!(filename, error = %err, "module failed to load, evicting");
                self.evict(filename, parent);
                Err(err)
            }
        }
    }

    fn evaluate(
        &self,
        evaluator: &(dyn Evaluator + Send + Sync),
        record: &ModuleRecord,
    ) -> Result<()> {
        let source = self.fs.read_file(&record.filename)?;
        let require = Require {
            registry: self,
            module: Some(record.filename.clone()),
        };
        evaluator
            .evaluate(Evaluation {
                exports: &record.exports,
                require: &require,
                module: record,
                filename: &record.filename,
                source,
            })
            .map_err(|source| AsarError::Evaluation {
                filename: record.filename.clone(),
                source: source.into(),
            })
    }

    fn cached_exports(&self, filename: &str) -> Option<Exports> {
        self.modules
            .borrow()
            .get(filename)
            .map(|record| record.exports.clone())
    }

    fn attach_child(&self, parent: Option<&str>, child: &str) {
        let Some(parent) = parent else {
            return;
        };
        if let Some(record) = self.modules.borrow_mut().get_mut(parent) {
            if !record.children.iter().any(|c| c == child) {
                record.children.push(child.to_string());
            }
        }
    }

    fn evict(&self, filename: &str, parent: Option<&str>) {
        let mut modules = self.modules.borrow_mut();
        modules.shift_remove(filename);
        if let Some(record) = parent.and_then(|parent| modules.get_mut(parent)) {
            record.children.retain(|c| c != filename);
        }
    }

    /// Resolve `entry` from the archive root, load it and make it the main module
    pub fn run(&self, entry: &str) -> Result<Exports> {
        validate_request(entry)?;
        let filename = match self.resolve_filename(entry, None, true)? {
            Resolution::File(filename) => filename,
            Resolution::Builtin(name) => {
                return Err(AsarError::InvalidArgument(format!(
                    "entry '{}' names a built-in, not a file",
                    name
                )))
            }
        };

        *self.main.borrow_mut() = Some(filename.clone());
        match self.load_module(MAIN_MODULE_ID, &filename, None) {
            Ok(exports) => Ok(exports),
            Err(err) => {
                *self.main.borrow_mut() = None;
                Err(err)
            }
        }
    }

    /// Run the archive root as a package: its `main`, or `index`
    pub fn run_main(&self) -> Result<Exports> {
        self.run("/")
    }

    /// Filename of the entry module, once `run` has started loading it
    pub fn main(&self) -> Option<String> {
        self.main.borrow().clone()
    }

    /// Snapshot of the record cached for `filename`
    pub fn module(&self, filename: &str) -> Option<ModuleRecord> {
        self.modules.borrow().get(filename).cloned()
    }

    /// Cached filenames, in load order
    pub fn cache_keys(&self) -> Vec<String> {
        self.modules.borrow().keys().cloned().collect()
    }

    /// Drop a module from the cache so the next require evaluates it again
    pub fn remove_module(&self, filename: &str) -> bool {
        let parent = match self.modules.borrow().get(filename) {
            Some(record) => record.parent.clone(),
            None => return false,
        };
        self.evict(filename, parent.as_deref());
        true
    }
}

fn validate_request(request: &str) -> Result<()> {
    if request.is_empty() {
        return Err(AsarError::InvalidArgument(
            "request must be a non-empty string".to_string(),
        ));
    }
    Ok(())
}

/// `require` bound to one module, handed to evaluators
pub struct Require<'r> {
    registry: &'r ModuleRegistry,
    module: Option<String>,
}

impl<'r> Require<'r> {
    /// A handle requiring on behalf of no module, resolving from the root
    pub fn detached(registry: &'r ModuleRegistry) -> Self {
        Self {
            registry,
            module: None,
        }
    }

    pub fn require(&self, request: &str) -> Result<Exports> {
        self.registry.require(request, self.module.as_deref())
    }

    /// Filename `request` would load, or the built-in's name
    pub fn resolve(&self, request: &str) -> Result<String> {
        validate_request(request)?;
        match self
            .registry
            .resolve_filename(request, self.module.as_deref(), false)?
        {
            Resolution::Builtin(name) | Resolution::File(name) => Ok(name),
        }
    }

    /// Directories searched for `request`; `None` for built-ins
    pub fn resolve_paths(&self, request: &str) -> Option<Vec<String>> {
        if self.registry.is_builtin(request) {
            return None;
        }
        Some(
            self.registry
                .resolver
                .search_paths(request, self.module.as_deref()),
        )
    }

    /// Filename of the registry's entry module
    pub fn main(&self) -> Option<String> {
        self.registry.main()
    }

    /// Filename of the module this handle is bound to
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn registry(&self) -> &'r ModuleRegistry {
        self.registry
    }
}
