mod evaluator;
mod record;
mod registry;
mod resolver;

pub use evaluator::{
    from_fn, Evaluation, Evaluator, FnEvaluator, JsonEvaluator, ScriptEvaluator, SharedEvaluator,
};
pub use record::{Exports, ModuleRecord};
pub use registry::{
    register_default_builtin, register_default_extension, ModuleRegistry, Require,
    MAIN_MODULE_ID,
};
pub use resolver::{
    node_module_paths, Resolution, Resolver, DEFAULT_ENTRY, NODE_MODULES, PACKAGE_FILE,
};
