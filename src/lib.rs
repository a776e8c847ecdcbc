//! asar-rs: read-only asar archives with `node_modules`-style module loading
//!
//! This library provides:
//! - Decoding of the asar header (two nested Chromium pickles holding a JSON
//!   directory tree)
//! - A read-only virtual filesystem over the archive bytes: lookup, stat,
//!   read, directory listing, integrity verification
//! - Request resolution in the style of CommonJS `require`: relative paths,
//!   `node_modules` walks, extension trial and `package.json` `main`
//! - A module registry that caches loaded modules and hands file contents to
//!   pluggable evaluators
//!
//! # Example
//!
//! ```no_run
//! use asar_rs::{Filesystem, ListOptions, ModuleRegistry};
//! use std::sync::Arc;
//!
//! let fs = Filesystem::open("app.asar")?;
//! for path in fs.list_files(ListOptions::default()) {
//!     println!("{}", path);
//! }
//! let config = fs.read_file_to_string("/config.json")?;
//!
//! let registry = ModuleRegistry::new(Arc::new(fs));
//! let settings = registry.run("./config.json")?;
//! # Ok::<(), asar_rs::error::AsarError>(())
//! ```

// Core modules
pub mod archive;
pub mod config;
pub mod error;
pub mod module;
pub mod path;

// Re-export commonly used types
pub use archive::{Filesystem, ListOptions, Node, NodeKind, Stat};
pub use config::Config;
pub use error::{AsarError, Result};
pub use module::{
    from_fn, register_default_builtin, register_default_extension, Evaluation, Evaluator,
    Exports, JsonEvaluator, ModuleRecord, ModuleRegistry, Require, Resolution, Resolver,
    ScriptEvaluator, MAIN_MODULE_ID,
};
