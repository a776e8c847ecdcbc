//! Evaluators turn a resolved file into module exports
//!
//! The registry picks an evaluator by the file's extension. Executing script
//! code is left to the embedder: the default `.js` evaluator only reports that
//! no script engine is installed, and is meant to be replaced with
//! [`ModuleRegistry::register_extension`](crate::ModuleRegistry::register_extension).

use crate::module::record::{Exports, ModuleRecord};
use crate::module::registry::Require;
use anyhow::Context;
use std::sync::Arc;

/// Everything an evaluator receives for one module
pub struct Evaluation<'a> {
    /// Container to populate
    pub exports: &'a Exports,
    /// `require` bound to the module being evaluated
    pub require: &'a Require<'a>,
    /// Snapshot of the module record at the start of evaluation
    pub module: &'a ModuleRecord,
    /// Absolute path inside the archive
    pub filename: &'a str,
    /// Raw file contents
    pub source: &'a [u8],
}

pub trait Evaluator {
    fn evaluate(&self, evaluation: Evaluation<'_>) -> anyhow::Result<()>;
}

/// Evaluator handle stored in registries
pub type SharedEvaluator = Arc<dyn Evaluator + Send + Sync>;

/// Evaluator backed by a closure, see [`from_fn`]
pub struct FnEvaluator<F>(F);

/// Wrap a closure as an [`Evaluator`]
pub fn from_fn<F>(f: F) -> FnEvaluator<F>
where
    F: Fn(Evaluation<'_>) -> anyhow::Result<()>,
{
    FnEvaluator(f)
}

impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(Evaluation<'_>) -> anyhow::Result<()>,
{
    fn evaluate(&self, evaluation: Evaluation<'_>) -> anyhow::Result<()> {
        (self.0)(evaluation)
    }
}

/// Parses the file as JSON and exports the parsed value
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEvaluator;

impl Evaluator for JsonEvaluator {
    fn evaluate(&self, evaluation: Evaluation<'_>) -> anyhow::Result<()> {
        let source = strip_bom(evaluation.source);
        let value: serde_json::Value = serde_json::from_slice(source)
            .with_context(|| format!("{}: invalid JSON", evaluation.filename))?;
        evaluation.exports.set(value);
        Ok(())
    }
}

/// Placeholder for script files until an embedder installs a script engine
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEvaluator;

impl Evaluator for ScriptEvaluator {
    fn evaluate(&self, evaluation: Evaluation<'_>) -> anyhow::Result<()> {
        anyhow::bail!(
            "no script engine installed to run {}; register an evaluator for \".js\"",
            evaluation.filename
        )
    }
}

/// Drop a leading UTF-8 byte order mark
pub(crate) fn strip_bom(source: &[u8]) -> &[u8] {
    source.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bom() {
        assert_eq!(strip_bom(b"\xEF\xBB\xBF{}"), b"{}");
        assert_eq!(strip_bom(b"{}"), b"{}");
        assert_eq!(strip_bom(b""), b"");
    }
}
