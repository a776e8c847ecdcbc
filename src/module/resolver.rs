use crate::archive::Filesystem;
use crate::error::{AsarError, Result};
use crate::module::evaluator::strip_bom;
use crate::path;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Package descriptor file consulted for directory requests
pub const PACKAGE_FILE: &str = "package.json";

/// Entry point used when a package declares no `main`
pub const DEFAULT_ENTRY: &str = "index";

/// Directory name searched for bare requests
pub const NODE_MODULES: &str = "node_modules";

/// Outcome of resolving a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Registered built-in, served without touching the archive
    Builtin(String),
    /// Absolute path of a file in the archive
    File(String),
}

/// `node_modules`-style request resolver with lazy caches
///
/// Both caches are never invalidated: the archive cannot change underneath
/// them. Only [`clear_resolutions`](Self::clear_resolutions) drops cached
/// paths, for when the extension set changes.
#[derive(Debug, Default)]
pub struct Resolver {
    lookup_paths: Vec<String>,
    resolutions: RefCell<HashMap<String, String>>,
    packages: RefCell<HashMap<String, Option<String>>>,
}

impl Resolver {
    /// Create a resolver searching `lookup_paths` after the `node_modules` walk
    pub fn new(lookup_paths: Vec<String>) -> Self {
        Self {
            lookup_paths,
            ..Self::default()
        }
    }

    pub fn lookup_paths(&self) -> &[String] {
        &self.lookup_paths
    }

    /// Directories searched for `request` made from the module at `parent`
    pub fn search_paths(&self, request: &str, parent: Option<&str>) -> Vec<String> {
        let base = parent.map(path::dirname).unwrap_or("/");
        if request.starts_with('.') || path::is_absolute(request) {
            return vec![base.to_string()];
        }

        let mut paths = node_module_paths(base);
        paths.extend(self.lookup_paths.iter().cloned());
        paths
    }

    /// Resolve `request` to an absolute filename, `None` when nothing matches
    pub fn resolve(
        &self,
        fs: &Filesystem,
        request: &str,
        parent: Option<&str>,
        extensions: &[String],
    ) -> Result<Option<String>> {
        let paths = self.search_paths(request, parent);
        let cache_key = format!("{}\0{}", request, paths.join("\0"));
        if let Some(filename) = self.resolutions.borrow().get(&cache_key) {
            trace!(request, filename = %filename, "resolution cache hit");
            return Ok(Some(filename.clone()));
        }

        let trailing_slash = request.ends_with('/');
        for search_path in &paths {
            let candidate = if path::is_absolute(request) {
                path::normalize(request)
            } else {
                path::join([search_path.as_str(), request])
            };

            let mut found = None;
            if !trailing_slash {
                found = try_file(fs, &candidate)?;
                if found.is_none() {
                    found = try_extensions(fs, &candidate, extensions)?;
                }
            }
            if found.is_none() {
                found = self.try_directory(fs, &candidate, extensions)?;
            }

            if let Some(filename) = found {
                debug!(request, parent, filename = %filename, "resolved module");
                self.resolutions
                    .borrow_mut()
                    .insert(cache_key, filename.clone());
                return Ok(Some(filename));
            }
        }

        debug!(request, parent, searched = paths.len(), "module not found");
        Ok(None)
    }

    /// Drop every cached resolution, keeping package descriptors
    pub fn clear_resolutions(&self) {
        self.resolutions.borrow_mut().clear();
    }

    fn try_directory(
        &self,
        fs: &Filesystem,
        dir: &str,
        extensions: &[String],
    ) -> Result<Option<String>> {
        match fs.stat(dir) {
            Ok(stat) if stat.is_directory() => {}
            Ok(_) | Err(AsarError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        }

        let main = self.package_main(fs, dir)?;
        if let Some(main) = main.as_deref() {
            let target = path::join([dir, main]);
            if let Some(found) = try_file(fs, &target)? {
                return Ok(Some(found));
            }
            if let Some(found) = try_extensions(fs, &target, extensions)? {
                return Ok(Some(found));
            }
            let nested_index = path::join([target.as_str(), DEFAULT_ENTRY]);
            if let Some(found) = try_extensions(fs, &nested_index, extensions)? {
                return Ok(Some(found));
            }
            trace!(dir, main, "package main missing, falling back to index");
        }

        let index = path::join([dir, DEFAULT_ENTRY]);
        if let Some(found) = try_file(fs, &index)? {
            return Ok(Some(found));
        }
        try_extensions(fs, &index, extensions)
    }

    /// Declared `main` of the package in `dir`, cached per directory
    pub fn package_main(&self, fs: &Filesystem, dir: &str) -> Result<Option<String>> {
        if let Some(main) = self.packages.borrow().get(dir) {
            return Ok(main.clone());
        }

        let package_path = path::join([dir, PACKAGE_FILE]);
        let main = match fs.read_file(&package_path) {
            Ok(source) => parse_package_main(&package_path, source)?,
            Err(AsarError::NotFound(_)) | Err(AsarError::NotAFile(_)) => None,
            Err(e) => return Err(e),
        };

        self.packages
            .borrow_mut()
            .insert(dir.to_string(), main.clone());
        Ok(main)
    }
}

/// `node_modules` directories from `from` up to the archive root, nearest first
///
/// Ancestors that are themselves `node_modules` directories are skipped.
pub fn node_module_paths(from: &str) -> Vec<String> {
    let from = if path::is_absolute(from) {
        path::normalize(from)
    } else {
        path::join(["/", from])
    };
    let segments: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();

    let mut paths = Vec::with_capacity(segments.len() + 1);
    for end in (0..=segments.len()).rev() {
        if end > 0 && segments[end - 1] == NODE_MODULES {
            continue;
        }
        let ancestor = segments[..end].join("/");
        if ancestor.is_empty() {
            paths.push(format!("/{}", NODE_MODULES));
        } else {
            paths.push(format!("/{}/{}", ancestor, NODE_MODULES));
        }
    }
    paths
}

fn try_file(fs: &Filesystem, candidate: &str) -> Result<Option<String>> {
    trace!(candidate, "trying file");
    match fs.stat(candidate) {
        Ok(stat) if stat.is_file() => Ok(Some(candidate.to_string())),
        Ok(_) | Err(AsarError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn try_extensions(fs: &Filesystem, base: &str, extensions: &[String]) -> Result<Option<String>> {
    for ext in extensions {
        if let Some(found) = try_file(fs, &format!("{}{}", base, ext))? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

fn parse_package_main(package_path: &str, source: &[u8]) -> Result<Option<String>> {
    let document: Value =
        serde_json::from_slice(strip_bom(source)).map_err(|e| AsarError::InvalidPackage {
            path: package_path.to_string(),
            reason: e.to_string(),
        })?;
    let object = document.as_object().ok_or_else(|| AsarError::InvalidPackage {
        path: package_path.to_string(),
        reason: "not a JSON object".to_string(),
    })?;

    Ok(object
        .get("main")
        .and_then(Value::as_str)
        .filter(|main| !main.is_empty())
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_module_paths() {
        assert_eq!(node_module_paths("/"), vec!["/node_modules"]);
        assert_eq!(
            node_module_paths("/app/src"),
            vec!["/app/src/node_modules", "/app/node_modules", "/node_modules"]
        );
        assert_eq!(
            node_module_paths("/app/node_modules/lib"),
            vec![
                "/app/node_modules/lib/node_modules",
                "/app/node_modules",
                "/node_modules"
            ]
        );
        assert_eq!(node_module_paths("app"), vec!["/app/node_modules", "/node_modules"]);
    }

    #[test]
    fn test_search_paths() {
        let resolver = Resolver::new(vec!["/vendor".to_string()]);
        assert_eq!(resolver.search_paths("./x", Some("/a/b.js")), vec!["/a"]);
        assert_eq!(resolver.search_paths("../x", None), vec!["/"]);
        assert_eq!(resolver.search_paths("/abs", Some("/a/b/c.js")), vec!["/a/b"]);
        assert_eq!(
            resolver.search_paths("lib", Some("/a/b.js")),
            vec!["/a/node_modules", "/node_modules", "/vendor"]
        );
        assert_eq!(
            resolver.search_paths("lib", None),
            vec!["/node_modules", "/vendor"]
        );
    }

    #[test]
    fn test_parse_package_main() {
        let main = parse_package_main("/p/package.json", br#"{"main":"lib/a.js"}"#).unwrap();
        assert_eq!(main.as_deref(), Some("lib/a.js"));

        let main = parse_package_main("/p/package.json", br#"{"name":"p"}"#).unwrap();
        assert_eq!(main, None);

        let main = parse_package_main("/p/package.json", br#"{"main":""}"#).unwrap();
        assert_eq!(main, None);

        let main = parse_package_main("/p/package.json", br#"{"main":7}"#).unwrap();
        assert_eq!(main, None);

        let result = parse_package_main("/p/package.json", b"[1]");
        assert!(matches!(result, Err(AsarError::InvalidPackage { .. })));

        let result = parse_package_main("/p/package.json", b"{");
        assert!(matches!(result, Err(AsarError::InvalidPackage { .. })));
    }
}
