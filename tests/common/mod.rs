//! Shared helpers for the integration suites
//!
//! `ArchiveBuilder` lays archives out exactly like asar packers do, and
//! `script_evaluator` stands in for a script engine with a tiny line-based
//! command language.

#![allow(dead_code)]

use anyhow::Context;
use asar_rs::{from_fn, Evaluation, Evaluator, Filesystem, ModuleRegistry};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Builds asar archive bytes in memory
pub struct ArchiveBuilder {
    header: Value,
    payload: Vec<u8>,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            header: json!({ "files": {} }),
            payload: Vec::new(),
        }
    }

    /// Parent directory's entry map and the final segment of `path`
    fn parent_entries(&mut self, path: &str) -> (&mut Map<String, Value>, String) {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (name, parents) = segments.split_last().expect("path has a name");

        let mut dir = &mut self.header;
        for segment in parents {
            dir = dir["files"]
                .as_object_mut()
                .expect("parent is a directory")
                .entry(segment.to_string())
                .or_insert_with(|| json!({ "files": {} }));
        }
        let entries = dir["files"]
            .as_object_mut()
            .expect("parent is a directory");
        (entries, name.to_string())
    }

    fn insert(mut self, path: &str, entry: Value) -> Self {
        let (entries, name) = self.parent_entries(path);
        entries.insert(name, entry);
        self
    }

    /// Add a packed file
    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        let offset = self.payload.len();
        self.payload.extend_from_slice(data);
        self.insert(
            path,
            json!({ "size": data.len(), "offset": offset.to_string() }),
        )
    }

    /// Add a packed file with the given text
    pub fn text(self, path: &str, text: &str) -> Self {
        self.file(path, text.as_bytes())
    }

    /// Add a file flagged executable
    pub fn executable(mut self, path: &str, data: &[u8]) -> Self {
        let offset = self.payload.len();
        self.payload.extend_from_slice(data);
        self.insert(
            path,
            json!({ "size": data.len(), "offset": offset.to_string(), "executable": true }),
        )
    }

    /// Add a packed file with an integrity block
    pub fn file_with_integrity(mut self, path: &str, data: &[u8], block_size: usize) -> Self {
        let offset = self.payload.len();
        self.payload.extend_from_slice(data);
        let blocks: Vec<String> = data
            .chunks(block_size)
            .map(|chunk| hex::encode(Sha256::digest(chunk)))
            .collect();
        self.insert(
            path,
            json!({
                "size": data.len(),
                "offset": offset.to_string(),
                "integrity": {
                    "algorithm": "SHA256",
                    "hash": hex::encode(Sha256::digest(data)),
                    "blockSize": block_size,
                    "blocks": blocks
                }
            }),
        )
    }

    /// Add a file whose content lives outside the archive
    pub fn unpacked(self, path: &str, size: u64) -> Self {
        self.insert(path, json!({ "size": size, "unpacked": true }))
    }

    /// Add an empty directory
    pub fn dir(self, path: &str) -> Self {
        self.insert(path, json!({ "files": {} }))
    }

    /// Add a symlink pointing at `target`
    pub fn symlink(self, path: &str, target: &str) -> Self {
        self.insert(path, json!({ "link": target }))
    }

    /// Archive bytes: size pickle, header pickle, payload
    pub fn build(&self) -> Vec<u8> {
        encode_archive(&self.header.to_string(), &self.payload)
    }

    pub fn filesystem(&self) -> Filesystem {
        Filesystem::new(self.build()).expect("builder produces valid archives")
    }

    /// Registry over this archive with `.js` handled by [`script_evaluator`]
    pub fn registry(&self) -> ModuleRegistry {
        let registry = ModuleRegistry::new(Arc::new(self.filesystem()));
        registry.register_extension(".js", script_evaluator());
        registry
    }
}

/// Lay out a header JSON string and payload as an asar archive
pub fn encode_archive(json: &str, payload: &[u8]) -> Vec<u8> {
    let aligned = (json.len() + 3) / 4 * 4;
    let header_payload = 4 + aligned;
    let header_size = 4 + header_payload;

    let mut buf = Vec::with_capacity(8 + header_size + payload.len());
    buf.extend_from_slice(&4u32.to_le_bytes());
    buf.extend_from_slice(&(header_size as u32).to_le_bytes());
    buf.extend_from_slice(&(header_payload as u32).to_le_bytes());
    buf.extend_from_slice(&(json.len() as i32).to_le_bytes());
    buf.extend_from_slice(json.as_bytes());
    buf.resize(8 + header_size, 0);
    buf.extend_from_slice(payload);
    buf
}

/// Evaluator for test scripts, one command per line:
///
/// - `set <key> <json>`: export a value
/// - `replace <json>`: replace the whole exports value
/// - `require <request> as <key>`: export a snapshot of another module
/// - `main <key>`: export the registry's main filename
/// - `fail <message>`: abort evaluation
pub fn script_evaluator() -> impl Evaluator + Send + Sync + 'static {
    from_fn(|cx: Evaluation<'_>| {
        let source = std::str::from_utf8(cx.source)?;
        for line in source.lines().map(str::trim) {
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            match command {
                "set" => {
                    let (key, value) = rest.split_once(' ').context("set needs a key and a value")?;
                    cx.exports.insert(key, serde_json::from_str(value)?);
                }
                "replace" => cx.exports.set(serde_json::from_str(rest)?),
                "require" => {
                    let (request, key) = rest
                        .split_once(" as ")
                        .context("require needs `<request> as <key>`")?;
                    let required = cx.require.require(request)?;
                    cx.exports.insert(key, required.get());
                }
                "main" => cx.exports.insert(rest, json!(cx.require.main())),
                "fail" => anyhow::bail!("{}", rest),
                other => anyhow::bail!("unknown command {:?} in {}", other, cx.filename),
            }
        }
        Ok(())
    })
}
