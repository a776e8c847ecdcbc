use crate::error::{AsarError, Result};
use crate::path;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Per-file integrity block written by recent asar packers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integrity {
    /// Hash algorithm, `SHA256` in every known archive
    pub algorithm: String,
    /// Hex digest of the whole file
    pub hash: String,
    /// Size of each hashed block in bytes
    pub block_size: u64,
    /// Hex digest of each block, in order
    pub blocks: Vec<String>,
}

/// Packed or unpacked file entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    pub size: u64,
    /// Offset relative to the payload region
    pub offset: u64,
    /// Content lives next to the archive, not inside it
    pub unpacked: bool,
    pub executable: bool,
    pub integrity: Option<Integrity>,
}

/// Directory entry with children in declared order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryNode {
    pub entries: IndexMap<String, Node>,
}

/// Node of the archive's directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File(FileNode),
    Directory(DirectoryNode),
    Symlink { link: String },
}

/// File entry fields as they appear in the header JSON
#[derive(Deserialize)]
struct RawFile {
    #[serde(default)]
    size: u64,
    #[serde(default)]
    offset: Option<RawOffset>,
    #[serde(default)]
    unpacked: bool,
    #[serde(default)]
    executable: bool,
    #[serde(default)]
    integrity: Option<Integrity>,
}

/// Offsets are written as decimal strings so they survive 53-bit JSON numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum RawOffset {
    Text(String),
    Number(u64),
}

impl Node {
    /// Build the tree from the decoded header document
    pub fn from_header(document: &Value) -> Result<Self> {
        match document.get("files") {
            Some(Value::Object(_)) => Self::from_value(document, "/"),
            _ => Err(AsarError::MalformedHeader(
                "header root has no \"files\" object".to_string(),
            )),
        }
    }

    fn from_value(value: &Value, at: &str) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            AsarError::MalformedHeader(format!("entry {} is not an object", at))
        })?;

        if let Some(files) = object.get("files") {
            let files = files.as_object().ok_or_else(|| {
                AsarError::MalformedHeader(format!("\"files\" of {} is not an object", at))
            })?;
            let mut entries = IndexMap::with_capacity(files.len());
            for (name, child) in files {
                let child_path = path::join([at, name.as_str()]);
                entries.insert(name.clone(), Self::from_value(child, &child_path)?);
            }
            return Ok(Node::Directory(DirectoryNode { entries }));
        }

        if let Some(link) = object.get("link") {
            let link = link.as_str().ok_or_else(|| {
                AsarError::MalformedHeader(format!("link of {} is not a string", at))
            })?;
            return Ok(Node::Symlink {
                link: link.to_string(),
            });
        }

        let raw = RawFile::deserialize(value)
            .map_err(|e| AsarError::MalformedHeader(format!("file entry {}: {}", at, e)))?;
        let offset = match raw.offset {
            Some(RawOffset::Text(text)) => text.trim().parse::<u64>().map_err(|_| {
                AsarError::MalformedHeader(format!("invalid offset {:?} for {}", text, at))
            })?,
            Some(RawOffset::Number(number)) => number,
            None if raw.unpacked || raw.size == 0 => 0,
            None => {
                return Err(AsarError::MalformedHeader(format!(
                    "packed file {} has no offset",
                    at
                )))
            }
        };

        Ok(Node::File(FileNode {
            size: raw.size,
            offset,
            unpacked: raw.unpacked,
            executable: raw.executable,
            integrity: raw.integrity,
        }))
    }

    pub fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            Node::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(file) => Some(file),
            _ => None,
        }
    }

    /// Pre-order walk over every descendant of this node
    pub fn walk(&self) -> Walk<'_> {
        let mut walk = Walk { stack: Vec::new() };
        walk.push_children("/", self);
        walk
    }
}

/// Iterator returned by [`Node::walk`], yielding `(full path, node)`
pub struct Walk<'a> {
    stack: Vec<(String, &'a Node)>,
}

impl<'a> Walk<'a> {
    fn push_children(&mut self, parent: &str, node: &'a Node) {
        if let Node::Directory(dir) = node {
            // Reversed so the first declared entry is popped first
            for (name, child) in dir.entries.iter().rev() {
                self.stack.push((path::join([parent, name.as_str()]), child));
            }
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = (String, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, node) = self.stack.pop()?;
        self.push_children(&path, node);
        Some((path, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_header() {
        let document = json!({
            "files": {
                "b.txt": { "size": 3, "offset": "10", "executable": true },
                "a": { "files": { "link": { "link": "b.txt" } } },
                "big.bin": { "size": 9, "unpacked": true }
            }
        });

        let root = Node::from_header(&document).unwrap();
        let dir = root.as_directory().unwrap();
        let names: Vec<&str> = dir.entries.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["b.txt", "a", "big.bin"]);

        let file = dir.entries["b.txt"].as_file().unwrap();
        assert_eq!(file.size, 3);
        assert_eq!(file.offset, 10);
        assert!(file.executable);
        assert!(!file.unpacked);

        // A directory entry literally named "link" is still a directory child
        let a = dir.entries["a"].as_directory().unwrap();
        assert_eq!(
            a.entries["link"],
            Node::Symlink {
                link: "b.txt".to_string()
            }
        );

        let big = dir.entries["big.bin"].as_file().unwrap();
        assert!(big.unpacked);
        assert_eq!(big.offset, 0);
    }

    #[test]
    fn test_numeric_offset_accepted() {
        let document = json!({ "files": { "x": { "size": 1, "offset": 42 } } });
        let root = Node::from_header(&document).unwrap();
        let file = root.as_directory().unwrap().entries["x"].as_file().unwrap();
        assert_eq!(file.offset, 42);
    }

    #[test]
    fn test_malformed_entries() {
        let bad = [
            json!([]),
            json!({ "nofiles": {} }),
            json!({ "files": [] }),
            json!({ "files": { "x": 5 } }),
            json!({ "files": { "x": { "link": 5 } } }),
            json!({ "files": { "x": { "size": 1, "offset": "abc" } } }),
            json!({ "files": { "x": { "size": 1 } } }),
            json!({ "files": { "x": { "size": -1, "offset": "0" } } }),
        ];
        for document in bad {
            let result = Node::from_header(&document);
            assert!(
                matches!(result, Err(AsarError::MalformedHeader(_))),
                "{} should be rejected",
                document
            );
        }
    }

    #[test]
    fn test_walk_is_preorder() {
        let document = json!({
            "files": {
                "a": { "files": {
                    "b": { "files": { "c.js": { "size": 0 } } },
                    "d.js": { "size": 0 }
                } },
                "e.js": { "size": 0 }
            }
        });
        let root = Node::from_header(&document).unwrap();
        let paths: Vec<String> = root.walk().map(|(path, _)| path).collect();
        assert_eq!(paths, vec!["/a", "/a/b", "/a/b/c.js", "/a/d.js", "/e.js"]);
    }
}
