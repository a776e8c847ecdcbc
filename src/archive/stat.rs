use crate::archive::node::Node;

/// Kind of a node at the time it was stat'ed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    Symlink,
}

/// Metadata snapshot of one archive node
///
/// Holds no reference back into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub size: u64,
    kind: NodeKind,
    unpacked: bool,
    executable: bool,
}

impl Stat {
    pub(crate) fn of(node: &Node) -> Self {
        match node {
            Node::File(file) => Self {
                size: file.size,
                kind: NodeKind::File,
                unpacked: file.unpacked,
                executable: file.executable,
            },
            Node::Directory(_) => Self {
                size: 0,
                kind: NodeKind::Directory,
                unpacked: false,
                executable: false,
            },
            Node::Symlink { .. } => Self {
                size: 0,
                kind: NodeKind::Symlink,
                unpacked: false,
                executable: false,
            },
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.kind == NodeKind::Symlink
    }

    /// File content is stored outside the archive
    pub fn is_unpacked(&self) -> bool {
        self.unpacked
    }

    pub fn is_executable(&self) -> bool {
        self.executable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::node::{DirectoryNode, FileNode};

    #[test]
    fn test_stat_predicates() {
        let file = Stat::of(&Node::File(FileNode {
            size: 12,
            offset: 0,
            unpacked: true,
            executable: false,
            integrity: None,
        }));
        assert_eq!(file.size, 12);
        assert!(file.is_file());
        assert!(file.is_unpacked());
        assert!(!file.is_directory());
        assert!(!file.is_symbolic_link());

        let dir = Stat::of(&Node::Directory(DirectoryNode::default()));
        assert_eq!(dir.size, 0);
        assert!(dir.is_directory());
        assert!(!dir.is_file());

        let link = Stat::of(&Node::Symlink {
            link: "a".to_string(),
        });
        assert!(link.is_symbolic_link());
        assert!(!link.is_file());
        assert_eq!(link.kind(), NodeKind::Symlink);
    }
}
