mod filesystem;
mod format;
mod node;
mod stat;

pub use filesystem::{Filesystem, ListOptions};
pub use format::{align_int, Pickle, RawHeader, PICKLE_ALIGNMENT, SIZE_PICKLE_LENGTH};
pub use node::{DirectoryNode, FileNode, Integrity, Node, Walk};
pub use stat::{NodeKind, Stat};
