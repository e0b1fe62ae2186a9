//! Where generated files land under the output directory.
//!
//! ```text
//! <root>/include/<group>/<group>.h   one header per group
//! <root>/src/<group>/...             embedder artifacts
//! ```

use std::path::{Path, PathBuf};

/// Paths of generated files relative to an output root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Creates a layout rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The output root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory added to consumers' include path
    pub fn include_root(&self) -> PathBuf {
        self.root.join("include")
    }

    /// Header of `group`, reachable as `<group>/<group>.h` from the include root
    pub fn header_path(&self, group: &str) -> PathBuf {
        self.include_root().join(group).join(format!("{}.h", group))
    }

    /// Directory holding the embedder artifacts of `group`
    pub fn group_dir(&self, group: &str) -> PathBuf {
        self.root.join("src").join(group)
    }
}
