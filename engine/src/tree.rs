//! Directory tree built from collected file paths

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node in the repository tree
///
/// Serializes as a nested JSON object whose leaves are `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    File,
    Directory(BTreeMap<String, TreeNode>),
}

impl Default for TreeNode {
    fn default() -> Self {
        Self::Directory(BTreeMap::new())
    }
}

impl TreeNode {
    /// Build a tree from forward-slash relative paths
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = Self::default();
        for path in paths {
            root.insert(path.as_ref());
        }
        root
    }

    /// Insert a file path, creating intermediate directories
    pub fn insert(&mut self, path: &str) {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((file, dirs)) = segments.split_last() else {
            return;
        };

        let mut current = self;
        for dir in dirs {
            // A leaf reused as a directory name becomes a directory
            if current.is_file() {
                *current = Self::default();
            }
            current = match current {
                Self::Directory(children) => children.entry((*dir).to_owned()).or_default(),
                Self::File => return,
            };
        }

        if current.is_file() {
            *current = Self::default();
        }
        if let Self::Directory(children) = current {
            children.entry((*file).to_owned()).or_insert(Self::File);
        }
    }

    /// Child node by name, if this is a directory
    pub fn get(&self, name: &str) -> Option<&TreeNode> {
        match self {
            Self::Directory(children) => children.get(name),
            Self::File => None,
        }
    }

    /// Names of direct children, sorted
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Directory(children) => children.keys().map(String::as_str).collect(),
            Self::File => Vec::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Directory(children) => children.is_empty(),
            Self::File => false,
        }
    }

    /// Number of file leaves below this node
    pub fn file_count(&self) -> usize {
        match self {
            Self::File => 1,
            Self::Directory(children) => children.values().map(Self::file_count).sum(),
        }
    }

    /// Render as an indented listing, directories suffixed with `/`
    pub fn render(&self) -> String {
        let mut output = String::new();
        self.render_into(&mut output, 0);
        output
    }

    fn render_into(&self, output: &mut String, depth: usize) {
        if let Self::Directory(children) = self {
            for (name, child) in children {
                output.push_str(&"  ".repeat(depth));
                output.push_str(name);
                if child.is_file() {
                    output.push('\n');
                } else {
                    output.push_str("/\n");
                    child.render_into(output, depth + 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nested_tree() {
        let tree = TreeNode::from_paths(["a.py", "d/b.py", "d/e/c.js"]);

        assert_eq!(tree.keys(), vec!["a.py", "d"]);
        let d = tree.get("d").unwrap();
        assert_eq!(d.keys(), vec!["b.py", "e"]);
        let e = d.get("e").unwrap();
        assert_eq!(e.keys(), vec!["c.js"]);
        assert!(e.get("c.js").unwrap().is_file());
        assert_eq!(tree.file_count(), 3);
    }

    #[test]
    fn test_serializes_leaves_as_null() {
        let tree = TreeNode::from_paths(["main.py", "folder/file.py"]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"main.py": null, "folder": {"file.py": null}})
        );

        let back: TreeNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_render() {
        let tree = TreeNode::from_paths(["src/lib.rs", "README.md"]);
        assert_eq!(tree.render(), "README.md\nsrc/\n  lib.rs\n");
    }

    #[test]
    fn test_empty_tree() {
        let tree = TreeNode::from_paths(Vec::<String>::new());
        assert!(tree.is_empty());
        assert_eq!(tree.file_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_every_path_is_reachable(paths in proptest::collection::btree_set("[a-c]{1,3}(/[a-c]{1,3}){0,2}\\.rs", 1..12)) {
            let tree = TreeNode::from_paths(&paths);
            for path in &paths {
                let mut node = &tree;
                for segment in path.split('/') {
                    node = node.get(segment).expect("segment present");
                }
                prop_assert!(node.is_file());
            }
        }
    }
}
