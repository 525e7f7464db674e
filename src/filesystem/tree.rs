use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use snafu::{OptionExt, Snafu, ensure};

/// A node of the virtual tree. The node's name is its key in the parent's `children` map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilesystemNode {
    File {
        modified_time: SystemTime,
    },
    Directory {
        modified_time: SystemTime,
        children: HashMap<String, FilesystemNode>,
    },
}

impl FilesystemNode {
    pub fn file(modified_time: SystemTime) -> Self {
        FilesystemNode::File { modified_time }
    }

    pub fn directory(modified_time: SystemTime) -> Self {
        FilesystemNode::Directory {
            modified_time,
            children: HashMap::new(),
        }
    }

    pub fn modified_time(&self) -> SystemTime {
        match self {
            FilesystemNode::File { modified_time } => *modified_time,
            FilesystemNode::Directory { modified_time, .. } => *modified_time,
        }
    }

    #[cfg(test)]
    pub fn is_dir(&self) -> bool {
        matches!(self, FilesystemNode::Directory { .. })
    }

    pub fn children(&self) -> Option<&HashMap<String, FilesystemNode>> {
        match self {
            FilesystemNode::Directory { children, .. } => Some(children),
            FilesystemNode::File { .. } => None,
        }
    }

    fn set_modified_time(&mut self, at: SystemTime) {
        match self {
            FilesystemNode::File { modified_time } => *modified_time = at,
            FilesystemNode::Directory { modified_time, .. } => *modified_time = at,
        }
    }

    fn is_empty_dir(&self) -> bool {
        matches!(self, FilesystemNode::Directory { children, .. } if children.is_empty())
    }
}

/// In-memory model of a git working tree.
///
/// Git does not track directories, so neither does this tree: a directory exists only
/// while it holds at least one entry, and its mtime is always derived from the events
/// applied to its descendants. Paths are `/`-separated and relative to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualTree {
    root: FilesystemNode,
}

impl Default for VirtualTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTree {
    pub fn new() -> Self {
        Self {
            root: FilesystemNode::directory(SystemTime::UNIX_EPOCH),
        }
    }

    /// Creates a file at `path`, creating any missing parent directories.
    ///
    /// Every directory on the way, the root included, gets its mtime set to `at`.
    pub fn create(&mut self, path: &str, at: SystemTime) -> Result<(), TreeError> {
        let (parents, name) = split_path(path)?;
        self.ensure_creatable(path, &parents, name)?;

        let mut current = &mut self.root;
        for segment in parents {
            let FilesystemNode::Directory {
                modified_time,
                children,
            } = current
            else {
                return NotADirectorySnafu { path }.fail();
            };
            *modified_time = at;
            current = children
                .entry(segment.to_string())
                .or_insert_with(|| FilesystemNode::directory(at));
        }

        let FilesystemNode::Directory {
            modified_time,
            children,
        } = current
        else {
            return NotADirectorySnafu { path }.fail();
        };
        *modified_time = at;
        children.insert(name.to_string(), FilesystemNode::file(at));
        Ok(())
    }

    /// Sets the mtime of the node at `path`. Parents are left untouched.
    pub fn touch(&mut self, path: &str, at: SystemTime) -> Result<(), TreeError> {
        let (parents, name) = split_path(path)?;

        let mut current = &mut self.root;
        for segment in parents {
            let FilesystemNode::Directory { children, .. } = current else {
                return NotADirectorySnafu { path }.fail();
            };
            current = children.get_mut(segment).context(NotFoundSnafu { path })?;
        }

        let FilesystemNode::Directory { children, .. } = current else {
            return NotADirectorySnafu { path }.fail();
        };
        children
            .get_mut(name)
            .context(NotFoundSnafu { path })?
            .set_modified_time(at);
        Ok(())
    }

    /// Removes the node at `path`, then prunes every ancestor directory left empty.
    ///
    /// The parent of each removed node gets its mtime set to `at`. Pruning stops at the
    /// first ancestor that still has children; the root is never removed.
    pub fn remove(&mut self, path: &str, at: SystemTime) -> Result<(), TreeError> {
        let (parents, name) = split_path(path)?;
        remove_from(&mut self.root, path, &parents, name, at)
    }

    /// Moves the file at `from` to `to`.
    ///
    /// The destination keeps the source's mtime; `at` only applies to the directories
    /// affected by removing the source.
    pub fn rename(&mut self, from: &str, to: &str, at: SystemTime) -> Result<(), TreeError> {
        let source_time = self.get(from)?.modified_time();
        self.create(to, source_time)?;
        self.remove(from, at)
    }

    pub fn get(&self, path: &str) -> Result<&FilesystemNode, TreeError> {
        let (parents, name) = split_path(path)?;

        let mut current = &self.root;
        for segment in parents.into_iter().chain(std::iter::once(name)) {
            let children = current.children().context(NotADirectorySnafu { path })?;
            current = children.get(segment).context(NotFoundSnafu { path })?;
        }
        Ok(current)
    }

    #[cfg(test)]
    pub fn root(&self) -> &FilesystemNode {
        &self.root
    }

    /// Number of nodes in the tree, not counting the root.
    pub fn len(&self) -> usize {
        fn count(node: &FilesystemNode) -> usize {
            node.children()
                .map(|children| children.values().map(|child| 1 + count(child)).sum())
                .unwrap_or(0)
        }
        count(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.children().is_none_or(HashMap::is_empty)
    }

    /// Depth-first visit of every node except the root. Sibling order is unspecified.
    ///
    /// The callback receives each node together with its path relative to the root.
    /// The first error returned by the callback stops the walk.
    pub fn walk<E>(
        &self,
        mut callback: impl FnMut(&FilesystemNode, &Path) -> Result<(), E>,
    ) -> Result<(), E> {
        walk_node(&self.root, &PathBuf::new(), &mut callback)
    }

    fn ensure_creatable(&self, path: &str, parents: &[&str], name: &str) -> Result<(), TreeError> {
        let mut current = &self.root;
        for segment in parents {
            let children = current.children().context(NotADirectorySnafu { path })?;
            match children.get(*segment) {
                Some(node) => current = node,
                // The rest of the chain gets created
                None => return Ok(()),
            }
        }

        let children = current.children().context(NotADirectorySnafu { path })?;
        ensure!(!children.contains_key(name), AlreadyExistsSnafu { path });
        Ok(())
    }
}

fn remove_from(
    dir: &mut FilesystemNode,
    path: &str,
    parents: &[&str],
    name: &str,
    at: SystemTime,
) -> Result<(), TreeError> {
    let FilesystemNode::Directory {
        modified_time,
        children,
    } = dir
    else {
        return NotADirectorySnafu { path }.fail();
    };

    match parents.split_first() {
        None => {
            children.remove(name).context(NotFoundSnafu { path })?;
            *modified_time = at;
        }
        Some((segment, rest)) => {
            let child = children.get_mut(*segment).context(NotFoundSnafu { path })?;
            remove_from(child, path, rest, name, at)?;
            if child.is_empty_dir() {
                children.remove(*segment);
                *modified_time = at;
            }
        }
    }
    Ok(())
}

fn walk_node<E>(
    node: &FilesystemNode,
    path: &Path,
    callback: &mut impl FnMut(&FilesystemNode, &Path) -> Result<(), E>,
) -> Result<(), E> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for (name, child) in children {
        let child_path = path.join(name);
        callback(child, &child_path)?;
        walk_node(child, &child_path, callback)?;
    }
    Ok(())
}

/// Splits a `/`-separated path into its parent segments and final name.
fn split_path(path: &str) -> Result<(Vec<&str>, &str), TreeError> {
    let mut segments = path.split('/').collect::<Vec<_>>();
    ensure!(
        segments.iter().all(|segment| !segment.is_empty()),
        InvalidPathSnafu { path }
    );
    let name = segments.pop().context(InvalidPathSnafu { path })?;
    Ok((segments, name))
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum TreeError {
    #[snafu(display("No such file or directory: {path}"))]
    NotFound { path: String },
    #[snafu(display("File already exists: {path}"))]
    AlreadyExists { path: String },
    #[snafu(display("A parent of {path} is a file, not a directory"))]
    NotADirectory { path: String },
    #[snafu(display("Invalid path: {path:?}"))]
    InvalidPath { path: String },
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn mtime_of(tree: &VirtualTree, path: &str) -> SystemTime {
        tree.get(path).expect("node should exist").modified_time()
    }

    /// Every path in the tree, with a trailing `/` for directories, mapped to its mtime.
    fn snapshot(tree: &VirtualTree) -> BTreeMap<String, SystemTime> {
        let mut out = BTreeMap::new();
        tree.walk(|node, path| {
            let mut key = path.to_string_lossy().replace('\\', "/");
            if node.is_dir() {
                key.push('/');
            }
            out.insert(key, node.modified_time());
            Ok::<_, ()>(())
        })
        .expect("walk should not fail");
        out
    }

    fn assert_no_empty_dirs(tree: &VirtualTree) {
        tree.walk(|node, path| {
            assert!(!node.is_empty_dir(), "empty directory left at {}", path.display());
            Ok::<_, ()>(())
        })
        .unwrap();
    }

    #[test]
    fn new_tree_is_empty() {
        let tree = VirtualTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(tree.root().is_dir());
    }

    #[test]
    fn create_builds_missing_parents() {
        let mut tree = VirtualTree::new();
        tree.create("a/b/c.txt", at(10)).unwrap();

        assert_eq!(
            snapshot(&tree),
            BTreeMap::from([
                ("a/".to_string(), at(10)),
                ("a/b/".to_string(), at(10)),
                ("a/b/c.txt".to_string(), at(10)),
            ])
        );
        assert_eq!(tree.root().modified_time(), at(10));
    }

    #[test]
    fn create_bumps_existing_parents() {
        let mut tree = VirtualTree::new();
        tree.create("a/b", at(1)).unwrap();
        tree.create("a/c", at(2)).unwrap();

        assert_eq!(mtime_of(&tree, "a"), at(2));
        assert_eq!(mtime_of(&tree, "a/b"), at(1));
        assert_eq!(mtime_of(&tree, "a/c"), at(2));
        assert_eq!(tree.root().modified_time(), at(2));
    }

    #[test]
    fn create_fails_on_existing_file() {
        let mut tree = VirtualTree::new();
        tree.create("a/b", at(1)).unwrap();

        let result = tree.create("a/b", at(2));
        assert_eq!(
            result,
            Err(TreeError::AlreadyExists {
                path: "a/b".to_string()
            })
        );
        // Nothing was bumped by the failed call
        assert_eq!(mtime_of(&tree, "a"), at(1));
        assert_eq!(mtime_of(&tree, "a/b"), at(1));
    }

    #[test]
    fn create_fails_when_parent_is_a_file() {
        let mut tree = VirtualTree::new();
        tree.create("a", at(1)).unwrap();

        let result = tree.create("a/b/c", at(2));
        assert!(matches!(result, Err(TreeError::NotADirectory { .. })));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root().modified_time(), at(1));
    }

    #[rstest]
    #[case("")]
    #[case("/abs")]
    #[case("a//b")]
    #[case("trailing/")]
    fn invalid_paths_are_rejected(#[case] path: &str) {
        let mut tree = VirtualTree::new();
        let result = tree.create(path, at(1));
        assert!(matches!(result, Err(TreeError::InvalidPath { .. })));
        assert!(tree.is_empty());
    }

    #[test]
    fn touch_updates_only_the_node() {
        let mut tree = VirtualTree::new();
        tree.create("a/b", at(1)).unwrap();
        tree.touch("a/b", at(5)).unwrap();

        assert_eq!(mtime_of(&tree, "a/b"), at(5));
        assert_eq!(mtime_of(&tree, "a"), at(1));
        assert_eq!(tree.root().modified_time(), at(1));
    }

    #[test]
    fn touch_fails_on_missing_path() {
        let mut tree = VirtualTree::new();
        tree.create("a/b", at(1)).unwrap();

        assert!(matches!(
            tree.touch("a/c", at(2)),
            Err(TreeError::NotFound { .. })
        ));
        assert!(matches!(
            tree.touch("x/y", at(2)),
            Err(TreeError::NotFound { .. })
        ));
    }

    #[test]
    fn remove_prunes_empty_parents() {
        let mut tree = VirtualTree::new();
        tree.create("x/y", at(1)).unwrap();
        tree.remove("x/y", at(2)).unwrap();

        assert!(tree.is_empty());
        assert!(matches!(tree.get("x"), Err(TreeError::NotFound { .. })));
        assert!(matches!(tree.get("x/y"), Err(TreeError::NotFound { .. })));
        assert_eq!(tree.root().modified_time(), at(2));
    }

    #[test]
    fn remove_stops_pruning_at_first_non_empty_ancestor() {
        let mut tree = VirtualTree::new();
        tree.create("a/keep", at(1)).unwrap();
        tree.create("a/b/c/file", at(2)).unwrap();
        tree.create("other", at(3)).unwrap();
        tree.remove("a/b/c/file", at(4)).unwrap();

        assert_eq!(
            snapshot(&tree),
            BTreeMap::from([
                ("a/".to_string(), at(4)),
                ("a/keep".to_string(), at(1)),
                ("other".to_string(), at(3)),
            ])
        );
        // The root kept a child, so it was not touched
        assert_eq!(tree.root().modified_time(), at(3));
    }

    #[test]
    fn remove_fails_on_missing_path() {
        let mut tree = VirtualTree::new();
        tree.create("a/b", at(1)).unwrap();

        assert_eq!(
            tree.remove("a/c", at(2)),
            Err(TreeError::NotFound {
                path: "a/c".to_string()
            })
        );
        assert!(matches!(
            tree.remove("z/b", at(2)),
            Err(TreeError::NotFound { .. })
        ));
        assert_eq!(mtime_of(&tree, "a"), at(1));
    }

    #[test]
    fn recreate_after_remove_leaves_no_residue() {
        let mut tree = VirtualTree::new();
        tree.create("p/q", at(1)).unwrap();
        tree.remove("p/q", at(2)).unwrap();
        tree.create("p/q", at(3)).unwrap();

        assert_eq!(
            snapshot(&tree),
            BTreeMap::from([("p/".to_string(), at(3)), ("p/q".to_string(), at(3))])
        );
    }

    #[test]
    fn rename_keeps_source_mtime() {
        let mut tree = VirtualTree::new();
        tree.create("a", at(1)).unwrap();
        tree.rename("a", "b", at(2)).unwrap();

        assert!(matches!(tree.get("a"), Err(TreeError::NotFound { .. })));
        assert_eq!(mtime_of(&tree, "b"), at(1));
        assert_eq!(tree.root().modified_time(), at(2));
    }

    #[test]
    fn rename_across_directories() {
        let mut tree = VirtualTree::new();
        tree.create("src/old/lib.rs", at(1)).unwrap();
        tree.create("src/main.rs", at(2)).unwrap();
        tree.touch("src/old/lib.rs", at(3)).unwrap();
        tree.rename("src/old/lib.rs", "src/new/lib.rs", at(4)).unwrap();

        assert_eq!(
            snapshot(&tree),
            BTreeMap::from([
                ("src/".to_string(), at(4)),
                ("src/main.rs".to_string(), at(2)),
                ("src/new/".to_string(), at(3)),
                ("src/new/lib.rs".to_string(), at(3)),
            ])
        );
        assert_no_empty_dirs(&tree);
    }

    #[test]
    fn rename_fails_on_missing_source_or_existing_destination() {
        let mut tree = VirtualTree::new();
        tree.create("a", at(1)).unwrap();
        tree.create("b", at(2)).unwrap();

        assert!(matches!(
            tree.rename("missing", "c", at(3)),
            Err(TreeError::NotFound { .. })
        ));
        assert!(matches!(
            tree.rename("a", "b", at(3)),
            Err(TreeError::AlreadyExists { .. })
        ));
        assert_eq!(mtime_of(&tree, "a"), at(1));
        assert_eq!(mtime_of(&tree, "b"), at(2));
    }

    #[test]
    fn walk_visits_every_node_with_full_paths() {
        let mut tree = VirtualTree::new();
        tree.create("a/b/c", at(1)).unwrap();
        tree.create("a/d", at(2)).unwrap();
        tree.create("e", at(3)).unwrap();

        let mut visited = Vec::new();
        tree.walk(|_, path| {
            visited.push(path.to_path_buf());
            Ok::<_, ()>(())
        })
        .unwrap();
        visited.sort();

        let expected = ["a", "a/b", "a/b/c", "a/d", "e"]
            .iter()
            .map(|p| p.split('/').collect::<PathBuf>())
            .collect::<Vec<_>>();
        assert_eq!(visited, expected);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn walk_stops_on_first_error() {
        let mut tree = VirtualTree::new();
        tree.create("a", at(1)).unwrap();
        tree.create("b", at(1)).unwrap();

        let mut calls = 0;
        let result = tree.walk(|_, _| {
            calls += 1;
            Err("stop")
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn long_sequence_never_leaves_empty_directories() {
        let mut tree = VirtualTree::new();
        tree.create("docs/guide/intro.md", at(1)).unwrap();
        tree.create("docs/guide/setup.md", at(2)).unwrap();
        tree.create("src/a/b/c.rs", at(3)).unwrap();
        tree.rename("docs/guide/intro.md", "docs/intro.md", at(4))
            .unwrap();
        tree.remove("docs/guide/setup.md", at(5)).unwrap();
        tree.rename("src/a/b/c.rs", "c.rs", at(6)).unwrap();
        tree.touch("docs/intro.md", at(7)).unwrap();

        assert_no_empty_dirs(&tree);
        assert_eq!(
            snapshot(&tree),
            BTreeMap::from([
                ("c.rs".to_string(), at(3)),
                ("docs/".to_string(), at(5)),
                ("docs/intro.md".to_string(), at(7)),
            ])
        );
        assert_eq!(tree.root().modified_time(), at(6));
    }
}
