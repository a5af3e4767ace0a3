//! Path resolution: walk the dentry tree from the root, one `/`-separated
//! component at a time, materializing inodes on demand.

use crate::block_dev::BlockDevice;
use crate::config::MAX_NAME_LEN;
use crate::error::{FsError, Result};
use crate::fs::Filesystem;
use crate::tree::{DentryId, FileType, name_eq};

/// Public classification of a lookup, for adapters and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub found: bool,
    pub is_root: bool,
    /// Name of the deepest matched dentry (the target on a hit, the last
    /// found ancestor on a miss).
    pub name: String,
    pub ftype: FileType,
}

/// Internal resolution result. `matched` counts the components that were
/// found; a create operation requires the miss to be exactly at the final
/// component (`matched + 1 == levels`).
pub(crate) struct Resolved {
    pub dentry: DentryId,
    pub found: bool,
    pub is_root: bool,
    pub levels: usize,
    pub matched: usize,
}

pub(crate) fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Final component of a path, validated against the name length limit.
pub(crate) fn leaf(path: &str) -> Result<&str> {
    match components(path).pop() {
        Some(name) if name.len() <= MAX_NAME_LEN => Ok(name),
        _ => Err(FsError::InvalidName),
    }
}

impl<D: BlockDevice> Filesystem<D> {
    /// Walks `path` from the root. On a full match the target dentry is
    /// returned with `found`; on a miss the deepest matched dentry is
    /// returned instead (a directory whose scan missed, or a plain file
    /// encountered mid-path). The returned dentry always has its inode
    /// materialized.
    pub(crate) fn resolve(&mut self, path: &str) -> Result<Resolved> {
        let parts = components(path);
        let levels = parts.len();
        if levels == 0 {
            self.ensure_loaded(self.root)?;
            return Ok(Resolved {
                dentry: self.root,
                found: true,
                is_root: true,
                levels: 0,
                matched: 0,
            });
        }

        let mut cursor = self.root;
        let mut matched = 0;
        let mut found = false;
        let mut result = cursor;

        for (level, part) in parts.iter().enumerate() {
            if part.len() > MAX_NAME_LEN {
                return Err(FsError::InvalidName);
            }
            self.ensure_loaded(cursor)?;
            let current = self.arena.get(cursor);

            if current.ftype == FileType::File {
                // Components remain but the cursor is a plain file.
                result = cursor;
                break;
            }

            let inode = current
                .inode
                .as_ref()
                .ok_or_else(|| FsError::Transport("inode not materialized".into()))?;
            let hit = inode
                .children
                .iter()
                .copied()
                .find(|&c| name_eq(&self.arena.get(c).name, part.as_bytes()));

            match hit {
                None => {
                    result = cursor;
                    break;
                }
                Some(child) => {
                    matched += 1;
                    if level + 1 == levels {
                        result = child;
                        found = true;
                        break;
                    }
                    cursor = child;
                }
            }
        }

        self.ensure_loaded(result)?;
        Ok(Resolved {
            dentry: result,
            found,
            is_root: false,
            levels,
            matched,
        })
    }

    /// Public lookup surface: classification plus the deepest matched
    /// dentry's name and type.
    pub fn lookup(&mut self, path: &str) -> Result<Lookup> {
        let resolved = self.resolve(path)?;
        let entry = self.arena.get(resolved.dentry);
        Ok(Lookup {
            found: resolved.found,
            is_root: resolved.is_root,
            name: entry.name_str(),
            ftype: entry.ftype,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn components_skip_empty() {
        assert_eq!(components("/a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(components("//a//b/"), vec!["a", "b"]);
        assert!(components("/").is_empty());
        assert!(components("").is_empty());
    }

    #[test]
    fn leaf_is_final_component() {
        assert_eq!(leaf("/a/b/c").unwrap(), "c");
        assert_eq!(leaf("/a").unwrap(), "a");
        assert_eq!(leaf("/").unwrap_err(), FsError::InvalidName);
    }
}
