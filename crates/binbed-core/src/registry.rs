//! Bookkeeping of which files belong to which (target, group) pair.
//!
//! The registry is an explicit value created fresh for each build
//! invocation and passed through registration and generation. It enforces
//! the build-wide invariants:
//!
//! - a group name belongs to exactly one target
//! - identifiers are unique within a group
//! - a group keeps its registration order
//!
//! Apart from probing that a file can be opened, nothing is read or copied
//! at this stage.

use crate::error::{Error, NameKind, Result};
use crate::symbol::{self, Identifier};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// A file registered for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFile {
    path: PathBuf,
    target: String,
    group: String,
    symbol: Identifier,
}

impl ResourceFile {
    /// Absolute path of the source file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the owning target
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Name of the owning group
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Identifier of the generated descriptor
    pub fn symbol(&self) -> &Identifier {
        &self.symbol
    }
}

/// A named, ordered, target-exclusive collection of resources
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    target: String,
    resources: Vec<ResourceFile>,
    finalized: bool,
}

impl Group {
    fn new(name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            resources: Vec::new(),
            finalized: false,
        }
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning target
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Resources in registration order
    pub fn resources(&self) -> &[ResourceFile] {
        &self.resources
    }

    /// Whether artifacts have been generated for this group
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.finalized = true;
    }
}

/// Registry of every resource registered during one build run
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    /// Groups in order of first registration
    groups: Vec<Group>,
    /// Maps group name -> index into `groups`
    index: HashMap<String, usize>,
    /// Maps target name -> IDE folder
    ide_folders: HashMap<String, String>,
}

impl ResourceRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` as a member of `group`, owned by `target`.
    ///
    /// On failure the registry is left exactly as it was.
    pub fn register(
        &mut self,
        target: &str,
        group: &str,
        path: impl AsRef<Path>,
    ) -> Result<&ResourceFile> {
        let path = path.as_ref();
        validate_target_name(target)?;
        validate_group_name(group)?;
        probe_resource(target, group, path)?;

        let existing = self.index.get(group).copied();
        if let Some(idx) = existing {
            let owner = &self.groups[idx];
            if owner.target != target {
                return Err(Error::group_conflict(group, &owner.target, target));
            }
            if owner.finalized {
                return Err(Error::group_finalized(group));
            }
        }

        let symbol = symbol::name_for(path).map_err(|_| {
            Error::invalid_resource(target, group, path, "path has no file name")
        })?;
        if let Some(idx) = existing {
            symbol::check_collision(group, &self.groups[idx].resources, path, &symbol)?;
        }

        let idx = match existing {
            Some(idx) => idx,
            None => {
                self.check_target_spelling(target)?;
                self.check_group_spelling(group)?;
                debug!("Creating group '{}' for target '{}'", group, target);
                self.groups.push(Group::new(group, target));
                let idx = self.groups.len() - 1;
                self.index.insert(group.to_string(), idx);
                idx
            }
        };

        trace!(
            "Registered {} as '{}' in group '{}'",
            path.display(),
            symbol,
            group
        );

        let resources = &mut self.groups[idx].resources;
        resources.push(ResourceFile {
            path: path.to_path_buf(),
            target: target.to_string(),
            group: group.to_string(),
            symbol,
        });
        Ok(&resources[resources.len() - 1])
    }

    /// Reject a new group whose generated names would clash with an
    /// existing group's (`ui-icons` and `ui_icons`, `Images` and `images`)
    fn check_group_spelling(&self, group: &str) -> Result<()> {
        let folded = symbol::sanitize(group).to_ascii_lowercase();
        match self
            .groups
            .iter()
            .find(|g| symbol::sanitize(&g.name).to_ascii_lowercase() == folded)
        {
            Some(other) => Err(Error::invalid_name(
                NameKind::Group,
                group,
                format!("generated names would clash with group '{}'", other.name),
            )),
            None => Ok(()),
        }
    }

    /// Reject a new target whose file names would clash with an existing
    /// target's (`my-app` and `my_app`, `App` and `app`)
    fn check_target_spelling(&self, target: &str) -> Result<()> {
        if self.groups.iter().any(|g| g.target == target) {
            return Ok(());
        }
        let folded = symbol::sanitize(target).to_ascii_lowercase();
        match self
            .groups
            .iter()
            .find(|g| symbol::sanitize(&g.target).to_ascii_lowercase() == folded)
        {
            Some(other) => Err(Error::invalid_name(
                NameKind::Target,
                target,
                format!("generated file names would clash with target '{}'", other.target),
            )),
            None => Ok(()),
        }
    }

    /// Put a target's generated files under a named bucket in IDE project
    /// views. Purely cosmetic; always succeeds.
    pub fn set_ide_folder(&mut self, target: &str, folder: impl Into<String>) {
        self.ide_folders.insert(target.to_string(), folder.into());
    }

    /// IDE folder previously set for `target`
    pub fn ide_folder(&self, target: &str) -> Option<&str> {
        self.ide_folders.get(target).map(String::as_str)
    }

    /// Looks up a group by name
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.index.get(name).map(|&idx| &self.groups[idx])
    }

    pub(crate) fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        self.index.get(name).map(|&idx| &mut self.groups[idx])
    }

    /// All groups in order of first registration
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    /// Groups owned by `target`, in order of first registration
    pub fn groups_for_target<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a Group> + 'a {
        self.groups.iter().filter(move |g| g.target == target)
    }

    /// Distinct target names, in order of first registration
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        for group in &self.groups {
            if !targets.contains(&group.target.as_str()) {
                targets.push(&group.target);
            }
        }
        targets
    }

    /// Total number of registered resources
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.resources.len()).sum()
    }

    /// Returns true if nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn validate_target_name(target: &str) -> Result<()> {
    if target.trim().is_empty() {
        return Err(Error::invalid_name(NameKind::Target, target, "name is empty"));
    }
    Ok(())
}

/// Group names become a directory and part of every generated symbol
fn validate_group_name(group: &str) -> Result<()> {
    if group.is_empty() {
        return Err(Error::invalid_name(NameKind::Group, group, "name is empty"));
    }
    if group.starts_with('.') {
        return Err(Error::invalid_name(
            NameKind::Group,
            group,
            "name must not start with '.'",
        ));
    }
    if let Some(c) = group
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(Error::invalid_name(
            NameKind::Group,
            group,
            format!("character '{}' is not allowed", c),
        ));
    }
    Ok(())
}

/// Check that `path` names a readable regular file
fn probe_resource(target: &str, group: &str, path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::invalid_resource(target, group, path, "path is not absolute"));
    }
    let metadata = fs::metadata(path)
        .map_err(|e| Error::invalid_resource(target, group, path, e.to_string()))?;
    if !metadata.is_file() {
        return Err(Error::invalid_resource(target, group, path, "not a regular file"));
    }
    fs::File::open(path)
        .map_err(|e| Error::invalid_resource(target, group, path, e.to_string()))?;
    Ok(())
}
