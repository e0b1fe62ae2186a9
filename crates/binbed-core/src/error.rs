//! Error types for the binbed-core library.
//!
//! Every variant carries enough context (target, group, path) for a build
//! tool to surface an actionable diagnostic without further lookups.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for binbed operations
pub type Result<T> = std::result::Result<T, Error>;

/// How far the damage of a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// Only the offending registration call is rejected
    Registration,
    /// The generation of the affected group cannot proceed
    Group,
    /// The whole build run must stop
    Build,
}

/// Which kind of name failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// A target name
    Target,
    /// A group name
    Group,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Target => f.write_str("target"),
            NameKind::Group => f.write_str("group"),
        }
    }
}

/// Error type for all binbed operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A resource file is missing or unreadable at registration time
    #[error("invalid resource '{path}' in group '{group}' of target '{target}': {reason}")]
    InvalidResource {
        /// Target the registration was made for
        target: String,
        /// Group the registration was made for
        group: String,
        /// Offending path
        path: PathBuf,
        /// Why the file was rejected
        reason: String,
    },

    /// A group name is already owned by another target
    #[error(
        "group '{group}' is already bound to target '{existing_target}', \
         cannot register it under target '{requested_target}'"
    )]
    GroupConflict {
        /// The contested group name
        group: String,
        /// Target that owns the group
        existing_target: String,
        /// Target that attempted to claim it
        requested_target: String,
    },

    /// Two files of one group derive the same identifier
    #[error(
        "symbol collision in group '{group}': '{}' and '{}' both map to identifier '{identifier}'",
        .existing.display(),
        .conflicting.display()
    )]
    SymbolCollision {
        /// Group containing both files
        group: String,
        /// The shared identifier
        identifier: String,
        /// Path registered first
        existing: PathBuf,
        /// Path that was rejected
        conflicting: PathBuf,
    },

    /// The platform embedder could not produce an artifact for a resource
    #[error("failed to embed '{path}' in group '{group}' of target '{target}': {details}")]
    EmbedFailure {
        /// Owning target
        target: String,
        /// Owning group
        group: String,
        /// Resource path
        path: PathBuf,
        /// What went wrong
        details: String,
    },

    /// A target or group name is not usable
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        /// Whether a target or a group name was rejected
        kind: NameKind,
        /// The rejected name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// The group was already finalized and can no longer change
    #[error("group '{group}' has already been finalized")]
    GroupFinalized {
        /// The finalized group
        group: String,
    },

    /// Failed to write a generated file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create an output directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new invalid resource error
    pub fn invalid_resource(
        target: impl Into<String>,
        group: impl Into<String>,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidResource {
            target: target.into(),
            group: group.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new group conflict error
    pub fn group_conflict(
        group: impl Into<String>,
        existing_target: impl Into<String>,
        requested_target: impl Into<String>,
    ) -> Self {
        Self::GroupConflict {
            group: group.into(),
            existing_target: existing_target.into(),
            requested_target: requested_target.into(),
        }
    }

    /// Creates a new symbol collision error
    pub fn symbol_collision(
        group: impl Into<String>,
        identifier: impl Into<String>,
        existing: impl Into<PathBuf>,
        conflicting: impl Into<PathBuf>,
    ) -> Self {
        Self::SymbolCollision {
            group: group.into(),
            identifier: identifier.into(),
            existing: existing.into(),
            conflicting: conflicting.into(),
        }
    }

    /// Creates a new embed failure
    pub fn embed_failure(
        target: impl Into<String>,
        group: impl Into<String>,
        path: impl Into<PathBuf>,
        details: impl Into<String>,
    ) -> Self {
        Self::EmbedFailure {
            target: target.into(),
            group: group.into(),
            path: path.into(),
            details: details.into(),
        }
    }

    /// Creates a new invalid name error
    pub fn invalid_name(kind: NameKind, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new finalized group error
    pub fn group_finalized(group: impl Into<String>) -> Self {
        Self::GroupFinalized {
            group: group.into(),
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns how far this failure reaches.
    ///
    /// None of these are worth retrying: the same inputs fail the same way.
    pub fn scope(&self) -> FailureScope {
        match self {
            Self::InvalidResource { .. } | Self::InvalidName { .. } => FailureScope::Registration,
            Self::SymbolCollision { .. } | Self::EmbedFailure { .. } | Self::GroupFinalized { .. } => {
                FailureScope::Group
            }
            Self::GroupConflict { .. }
            | Self::FileWrite { .. }
            | Self::DirectoryCreate { .. }
            | Self::Internal(_) => FailureScope::Build,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::group_conflict("g1", "A", "B");
        let msg = err.to_string();
        assert!(msg.contains("'g1'"));
        assert!(msg.contains("'A'"));
        assert!(msg.contains("'B'"));

        let err = Error::symbol_collision("images", "a", "/res/a.png", "/res/a.bin");
        let msg = err.to_string();
        assert!(msg.contains("/res/a.png"));
        assert!(msg.contains("/res/a.bin"));
        assert!(msg.contains("'a'"));
    }

    #[test]
    fn test_invalid_resource_names_everything() {
        let err = Error::invalid_resource("T", "images", "/missing.png", "not found");
        let msg = err.to_string();
        assert!(msg.contains("T"));
        assert!(msg.contains("images"));
        assert!(msg.contains("/missing.png"));
    }

    #[test]
    fn test_scope() {
        assert_eq!(
            Error::invalid_resource("t", "g", "/p", "x").scope(),
            FailureScope::Registration
        );
        assert_eq!(
            Error::symbol_collision("g", "a", "/a.png", "/a.bin").scope(),
            FailureScope::Group
        );
        assert_eq!(Error::group_conflict("g", "a", "b").scope(), FailureScope::Build);
        assert_eq!(
            Error::invalid_name(NameKind::Group, "", "empty").scope(),
            FailureScope::Registration
        );
    }
}
