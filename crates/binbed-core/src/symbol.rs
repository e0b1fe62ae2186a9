//! Identifier derivation for embedded resources.
//!
//! Every resource is exposed to application code through an externally
//! linked object whose name is derived from the resource's file name:
//!
//! 1. take the base name and strip the last extension (`mona_lisa.png` → `mona_lisa`)
//! 2. replace every character outside `[A-Za-z0-9_]` with `_`
//! 3. prefix a leading digit with `_` (`1x.png` → `_1x`)
//! 4. prefix C and C++ keywords with `_` (`int.bin` → `_int`)

use crate::error::{Error, Result};
use crate::registry::ResourceFile;
use std::fmt;
use std::path::Path;

/// Keywords that cannot name an object in C or C++
const RESERVED_WORDS: &[&str] = &[
    "alignas", "alignof", "and", "asm", "auto", "bool", "break", "case", "catch", "char",
    "class", "const", "constexpr", "continue", "default", "delete", "do", "double", "else",
    "enum", "explicit", "export", "extern", "false", "float", "for", "friend", "goto", "if",
    "inline", "int", "long", "mutable", "namespace", "new", "noexcept", "not", "nullptr",
    "operator", "or", "private", "protected", "public", "register", "restrict", "return",
    "short", "signed", "sizeof", "static", "struct", "switch", "template", "this", "throw",
    "true", "try", "typedef", "typeid", "typename", "union", "unsigned", "using", "virtual",
    "void", "volatile", "while", "xor",
];

/// A valid externally-linked identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turn an arbitrary name into identifier characters.
///
/// Also used for group names when they become part of a symbol or an
/// include guard.
pub fn sanitize(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            result.push(c);
        } else {
            result.push('_');
        }
    }
    if result.is_empty() || result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    result
}

/// Derive the identifier for a resource file
pub fn name_for(path: &Path) -> Result<Identifier> {
    // file_stem strips only the last extension: `a.tar.gz` -> `a.tar`
    let stem = path.file_stem().ok_or_else(|| {
        Error::invalid_resource("", "", path, "path has no file name to derive a symbol from")
    })?;

    let mut ident = sanitize(&stem.to_string_lossy());
    if RESERVED_WORDS.contains(&ident.as_str()) {
        ident.insert(0, '_');
    }
    Ok(Identifier(ident))
}

/// Fail if `identifier` is already taken by a member of `existing`
pub fn check_collision(
    group: &str,
    existing: &[ResourceFile],
    candidate: &Path,
    identifier: &Identifier,
) -> Result<()> {
    match existing.iter().find(|r| r.symbol() == identifier) {
        Some(taken) => Err(Error::symbol_collision(
            group,
            identifier.as_str(),
            taken.path(),
            candidate,
        )),
        None => Ok(()),
    }
}
