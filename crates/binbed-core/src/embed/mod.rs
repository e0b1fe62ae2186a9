//! Platform embedders.
//!
//! An [`Embedder`] turns registered resources into native build inputs that
//! place the raw bytes inside the final binary and define one descriptor per
//! resource. Two mechanisms exist:
//!
//! - [`LinkSectionEmbedder`]: ELF and Mach-O. Each file is `.incbin`'d into a
//!   read-only section by a tiny assembly unit; the descriptor is a
//!   link-time constant.
//! - [`ResourceTableEmbedder`]: PE. Each file becomes a numbered `RCDATA`
//!   entry; a generated C unit resolves the entries through the module
//!   loader at startup.
//!
//! The variant is picked once per build with [`embedder_for`]. Nothing
//! outside this module needs to know which one is in use.

mod link_section;
mod resource_table;

use crate::error::{Error, Result};
use crate::layout::OutputLayout;
use crate::registry::ResourceFile;
use crate::symbol::Identifier;
use std::fmt;
use std::path::{Path, PathBuf};

pub use link_section::{LinkSectionConfig, LinkSectionEmbedder};
pub use resource_table::{InitMode, ResourceTableConfig, ResourceTableEmbedder};

/// Binary format of the artifact being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectFormat {
    /// ELF (Linux, BSDs, most embedded targets)
    Elf,
    /// Mach-O (Apple platforms)
    MachO,
    /// Portable Executable (Windows)
    Pe,
}

impl fmt::Display for ObjectFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectFormat::Elf => f.write_str("elf"),
            ObjectFormat::MachO => f.write_str("mach-o"),
            ObjectFormat::Pe => f.write_str("pe"),
        }
    }
}

/// Width of a data pointer on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    /// 32-bit pointers
    Bits32,
    /// 64-bit pointers
    Bits64,
}

impl PointerWidth {
    /// Size of a pointer in bytes
    pub fn bytes(self) -> u32 {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }
}

/// The platform resources are embedded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    /// Object format of the final binary
    pub format: ObjectFormat,
    /// Pointer width of the target
    pub pointer_width: PointerWidth,
}

impl Platform {
    /// Creates a platform description
    pub fn new(format: ObjectFormat, pointer_width: PointerWidth) -> Self {
        Self {
            format,
            pointer_width,
        }
    }

    /// The platform this crate was compiled for
    pub fn host() -> Self {
        let format = if cfg!(windows) {
            ObjectFormat::Pe
        } else if cfg!(target_vendor = "apple") {
            ObjectFormat::MachO
        } else {
            ObjectFormat::Elf
        };
        let pointer_width = if cfg!(target_pointer_width = "64") {
            PointerWidth::Bits64
        } else {
            PointerWidth::Bits32
        };
        Self::new(format, pointer_width)
    }

    /// Derive the platform from a target triple such as
    /// `x86_64-unknown-linux-gnu` or `i686-pc-windows-msvc`
    pub fn from_target_triple(triple: &str) -> Result<Self> {
        let triple = triple.trim();
        let mut parts = triple.split('-');
        let arch = match parts.next() {
            Some(arch) if !arch.is_empty() => arch,
            _ => return Err(Error::internal(format!("invalid target triple '{}'", triple))),
        };
        let rest: Vec<&str> = parts.collect();

        let format = if rest.iter().any(|p| p.starts_with("windows")) {
            ObjectFormat::Pe
        } else if rest
            .iter()
            .any(|p| matches!(*p, "apple" | "darwin" | "ios" | "tvos" | "watchos" | "visionos"))
        {
            ObjectFormat::MachO
        } else {
            ObjectFormat::Elf
        };

        // x32 and ilp32 ABIs run on 64-bit cores with 32-bit pointers
        let ilp32 = rest
            .iter()
            .any(|p| p.ends_with("x32") || p.ends_with("ilp32"));
        let pointer_width = if !ilp32 && is_64_bit_arch(arch) {
            PointerWidth::Bits64
        } else {
            PointerWidth::Bits32
        };

        Ok(Self::new(format, pointer_width))
    }
}

fn is_64_bit_arch(arch: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "x86_64",
        "aarch64",
        "arm64",
        "riscv64",
        "powerpc64",
        "ppc64",
        "mips64",
        "sparc64",
        "sparcv9",
        "s390x",
        "loongarch64",
        "wasm64",
        "nvptx64",
        "bpf",
    ];
    PREFIXES.iter().any(|p| arch.starts_with(p))
}

/// What kind of build input an artifact is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Assembly source handed to the assembler
    AssemblySource,
    /// C source compiled into the target
    CSource,
    /// Windows resource script handed to the resource compiler
    ResourceScript,
    /// Public header consumed by application code
    Header,
}

/// A generated file, planned in memory before anything touches disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Where the file is written
    pub path: PathBuf,
    /// What the file is
    pub kind: ArtifactKind,
    /// Full file contents
    pub contents: String,
}

impl Artifact {
    /// Creates a new artifact
    pub fn new(path: impl Into<PathBuf>, kind: ArtifactKind, contents: String) -> Self {
        Self {
            path: path.into(),
            kind,
            contents,
        }
    }
}

/// How application code initializes a group's descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitHook {
    /// Descriptors are complete at link time
    None,
    /// An external routine with this name must run first
    Extern(String),
}

/// Position of a resource among all resources of its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSlot {
    /// Zero-based index in target-wide registration order
    pub ordinal: u32,
}

/// Where an embedder is working
#[derive(Debug, Clone, Copy)]
pub struct EmbedContext<'a> {
    /// Owning target
    pub target: &'a str,
    /// Group being embedded
    pub group: &'a str,
    /// Output paths
    pub layout: &'a OutputLayout,
}

impl EmbedContext<'_> {
    /// Builds an embed failure for `path` in this context
    pub fn failure(&self, path: &Path, details: impl Into<String>) -> Error {
        Error::embed_failure(self.target, self.group, path, details)
    }
}

/// Outcome of embedding a single resource
#[derive(Debug, Clone)]
pub struct EmbeddedResource {
    /// Descriptor identifier
    pub symbol: Identifier,
    /// Absolute source path
    pub source: PathBuf,
    /// Target-wide position
    pub slot: ResourceSlot,
    /// Per-resource build input, if the mechanism needs one
    pub artifact: Option<Artifact>,
}

/// A mechanism that binds resource bytes into the final binary
pub trait Embedder: Send + Sync {
    /// The platform this embedder produces artifacts for
    fn platform(&self) -> Platform;

    /// Embed one resource
    fn embed(
        &self,
        ctx: &EmbedContext<'_>,
        resource: &ResourceFile,
        slot: ResourceSlot,
    ) -> Result<EmbeddedResource>;

    /// Produce the group-wide artifacts once every resource is embedded
    fn finish_group(
        &self,
        ctx: &EmbedContext<'_>,
        embedded: &[EmbeddedResource],
    ) -> Result<Vec<Artifact>> {
        let _ = (ctx, embedded);
        Ok(Vec::new())
    }

    /// How the generated header exposes initialization for `group`
    fn init_hook(&self, group: &str) -> InitHook {
        let _ = group;
        InitHook::None
    }
}

/// Embedder settings for both mechanisms; only the selected one is used
#[derive(Debug, Clone, Default)]
pub struct EmbedderConfig {
    /// Settings for ELF and Mach-O
    pub link_section: LinkSectionConfig,
    /// Settings for PE
    pub resource_table: ResourceTableConfig,
}

/// Select the embedder for `platform`
pub fn embedder_for(platform: Platform, config: &EmbedderConfig) -> Box<dyn Embedder> {
    match platform.format {
        ObjectFormat::Elf | ObjectFormat::MachO => Box::new(LinkSectionEmbedder::with_config(
            platform,
            config.link_section.clone(),
        )),
        ObjectFormat::Pe => Box::new(ResourceTableEmbedder::with_config(
            platform,
            config.resource_table.clone(),
        )),
    }
}

/// Quote `path` as a string literal for assemblers and resource compilers.
///
/// Fails on paths that cannot be expressed there.
pub(crate) fn quote_path(ctx: &EmbedContext<'_>, path: &Path) -> Result<String> {
    let text = path
        .to_str()
        .ok_or_else(|| ctx.failure(path, "path is not valid UTF-8"))?;
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' | '\r' | '\0' => {
                return Err(ctx.failure(path, "path contains a control character"));
            }
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    Ok(quoted)
}

/// First line of every generated file
pub(crate) fn banner(what: &str, ctx: &EmbedContext<'_>) -> String {
    format!(
        "/* binbed: {} of group `{}` (target `{}`). Generated file, do not edit. */\n",
        what, ctx.group, ctx.target
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_triple() {
        let linux = Platform::from_target_triple("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(linux, Platform::new(ObjectFormat::Elf, PointerWidth::Bits64));

        let win32 = Platform::from_target_triple("i686-pc-windows-msvc").unwrap();
        assert_eq!(win32, Platform::new(ObjectFormat::Pe, PointerWidth::Bits32));

        let mingw = Platform::from_target_triple("x86_64-pc-windows-gnu").unwrap();
        assert_eq!(mingw.format, ObjectFormat::Pe);

        let mac = Platform::from_target_triple("aarch64-apple-darwin").unwrap();
        assert_eq!(mac, Platform::new(ObjectFormat::MachO, PointerWidth::Bits64));

        let arm = Platform::from_target_triple("thumbv7em-none-eabihf").unwrap();
        assert_eq!(arm, Platform::new(ObjectFormat::Elf, PointerWidth::Bits32));

        let x32 = Platform::from_target_triple("x86_64-unknown-linux-gnux32").unwrap();
        assert_eq!(x32.pointer_width, PointerWidth::Bits32);

        assert!(Platform::from_target_triple("").is_err());
    }

    #[test]
    fn test_embedder_selection() {
        let config = EmbedderConfig::default();
        for format in [ObjectFormat::Elf, ObjectFormat::MachO, ObjectFormat::Pe] {
            let platform = Platform::new(format, PointerWidth::Bits64);
            assert_eq!(embedder_for(platform, &config).platform(), platform);
        }
        let pe = embedder_for(
            Platform::new(ObjectFormat::Pe, PointerWidth::Bits64),
            &config,
        );
        assert_eq!(
            pe.init_hook("images"),
            InitHook::Extern("binbed_images_init".to_string())
        );
        let elf = embedder_for(
            Platform::new(ObjectFormat::Elf, PointerWidth::Bits64),
            &config,
        );
        assert_eq!(elf.init_hook("images"), InitHook::None);
    }

    #[test]
    fn test_quote_path() {
        let layout = OutputLayout::new("/out");
        let ctx = EmbedContext {
            target: "T",
            group: "g",
            layout: &layout,
        };
        assert_eq!(
            quote_path(&ctx, Path::new("/res/a.png")).unwrap(),
            "\"/res/a.png\""
        );
        assert_eq!(
            quote_path(&ctx, Path::new("C:\\res\\a.png")).unwrap(),
            "\"C:\\\\res\\\\a.png\""
        );
        assert!(matches!(
            quote_path(&ctx, Path::new("/res/bad\nname.png")),
            Err(Error::EmbedFailure { .. })
        ));
    }
}
