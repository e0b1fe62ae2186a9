//! Link-section embedding for ELF and Mach-O.
//!
//! Each resource gets one assembly unit that `.incbin`s the file into a
//! read-only section and defines the descriptor next to it:
//!
//! ```text
//! .Lbinbed_start:   raw bytes of the file
//! .Lbinbed_end:     one NUL byte, not counted in the size
//! <id>:             { start, end - start }
//! ```
//!
//! The start and end labels are assembler-local, so the descriptor is the
//! only symbol a unit exports. Both descriptor fields are resolved by the assembler and linker, so no
//! code runs at startup. The trailing NUL lets text resources be used as C
//! strings directly.

use super::{
    banner, quote_path, Artifact, ArtifactKind, EmbedContext, EmbeddedResource, Embedder,
    ObjectFormat, Platform, PointerWidth, ResourceSlot,
};
use crate::error::Result;
use crate::registry::ResourceFile;
use crate::symbol;
use std::fmt::Write as FmtWrite;
use tracing::{trace, warn};

const DEFAULT_DATA_ALIGNMENT: u32 = 16;
const MAX_DATA_ALIGNMENT: u32 = 1 << 15;

/// Configuration for the link-section embedder
#[derive(Debug, Clone)]
pub struct LinkSectionConfig {
    data_alignment: u32,
}

impl Default for LinkSectionConfig {
    fn default() -> Self {
        Self {
            data_alignment: DEFAULT_DATA_ALIGNMENT,
        }
    }
}

impl LinkSectionConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data alignment; rounded up to a power of two and capped
    /// at 32 KiB
    pub fn data_alignment(mut self, alignment: u32) -> Self {
        self.data_alignment = match alignment.max(1).checked_next_power_of_two() {
            Some(aligned) if aligned <= MAX_DATA_ALIGNMENT => aligned,
            _ => {
                warn!(
                    "Data alignment {} is too large, using {}",
                    alignment, MAX_DATA_ALIGNMENT
                );
                MAX_DATA_ALIGNMENT
            }
        };
        self
    }

    /// Alignment of the embedded bytes, always a power of two
    pub fn alignment(&self) -> u32 {
        self.data_alignment
    }
}

/// Embeds resources by placing them in a data section at link time
#[derive(Debug, Clone)]
pub struct LinkSectionEmbedder {
    platform: Platform,
    config: LinkSectionConfig,
}

impl LinkSectionEmbedder {
    /// Creates an embedder with default configuration
    pub fn new(platform: Platform) -> Self {
        Self::with_config(platform, LinkSectionConfig::default())
    }

    /// Creates an embedder with custom configuration
    pub fn with_config(platform: Platform, config: LinkSectionConfig) -> Self {
        Self { platform, config }
    }

    /// Mach-O prefixes C symbols with an underscore
    fn mangle(&self, name: &str) -> String {
        match self.platform.format {
            ObjectFormat::MachO => format!("_{}", name),
            _ => name.to_string(),
        }
    }

    /// Assembler-local label, never written to the symbol table
    fn local_label(&self, name: &str) -> String {
        match self.platform.format {
            ObjectFormat::MachO => format!("L{}", name),
            _ => format!(".L{}", name),
        }
    }

    fn pointer_directive(&self) -> &'static str {
        match self.platform.pointer_width {
            PointerWidth::Bits32 => ".long",
            PointerWidth::Bits64 => ".quad",
        }
    }

    /// Render the assembly unit for one resource
    fn render(
        &self,
        ctx: &EmbedContext<'_>,
        resource: &ResourceFile,
        source: &str,
    ) -> std::result::Result<String, std::fmt::Error> {
        let id = resource.symbol().as_str();
        let start = self.local_label("binbed_start");
        let end = self.local_label("binbed_end");
        let descriptor = self.mangle(id);
        let pointer = self.pointer_directive();
        let pointer_bytes = self.platform.pointer_width.bytes();
        let section = format!("binbed.{}.{}", symbol::sanitize(ctx.group), id);

        let file_name = resource
            .path()
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        let mut out = String::new();
        out.push_str(&banner(&format!("`{}`", file_name), ctx));
        writeln!(out)?;

        match self.platform.format {
            ObjectFormat::MachO => {
                writeln!(out, "\t.section __TEXT,__const")?;
                writeln!(out, "\t.p2align {}", self.config.alignment().trailing_zeros())?;
            }
            _ => {
                writeln!(out, "\t.section .rodata.{},\"a\",%progbits", section)?;
                writeln!(out, "\t.balign {}", self.config.alignment())?;
            }
        }
        writeln!(out, "{}:", start)?;
        writeln!(out, "\t.incbin {}", source)?;
        writeln!(out, "{}:", end)?;
        writeln!(out, "\t.byte 0")?;
        writeln!(out)?;

        match self.platform.format {
            ObjectFormat::MachO => {
                writeln!(out, "\t.section __DATA,__const")?;
                writeln!(out, "\t.p2align {}", pointer_bytes.trailing_zeros())?;
                writeln!(out, "\t.globl {}", descriptor)?;
            }
            _ => {
                writeln!(out, "\t.section .data.rel.ro.{},\"aw\",%progbits", section)?;
                writeln!(out, "\t.balign {}", pointer_bytes)?;
                writeln!(out, "\t.globl {}", descriptor)?;
                writeln!(out, "\t.type {}, %object", descriptor)?;
                writeln!(out, "\t.size {}, {}", descriptor, pointer_bytes * 2)?;
            }
        }
        writeln!(out, "{}:", descriptor)?;
        writeln!(out, "\t{} {}", pointer, start)?;
        writeln!(out, "\t{} {} - {}", pointer, end, start)?;

        if self.platform.format == ObjectFormat::Elf {
            writeln!(out)?;
            writeln!(out, "\t.section .note.GNU-stack,\"\",%progbits")?;
        }

        Ok(out)
    }
}

impl Embedder for LinkSectionEmbedder {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn embed(
        &self,
        ctx: &EmbedContext<'_>,
        resource: &ResourceFile,
        slot: ResourceSlot,
    ) -> Result<EmbeddedResource> {
        let source = quote_path(ctx, resource.path())?;
        let contents = self
            .render(ctx, resource, &source)
            .map_err(|e| ctx.failure(resource.path(), e.to_string()))?;
        let path = ctx
            .layout
            .group_dir(ctx.group)
            .join(format!("{}.s", resource.symbol()));

        trace!("Planned {} for {}", path.display(), resource.path().display());

        Ok(EmbeddedResource {
            symbol: resource.symbol().clone(),
            source: resource.path().to_path_buf(),
            slot,
            artifact: Some(Artifact::new(path, ArtifactKind::AssemblySource, contents)),
        })
    }
}
