//! Resource-table embedding for PE binaries.
//!
//! Every resource is compiled into the binary as an `RCDATA` entry keyed by
//! a numeric identifier unique within the target. The descriptors live in a
//! generated C unit whose `binbed_<group>_init()` routine fills them in.
//! For each resource it
//!
//! 1. locates the module containing the generated code (exe or DLL),
//! 2. finds the resource block by identifier,
//! 3. loads and locks it,
//! 4. reads the pointer and size into the descriptor.
//!
//! A failing step prints a diagnostic and aborts the process: there is no
//! other way to reach the bytes.
//!
//! With [`InitMode::PreMain`] the routine is also registered as a static
//! initializer so it completes before `main`. Descriptors must not be read
//! from other static initializers in that mode, since their relative order
//! is unspecified.

use super::{
    banner, quote_path, Artifact, ArtifactKind, EmbedContext, EmbeddedResource, Embedder,
    InitHook, Platform, ResourceSlot,
};
use crate::error::Result;
use crate::registry::ResourceFile;
use crate::symbol;
use std::fmt::Write as FmtWrite;
use tracing::{debug, trace};

/// When the descriptors of a group get populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitMode {
    /// The host program calls `binbed_<group>_init()` before reading a descriptor
    #[default]
    Explicit,
    /// The init routine also runs as a static initializer before `main`
    PreMain,
}

/// Configuration for the resource-table embedder
#[derive(Debug, Clone)]
pub struct ResourceTableConfig {
    /// Identifier of the first resource of a target
    pub id_base: u16,
    /// How descriptors get populated
    pub init_mode: InitMode,
}

impl Default for ResourceTableConfig {
    fn default() -> Self {
        Self {
            id_base: 1000,
            init_mode: InitMode::Explicit,
        }
    }
}

impl ResourceTableConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identifier of the first resource
    pub fn id_base(mut self, base: u16) -> Self {
        self.id_base = base;
        self
    }

    /// Sets the initialization mode
    pub fn init_mode(mut self, mode: InitMode) -> Self {
        self.init_mode = mode;
        self
    }
}

/// Embeds resources as entries of the PE resource table
#[derive(Debug, Clone)]
pub struct ResourceTableEmbedder {
    platform: Platform,
    config: ResourceTableConfig,
}

impl ResourceTableEmbedder {
    /// Creates an embedder with default configuration
    pub fn new(platform: Platform) -> Self {
        Self::with_config(platform, ResourceTableConfig::default())
    }

    /// Creates an embedder with custom configuration
    pub fn with_config(platform: Platform, config: ResourceTableConfig) -> Self {
        Self { platform, config }
    }

    /// Numeric resource identifier for `slot`, if it fits the 16-bit id space
    pub fn resource_id(&self, slot: ResourceSlot) -> Option<u16> {
        u32::from(self.config.id_base)
            .checked_add(slot.ordinal)
            .and_then(|id| u16::try_from(id).ok())
            .filter(|&id| id != 0)
    }

    fn init_name(group: &str) -> String {
        format!("binbed_{}_init", symbol::sanitize(group))
    }

    fn render_script(
        &self,
        ctx: &EmbedContext<'_>,
        embedded: &[EmbeddedResource],
    ) -> Result<String> {
        let mut out = banner("resource table", ctx);
        out.push('\n');
        for resource in embedded {
            let id = self.checked_id(ctx, resource)?;
            let source = quote_path(ctx, &resource.source)?;
            out.push_str(&format!("{} RCDATA {}\n", id, source));
        }
        Ok(out)
    }

    fn checked_id(&self, ctx: &EmbedContext<'_>, resource: &EmbeddedResource) -> Result<u16> {
        self.resource_id(resource.slot).ok_or_else(|| {
            ctx.failure(
                &resource.source,
                format!(
                    "resource identifier {} + {} does not fit the 16-bit resource id space",
                    self.config.id_base, resource.slot.ordinal
                ),
            )
        })
    }

    fn render_loader(
        &self,
        ctx: &EmbedContext<'_>,
        embedded: &[EmbeddedResource],
    ) -> Result<String> {
        let prefix = format!("binbed_{}", symbol::sanitize(ctx.group));
        let init = Self::init_name(ctx.group);
        let mut calls = Vec::with_capacity(embedded.len());
        for resource in embedded {
            let id = self.checked_id(ctx, resource)?;
            calls.push(format!(
                "    {p}_load(&{s}, {id}, \"{s}\");\n",
                p = prefix,
                s = resource.symbol,
                id = id
            ));
        }

        let mut out = banner("runtime registration", ctx);
        self.write_loader(&mut out, ctx, &prefix, &init, embedded, &calls)
            .map_err(|e| ctx.failure(ctx.layout.root(), e.to_string()))?;
        Ok(out)
    }

    fn write_loader(
        &self,
        out: &mut String,
        ctx: &EmbedContext<'_>,
        prefix: &str,
        init: &str,
        embedded: &[EmbeddedResource],
        calls: &[String],
    ) -> std::fmt::Result {
        out.push_str(
            "
#ifndef WIN32_LEAN_AND_MEAN
#define WIN32_LEAN_AND_MEAN
#endif
#include <windows.h>
#include <stddef.h>
#include <stdio.h>
#include <stdlib.h>

#ifndef BINBED_RESOURCE_DEFINED
#define BINBED_RESOURCE_DEFINED
struct binbed_resource {
    const unsigned char *data;
    size_t size;
};
#endif

",
        );

        for resource in embedded {
            writeln!(out, "struct binbed_resource {};", resource.symbol)?;
        }

        write!(
            out,
            r#"
static void {p}_fail(const char *name, const char *step)
{{
    fprintf(stderr, "binbed: cannot load resource '%s' of group '{group}': %s failed (error %lu)\n",
            name, step, (unsigned long)GetLastError());
    abort();
}}

static void {p}_load(struct binbed_resource *out, WORD id, const char *name)
{{
    HMODULE module = NULL;
    HRSRC block;
    HGLOBAL handle;
    const void *data;
    DWORD size;

    if (!GetModuleHandleExW(GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS
                                | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
                            (LPCWSTR)(const void *)&{p}_fail, &module)) {{
        {p}_fail(name, "GetModuleHandleExW");
    }}

    block = FindResourceW(module, MAKEINTRESOURCEW(id), MAKEINTRESOURCEW(10));
    if (block == NULL) {{
        {p}_fail(name, "FindResourceW");
    }}

    handle = LoadResource(module, block);
    if (handle == NULL) {{
        {p}_fail(name, "LoadResource");
    }}
    data = LockResource(handle);
    size = SizeofResource(module, block);
    if (data == NULL && size != 0) {{
        {p}_fail(name, "LockResource");
    }}

    out->data = (const unsigned char *)data;
    out->size = (size_t)size;
}}

static int {p}_ready = 0;

int {init}(void)
{{
    if ({p}_ready) {{
        return 0;
    }}
"#,
            p = prefix,
            group = ctx.group,
            init = init,
        )?;
        for call in calls {
            out.push_str(call);
        }
        write!(
            out,
            "    {p}_ready = 1;\n    return 0;\n}}\n",
            p = prefix
        )?;

        if self.config.init_mode == InitMode::PreMain {
            write!(
                out,
                r#"
#if defined(_MSC_VER)
static void __cdecl {p}_premain(void)
{{
    {init}();
}}
#pragma section(".CRT$XCU", read)
__declspec(allocate(".CRT$XCU")) void (__cdecl *{p}_premain_entry)(void) = {p}_premain;
#if defined(_M_IX86)
#pragma comment(linker, "/include:_{p}_premain_entry")
#else
#pragma comment(linker, "/include:{p}_premain_entry")
#endif
#else
__attribute__((constructor)) static void {p}_premain(void)
{{
    {init}();
}}
#endif
"#,
                p = prefix,
                init = init,
            )?;
        }

        Ok(())
    }
}

impl Embedder for ResourceTableEmbedder {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn embed(
        &self,
        ctx: &EmbedContext<'_>,
        resource: &ResourceFile,
        slot: ResourceSlot,
    ) -> Result<EmbeddedResource> {
        // fail early on paths the resource compiler cannot take
        quote_path(ctx, resource.path())?;
        let id = self.resource_id(slot).ok_or_else(|| {
            ctx.failure(resource.path(), "resource identifier space exhausted")
        })?;
        trace!("Assigned resource id {} to '{}'", id, resource.symbol());

        Ok(EmbeddedResource {
            symbol: resource.symbol().clone(),
            source: resource.path().to_path_buf(),
            slot,
            artifact: None,
        })
    }

    fn finish_group(
        &self,
        ctx: &EmbedContext<'_>,
        embedded: &[EmbeddedResource],
    ) -> Result<Vec<Artifact>> {
        let dir = ctx.layout.group_dir(ctx.group);
        let script = Artifact::new(
            dir.join(format!("{}.rc", ctx.group)),
            ArtifactKind::ResourceScript,
            self.render_script(ctx, embedded)?,
        );
        let loader = Artifact::new(
            dir.join(format!("{}_resources.c", ctx.group)),
            ArtifactKind::CSource,
            self.render_loader(ctx, embedded)?,
        );
        debug!(
            "Planned resource table for group '{}' ({} entries, {:?} init)",
            ctx.group,
            embedded.len(),
            self.config.init_mode
        );
        Ok(vec![script, loader])
    }

    fn init_hook(&self, group: &str) -> InitHook {
        InitHook::Extern(Self::init_name(group))
    }
}
