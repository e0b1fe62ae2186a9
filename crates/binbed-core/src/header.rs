//! Generation of the per-group C header.
//!
//! The header is the only interface application code sees. It looks the
//! same on every platform apart from how `binbed_<group>_init()` is
//! provided, so consumers can always call it:
//!
//! ```c
//! #include <images/images.h>
//!
//! binbed_images_init();
//! fwrite(mona_lisa.data, 1, mona_lisa.size, out);
//! ```

use crate::embed::InitHook;
use crate::registry::Group;
use crate::symbol;
use std::fmt::Write as FmtWrite;

/// Renders group headers
#[derive(Debug, Clone, Default)]
pub struct HeaderGenerator;

impl HeaderGenerator {
    /// Creates a header generator
    pub fn new() -> Self {
        Self
    }

    /// Include guard macro for `group`
    pub fn guard(group: &str) -> String {
        format!("BINBED_{}_H", symbol::sanitize(group).to_ascii_uppercase())
    }

    /// Render the header of `group`.
    ///
    /// The output depends only on the group's name, target and resources,
    /// so repeated calls yield identical text.
    pub fn generate(&self, group: &Group, init: &InitHook) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.write(&mut out, group, init);
        out
    }

    fn write(&self, out: &mut String, group: &Group, init: &InitHook) -> std::fmt::Result {
        let guard = Self::guard(group.name());
        let init_name = match init {
            InitHook::Extern(name) => name.clone(),
            InitHook::None => format!("binbed_{}_init", symbol::sanitize(group.name())),
        };

        writeln!(
            out,
            "/* binbed: resources of group `{}` (target `{}`). Generated file, do not edit. */",
            group.name(),
            group.target()
        )?;
        writeln!(out)?;
        writeln!(out, "#ifndef {}", guard)?;
        writeln!(out, "#define {}", guard)?;
        out.push_str(
            "
#include <stddef.h>

#ifndef BINBED_RESOURCE_DEFINED
#define BINBED_RESOURCE_DEFINED
/* An embedded file: `size` bytes starting at `data`. */
struct binbed_resource {
    const unsigned char *data;
    size_t size;
};
#endif

#ifdef __cplusplus
extern \"C\" {
#endif

",
        );

        for resource in group.resources() {
            writeln!(out, "extern const struct binbed_resource {};", resource.symbol())?;
        }
        writeln!(out)?;

        match init {
            InitHook::Extern(_) => {
                writeln!(
                    out,
                    "/* Populates the descriptors above. Call once before reading any of them. */"
                )?;
                writeln!(out, "extern int {}(void);", init_name)?;
            }
            InitHook::None => {
                writeln!(out, "/* Descriptors are resolved at link time. */")?;
                writeln!(out, "static inline int {}(void) {{ return 0; }}", init_name)?;
            }
        }

        out.push_str(
            "
#ifdef __cplusplus
}
#endif
",
        );
        writeln!(out)?;
        writeln!(out, "#endif /* {} */", guard)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ResourceRegistry;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn images(dir: &TempDir) -> ResourceRegistry {
        let mona = dir.path().join("mona_lisa.png");
        let supper = dir.path().join("the_last_supper.png");
        std::fs::write(&mona, [1u8, 2, 3]).unwrap();
        std::fs::write(&supper, [0xFFu8]).unwrap();

        let mut registry = ResourceRegistry::new();
        registry.register("T", "images", &mona).unwrap();
        registry.register("T", "images", &supper).unwrap();
        registry
    }

    #[test]
    fn test_header_for_link_section() {
        let dir = TempDir::new().unwrap();
        let registry = images(&dir);
        let header = HeaderGenerator::new().generate(registry.group("images").unwrap(), &InitHook::None);

        let expected = "\
/* binbed: resources of group `images` (target `T`). Generated file, do not edit. */

#ifndef BINBED_IMAGES_H
#define BINBED_IMAGES_H

#include <stddef.h>

#ifndef BINBED_RESOURCE_DEFINED
#define BINBED_RESOURCE_DEFINED
/* An embedded file: `size` bytes starting at `data`. */
struct binbed_resource {
    const unsigned char *data;
    size_t size;
};
#endif

#ifdef __cplusplus
extern \"C\" {
#endif

extern const struct binbed_resource mona_lisa;
extern const struct binbed_resource the_last_supper;

/* Descriptors are resolved at link time. */
static inline int binbed_images_init(void) { return 0; }

#ifdef __cplusplus
}
#endif

#endif /* BINBED_IMAGES_H */
";
        assert_eq!(header, expected);
    }

    #[test]
    fn test_header_for_resource_table() {
        let dir = TempDir::new().unwrap();
        let registry = images(&dir);
        let hook = InitHook::Extern("binbed_images_init".to_string());
        let header = HeaderGenerator::new().generate(registry.group("images").unwrap(), &hook);
        assert!(header.contains("extern int binbed_images_init(void);\n"));
        assert!(!header.contains("static inline"));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let registry = images(&dir);
        let group = registry.group("images").unwrap();
        let generator = HeaderGenerator::new();
        assert_eq!(
            generator.generate(group, &InitHook::None),
            generator.generate(group, &InitHook::None)
        );
    }

    #[test]
    fn test_declaration_order_follows_registration() {
        let dir = TempDir::new().unwrap();
        let mut registry = ResourceRegistry::new();
        for name in ["zeta.bin", "alpha.bin", "mid.bin"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"x").unwrap();
            registry.register("T", "data", &path).unwrap();
        }
        let header = HeaderGenerator::new().generate(registry.group("data").unwrap(), &InitHook::None);
        let zeta = header.find("binbed_resource zeta;").unwrap();
        let alpha = header.find("binbed_resource alpha;").unwrap();
        let mid = header.find("binbed_resource mid;").unwrap();
        assert!(zeta < alpha && alpha < mid);
    }

    #[test]
    fn test_guard() {
        assert_eq!(HeaderGenerator::guard("images"), "BINBED_IMAGES_H");
        assert_eq!(HeaderGenerator::guard("ui-icons.v2"), "BINBED_UI_ICONS_V2_H");
    }
}
