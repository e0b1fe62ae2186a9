//! The `finalize` driver.
//!
//! For each not yet finalized group of a target, in registration order:
//!
//! 1. embed every resource and collect the group-wide artifacts
//! 2. render the header
//! 3. write everything (skipped in dry runs)
//! 4. attach the files to the target and mark the group finalized
//!
//! Every group of the target is planned before anything is written, so a
//! failing group leaves no partial output behind. Files are always
//! rewritten; there is no change detection.

use crate::embed::{
    Artifact, ArtifactKind, EmbedContext, EmbeddedResource, Embedder, ResourceSlot,
};
use crate::error::{Error, Result};
use crate::header::HeaderGenerator;
use crate::layout::OutputLayout;
use crate::registry::{Group, ResourceRegistry};
use crate::wiring::{self, TargetSink};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration for generation
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Root of all generated files
    pub output_dir: PathBuf,
    /// Plan and wire without writing files
    pub dry_run: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("binbed-out"),
            dry_run: false,
        }
    }
}

impl GeneratorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets whether files are actually written
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Files planned for one group
#[derive(Debug, Clone)]
pub struct GroupPlan {
    /// Group name
    pub group: String,
    /// The group's header
    pub header: Artifact,
    /// Embedder artifacts, per-resource ones first, in registration order
    pub artifacts: Vec<Artifact>,
}

impl GroupPlan {
    /// Every planned file, header first
    pub fn files(&self) -> impl Iterator<Item = &Artifact> {
        std::iter::once(&self.header).chain(self.artifacts.iter())
    }
}

/// Result of finalizing one target
#[derive(Debug, Clone, Default)]
pub struct Finalized {
    /// Target name
    pub target: String,
    /// Groups finalized by this call, in registration order
    pub groups: Vec<GroupPlan>,
}

impl Finalized {
    /// Paths of every artifact to attach to the target
    pub fn artifacts(&self) -> Vec<&Path> {
        self.groups
            .iter()
            .flat_map(|g| g.artifacts.iter().map(|a| a.path.as_path()))
            .collect()
    }

    /// Paths of every generated header
    pub fn headers(&self) -> Vec<&Path> {
        self.groups.iter().map(|g| g.header.path.as_path()).collect()
    }
}

/// Runs the embedding pipeline with one embedder for the whole build
pub struct Generator {
    config: GeneratorConfig,
    layout: OutputLayout,
    embedder: Box<dyn Embedder>,
    headers: HeaderGenerator,
}

impl Generator {
    /// Creates a generator
    pub fn new(config: GeneratorConfig, embedder: Box<dyn Embedder>) -> Self {
        let layout = OutputLayout::new(&config.output_dir);
        Self {
            config,
            layout,
            embedder,
            headers: HeaderGenerator::new(),
        }
    }

    /// Output paths used by this generator
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// The embedder selected for this build
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Plan the files of `group` without writing anything.
    ///
    /// `first_ordinal` is the target-wide position of the group's first
    /// resource.
    pub fn plan_group(&self, group: &Group, first_ordinal: u32) -> Result<GroupPlan> {
        let ctx = EmbedContext {
            target: group.target(),
            group: group.name(),
            layout: &self.layout,
        };

        let mut embedded: Vec<EmbeddedResource> = Vec::with_capacity(group.resources().len());
        for (offset, resource) in (0u32..).zip(group.resources()) {
            if !resource.path().is_file() {
                return Err(ctx.failure(resource.path(), "file disappeared after registration"));
            }
            let slot = ResourceSlot {
                ordinal: first_ordinal + offset,
            };
            embedded.push(self.embedder.embed(&ctx, resource, slot)?);
        }

        let mut artifacts: Vec<Artifact> =
            embedded.iter().filter_map(|e| e.artifact.clone()).collect();
        artifacts.extend(self.embedder.finish_group(&ctx, &embedded)?);

        let contents = self
            .headers
            .generate(group, &self.embedder.init_hook(group.name()));
        let header = Artifact::new(
            self.layout.header_path(group.name()),
            ArtifactKind::Header,
            contents,
        );

        Ok(GroupPlan {
            group: group.name().to_string(),
            header,
            artifacts,
        })
    }

    /// Generate, write and attach every pending group of `target`
    pub fn finalize(
        &self,
        registry: &mut ResourceRegistry,
        target: &str,
        sink: &mut dyn TargetSink,
    ) -> Result<Finalized> {
        let mut plans = Vec::new();
        let mut ordinal: u32 = 0;
        for group in registry.groups_for_target(target) {
            let count = u32::try_from(group.resources().len())
                .map_err(|_| Error::internal("too many resources in one group"))?;
            if group.is_finalized() {
                debug!("Group '{}' already finalized, skipping", group.name());
            } else {
                plans.push(self.plan_group(group, ordinal)?);
            }
            ordinal = ordinal
                .checked_add(count)
                .ok_or_else(|| Error::internal("too many resources in one target"))?;
        }

        if plans.is_empty() {
            warn!("Nothing to generate for target '{}'", target);
            return Ok(Finalized {
                target: target.to_string(),
                groups: Vec::new(),
            });
        }

        if !self.config.dry_run {
            for plan in &plans {
                for file in plan.files() {
                    write_artifact(file)?;
                }
            }
        }

        let folder = registry.ide_folder(target).map(str::to_string);
        for plan in &plans {
            let group = registry
                .group_mut(&plan.group)
                .ok_or_else(|| Error::internal(format!("group '{}' vanished", plan.group)))?;
            wiring::attach(
                sink,
                target,
                group,
                &plan.artifacts,
                &plan.header.path,
                folder.as_deref(),
            );
            group.mark_finalized();
        }

        info!(
            "Finalized target '{}': {} group(s), {} artifact(s)",
            target,
            plans.len(),
            plans.iter().map(|p| p.artifacts.len()).sum::<usize>()
        );

        Ok(Finalized {
            target: target.to_string(),
            groups: plans,
        })
    }
}

/// Write a generated file, creating its directory first
fn write_artifact(artifact: &Artifact) -> Result<()> {
    if let Some(parent) = artifact.path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
    }
    fs::write(&artifact.path, artifact.contents.as_bytes())
        .map_err(|e| Error::file_write(&artifact.path, e))?;
    debug!("Wrote {}", artifact.path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{embedder_for, EmbedderConfig, ObjectFormat, Platform, PointerWidth};
    use crate::wiring::BuildPlan;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct Fixture {
        resources: TempDir,
        output: TempDir,
        registry: ResourceRegistry,
    }

    fn images() -> Fixture {
        let resources = TempDir::new().unwrap();
        let mona = resources.path().join("mona_lisa.png");
        let supper = resources.path().join("the_last_supper.png");
        fs::write(&mona, [0x01u8, 0x02, 0x03]).unwrap();
        fs::write(&supper, [0xFFu8]).unwrap();

        let mut registry = ResourceRegistry::new();
        registry.register("T", "images", &mona).unwrap();
        registry.register("T", "images", &supper).unwrap();

        Fixture {
            resources,
            output: TempDir::new().unwrap(),
            registry,
        }
    }

    fn generator(format: ObjectFormat, output: &Path) -> Generator {
        let platform = Platform::new(format, PointerWidth::Bits64);
        Generator::new(
            GeneratorConfig::new().output_dir(output),
            embedder_for(platform, &EmbedderConfig::default()),
        )
    }

    #[test]
    fn test_finalize_link_section() {
        let mut fx = images();
        let generator = generator(ObjectFormat::Elf, fx.output.path());
        let mut plan = BuildPlan::new();

        let finalized = generator.finalize(&mut fx.registry, "T", &mut plan).unwrap();
        assert_eq!(finalized.groups.len(), 1);

        let header_path = fx.output.path().join("include/images/images.h");
        assert_eq!(finalized.headers(), vec![header_path.as_path()]);
        let header = fs::read_to_string(&header_path).unwrap();
        let mona = header.find("binbed_resource mona_lisa;").unwrap();
        let supper = header.find("binbed_resource the_last_supper;").unwrap();
        assert!(mona < supper);

        let artifacts = finalized.artifacts();
        assert_eq!(
            artifacts,
            vec![
                fx.output.path().join("src/images/mona_lisa.s").as_path(),
                fx.output.path().join("src/images/the_last_supper.s").as_path(),
            ]
        );
        for artifact in &artifacts {
            assert!(artifact.is_file());
        }

        let target = plan.target("T").unwrap();
        assert_eq!(target.include_dirs, vec![fx.output.path().join("include")]);
        assert_eq!(target.sources.len(), 2);
        assert!(fx.registry.group("images").unwrap().is_finalized());
    }

    #[test]
    fn test_finalize_resource_table() {
        let mut fx = images();
        let generator = generator(ObjectFormat::Pe, fx.output.path());
        let mut plan = BuildPlan::new();

        let finalized = generator.finalize(&mut fx.registry, "T", &mut plan).unwrap();
        let script = fs::read_to_string(fx.output.path().join("src/images/images.rc")).unwrap();
        assert!(script.contains("1000 RCDATA"));
        assert!(script.contains("1001 RCDATA"));
        assert!(fx.output.path().join("src/images/images_resources.c").is_file());

        let header = fs::read_to_string(&finalized.groups[0].header.path).unwrap();
        assert!(header.contains("extern int binbed_images_init(void);"));
    }

    #[test]
    fn test_resource_ids_span_groups() {
        let mut fx = images();
        let extra = fx.resources.path().join("theme.css");
        fs::write(&extra, b"body{}").unwrap();
        fx.registry.register("T", "styles", &extra).unwrap();

        let generator = generator(ObjectFormat::Pe, fx.output.path());
        let mut plan = BuildPlan::new();
        generator.finalize(&mut fx.registry, "T", &mut plan).unwrap();

        let script = fs::read_to_string(fx.output.path().join("src/styles/styles.rc")).unwrap();
        assert!(script.contains("1002 RCDATA"));
        assert_eq!(plan.target("T").unwrap().steps.len(), 2);
    }

    #[test]
    fn test_later_groups_keep_their_slots() {
        let mut fx = images();
        let generator = generator(ObjectFormat::Pe, fx.output.path());
        let mut plan = BuildPlan::new();
        generator.finalize(&mut fx.registry, "T", &mut plan).unwrap();

        let extra = fx.resources.path().join("theme.css");
        fs::write(&extra, b"body{}").unwrap();
        fx.registry.register("T", "styles", &extra).unwrap();
        let second = generator.finalize(&mut fx.registry, "T", &mut plan).unwrap();
        assert_eq!(second.groups.len(), 1);
        assert_eq!(second.groups[0].group, "styles");

        let script = fs::read_to_string(fx.output.path().join("src/styles/styles.rc")).unwrap();
        assert!(script.contains("1002 RCDATA"));

        let again = generator.finalize(&mut fx.registry, "T", &mut plan).unwrap();
        assert!(again.groups.is_empty());
    }

    #[test]
    fn test_targets_are_isolated() {
        let mut fx = images();
        let other = fx.resources.path().join("icon.ico");
        fs::write(&other, b"ico").unwrap();
        fx.registry.register("U", "icons", &other).unwrap();

        let generator = generator(ObjectFormat::Elf, fx.output.path());
        let mut plan = BuildPlan::new();
        let finalized = generator.finalize(&mut fx.registry, "U", &mut plan).unwrap();
        assert_eq!(finalized.groups.len(), 1);
        assert_eq!(finalized.groups[0].group, "icons");
        assert!(!fx.registry.group("images").unwrap().is_finalized());
        assert!(plan.target("T").is_none());
    }

    #[test]
    fn test_unknown_target_is_empty() {
        let mut fx = images();
        let generator = generator(ObjectFormat::Elf, fx.output.path());
        let mut plan = BuildPlan::new();
        let finalized = generator.finalize(&mut fx.registry, "nope", &mut plan).unwrap();
        assert!(finalized.groups.is_empty());
        assert!(plan.targets().is_empty());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let mut fx = images();
        let platform = Platform::new(ObjectFormat::Elf, PointerWidth::Bits64);
        let generator = Generator::new(
            GeneratorConfig::new().output_dir(fx.output.path()).dry_run(true),
            embedder_for(platform, &EmbedderConfig::default()),
        );
        let mut plan = BuildPlan::new();
        let finalized = generator.finalize(&mut fx.registry, "T", &mut plan).unwrap();
        assert_eq!(finalized.artifacts().len(), 2);
        assert!(!fx.output.path().join("include").exists());
        assert!(plan.target("T").is_some());
    }

    #[test]
    fn test_vanished_file_is_embed_failure() {
        let mut fx = images();
        fs::remove_file(fx.resources.path().join("the_last_supper.png")).unwrap();
        let generator = generator(ObjectFormat::Elf, fx.output.path());
        let mut plan = BuildPlan::new();
        let err = generator.finalize(&mut fx.registry, "T", &mut plan).unwrap_err();
        assert!(matches!(err, Error::EmbedFailure { .. }));
        assert!(!fx.output.path().join("include").exists());
        assert!(!fx.registry.group("images").unwrap().is_finalized());
    }

    #[test]
    fn test_plan_group_is_deterministic() {
        let fx = images();
        let generator = generator(ObjectFormat::Elf, fx.output.path());
        let group = fx.registry.group("images").unwrap();
        let first = generator.plan_group(group, 0).unwrap();
        let second = generator.plan_group(group, 0).unwrap();
        assert_eq!(first.header, second.header);
        assert_eq!(first.artifacts, second.artifacts);
    }

    #[test]
    fn test_ide_folder_reaches_the_sink() {
        let mut fx = images();
        fx.registry.set_ide_folder("T", "Embedded");
        let generator = generator(ObjectFormat::Elf, fx.output.path());
        let mut plan = BuildPlan::new();
        generator.finalize(&mut fx.registry, "T", &mut plan).unwrap();
        assert_eq!(plan.target("T").unwrap().folder.as_deref(), Some("Embedded"));
    }

    #[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
    fn cc_available() -> bool {
        std::process::Command::new("cc")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Compiles `main` together with the generated units and returns the
    /// program's stdout
    #[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
    fn link_and_run(output: &Path, main: &str, units: &[&Path]) -> String {
        use std::process::Command;

        let main_c = output.join("main.c");
        fs::write(&main_c, main).unwrap();

        let program = output.join("embedded");
        let mut cc = Command::new("cc");
        cc.arg("-I").arg(output.join("include")).arg(&main_c);
        for unit in units {
            cc.arg(unit);
        }
        let result = cc.arg("-o").arg(&program).output().unwrap();
        assert!(
            result.status.success(),
            "link failed: {}",
            String::from_utf8_lossy(&result.stderr)
        );

        let run = Command::new(&program).output().unwrap();
        String::from_utf8_lossy(&run.stdout).into_owned()
    }

    /// Links the generated link-section units into a C program and checks
    /// the embedded bytes at runtime. Skipped when no C compiler is around.
    #[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[test]
    fn test_link_section_bytes_at_runtime() {
        if !cc_available() {
            eprintln!("cc not available, skipping");
            return;
        }

        let mut fx = images();
        let generator = generator(ObjectFormat::Elf, fx.output.path());
        let mut plan = BuildPlan::new();
        let finalized = generator.finalize(&mut fx.registry, "T", &mut plan).unwrap();

        let stdout = link_and_run(
            fx.output.path(),
            r#"#include <stdio.h>
#include <images/images.h>

int main(void)
{
    size_t i;
    binbed_images_init();
    printf("%u:", (unsigned)mona_lisa.size);
    for (i = 0; i < mona_lisa.size; i++) printf("%02x", mona_lisa.data[i]);
    printf(" %u:", (unsigned)the_last_supper.size);
    for (i = 0; i < the_last_supper.size; i++) printf("%02x", the_last_supper.data[i]);
    printf("\n");
    return 0;
}
"#,
            &finalized.artifacts(),
        );
        assert_eq!(stdout, "3:010203 1:ff\n");
    }

    /// Groups `a_b` + `c.bin` and `a` + `b_c.bin` share no exported symbol
    #[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[test]
    fn test_underscored_groups_link_together() {
        if !cc_available() {
            eprintln!("cc not available, skipping");
            return;
        }

        let resources = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let c = resources.path().join("c.bin");
        let b_c = resources.path().join("b_c.bin");
        fs::write(&c, [0xC0u8]).unwrap();
        fs::write(&b_c, [0xB0u8, 0xC0]).unwrap();

        let mut registry = ResourceRegistry::new();
        registry.register("T", "a_b", &c).unwrap();
        registry.register("T", "a", &b_c).unwrap();

        let generator = generator(ObjectFormat::Elf, output.path());
        let mut plan = BuildPlan::new();
        let finalized = generator.finalize(&mut registry, "T", &mut plan).unwrap();
        assert_eq!(finalized.groups.len(), 2);

        let stdout = link_and_run(
            output.path(),
            r#"#include <stdio.h>
#include <a_b/a_b.h>
#include <a/a.h>

int main(void)
{
    printf("%u:%02x %u:%02x%02x\n",
        (unsigned)c.size, c.data[0],
        (unsigned)b_c.size, b_c.data[0], b_c.data[1]);
    return 0;
}
"#,
            &finalized.artifacts(),
        );
        assert_eq!(stdout, "1:c0 2:b0c0\n");
    }
}
