//! Attaching generated files to the consuming build target.
//!
//! The build tool's own project model stays outside this crate; it is
//! reached only through [`TargetSink`]. [`BuildPlan`] is an in-memory sink
//! that can also render a line-oriented plan file for tools that drive
//! binbed as an external program.

use crate::embed::Artifact;
use crate::registry::Group;
use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A generation step the build tool must schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationStep {
    /// Owning target
    pub target: String,
    /// Group the step generates
    pub group: String,
    /// Resource files read by the step
    pub inputs: Vec<PathBuf>,
    /// Files the step produces
    pub outputs: Vec<PathBuf>,
    /// Rerun on every build. There is no change detection, so always true.
    pub always_rerun: bool,
}

/// The "attach artifact to target" interface of the external build tool
pub trait TargetSink {
    /// Add build or link inputs to `target`
    fn add_sources(&mut self, target: &str, sources: &[PathBuf]);

    /// Add a directory to `target`'s include search path
    fn add_include_dir(&mut self, target: &str, dir: &Path);

    /// Declare the step producing a group's files
    fn add_generation_step(&mut self, step: GenerationStep);

    /// Show `target`'s generated files under `folder` in IDE views
    fn set_folder(&mut self, target: &str, folder: &str) {
        let _ = (target, folder);
    }
}

/// Attach a group's artifacts and header to `target`.
///
/// The include directory added is the one above `<group>/`, so consumers
/// write `#include <group/group.h>`.
pub fn attach(
    sink: &mut dyn TargetSink,
    target: &str,
    group: &Group,
    artifacts: &[Artifact],
    header: &Path,
    ide_folder: Option<&str>,
) {
    let sources: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
    sink.add_sources(target, &sources);

    if let Some(include_root) = header.parent().and_then(Path::parent) {
        sink.add_include_dir(target, include_root);
    }

    let mut outputs = vec![header.to_path_buf()];
    outputs.extend(sources.iter().cloned());
    sink.add_generation_step(GenerationStep {
        target: target.to_string(),
        group: group.name().to_string(),
        inputs: group.resources().iter().map(|r| r.path().to_path_buf()).collect(),
        outputs,
        always_rerun: true,
    });

    if let Some(folder) = ide_folder {
        sink.set_folder(target, folder);
    }

    debug!(
        "Attached group '{}' to target '{}' ({} sources)",
        group.name(),
        target,
        sources.len()
    );
}

/// Everything attached to one target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetPlan {
    /// Target name
    pub name: String,
    /// Build inputs, in attachment order
    pub sources: Vec<PathBuf>,
    /// Include directories, without duplicates
    pub include_dirs: Vec<PathBuf>,
    /// Generation steps, one per group
    pub steps: Vec<GenerationStep>,
    /// IDE folder, if any
    pub folder: Option<String>,
}

impl TargetPlan {
    /// Render the plan as a line-oriented text file
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = self.write(&mut out);
        out
    }

    fn write(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "# binbed plan for target `{}`", self.name)?;
        if let Some(folder) = &self.folder {
            writeln!(out, "folder {}", folder)?;
        }
        for dir in &self.include_dirs {
            writeln!(out, "include {}", dir.display())?;
        }
        for source in &self.sources {
            writeln!(out, "source {}", source.display())?;
        }
        for step in &self.steps {
            writeln!(out)?;
            writeln!(
                out,
                "step {} rerun={}",
                step.group,
                if step.always_rerun { "always" } else { "on-change" }
            )?;
            for input in &step.inputs {
                writeln!(out, "input {}", input.display())?;
            }
            for output in &step.outputs {
                writeln!(out, "output {}", output.display())?;
            }
        }
        Ok(())
    }
}

/// In-memory [`TargetSink`] recording attachments per target
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    targets: Vec<TargetPlan>,
}

impl BuildPlan {
    /// Creates an empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan of `target`, if anything was attached to it
    pub fn target(&self, name: &str) -> Option<&TargetPlan> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// All target plans in order of first attachment
    pub fn targets(&self) -> &[TargetPlan] {
        &self.targets
    }

    fn entry(&mut self, name: &str) -> &mut TargetPlan {
        let idx = match self.targets.iter().position(|t| t.name == name) {
            Some(idx) => idx,
            None => {
                self.targets.push(TargetPlan {
                    name: name.to_string(),
                    ..TargetPlan::default()
                });
                self.targets.len() - 1
            }
        };
        &mut self.targets[idx]
    }
}

impl TargetSink for BuildPlan {
    fn add_sources(&mut self, target: &str, sources: &[PathBuf]) {
        self.entry(target).sources.extend_from_slice(sources);
    }

    fn add_include_dir(&mut self, target: &str, dir: &Path) {
        let plan = self.entry(target);
        if !plan.include_dirs.iter().any(|d| d == dir) {
            plan.include_dirs.push(dir.to_path_buf());
        }
    }

    fn add_generation_step(&mut self, step: GenerationStep) {
        self.entry(&step.target).steps.push(step);
    }

    fn set_folder(&mut self, target: &str, folder: &str) {
        self.entry(target).folder = Some(folder.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::ArtifactKind;
    use crate::registry::ResourceRegistry;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_attach_records_everything() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        std::fs::write(&a, b"a").unwrap();
        let mut registry = ResourceRegistry::new();
        registry.register("app", "data", &a).unwrap();
        let group = registry.group("data").unwrap();

        let artifacts = vec![Artifact::new(
            "/out/src/data/a.s",
            ArtifactKind::AssemblySource,
            String::new(),
        )];
        let header = Path::new("/out/include/data/data.h");

        let mut plan = BuildPlan::new();
        attach(&mut plan, "app", group, &artifacts, header, Some("Resources"));
        attach(&mut plan, "app", group, &artifacts, header, None);

        let target = plan.target("app").unwrap();
        assert_eq!(target.include_dirs, vec![PathBuf::from("/out/include")]);
        assert_eq!(target.sources.len(), 2);
        assert_eq!(target.folder.as_deref(), Some("Resources"));
        assert_eq!(target.steps.len(), 2);

        let step = &target.steps[0];
        assert_eq!(step.group, "data");
        assert_eq!(step.inputs, vec![a.clone()]);
        assert_eq!(
            step.outputs,
            vec![PathBuf::from("/out/include/data/data.h"), PathBuf::from("/out/src/data/a.s")]
        );
        assert!(step.always_rerun);
        assert!(plan.target("other").is_none());
    }

    #[test]
    fn test_render_plan() {
        let plan = TargetPlan {
            name: "app".to_string(),
            sources: vec![PathBuf::from("/out/src/data/a.s")],
            include_dirs: vec![PathBuf::from("/out/include")],
            steps: vec![GenerationStep {
                target: "app".to_string(),
                group: "data".to_string(),
                inputs: vec![PathBuf::from("/res/a.bin")],
                outputs: vec![PathBuf::from("/out/include/data/data.h")],
                always_rerun: true,
            }],
            folder: None,
        };
        let expected = "\
# binbed plan for target `app`
include /out/include
source /out/src/data/a.s

step data rerun=always
input /res/a.bin
output /out/include/data/data.h
";
        assert_eq!(plan.render(), expected);
    }
}
