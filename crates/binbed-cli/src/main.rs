//! binbed - Embed files into native executables
//!
//! This tool registers resource files per (target, group), generates the
//! native embedding artifacts and one C header per group, and writes a plan
//! file per target listing what the build must compile and include.

use anyhow::{bail, Context, Result};
use binbed_core::{
    embedder_for, symbol, BuildPlan, EmbedderConfig, FailureScope, Generator, GeneratorConfig,
    InitMode, ObjectFormat, Platform, ResourceRegistry, ResourceTableConfig,
};
use clap::{Parser, ValueEnum};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Embed files into native executables and generate C headers to reach them
#[derive(Parser, Debug)]
#[command(name = "binbed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Register a file for embedding (repeatable)
    #[arg(
        short,
        long = "resource",
        num_args = 3,
        value_names = ["TARGET", "GROUP", "PATH"],
        action = clap::ArgAction::Append
    )]
    resources: Vec<String>,

    /// Register every file below a directory, sorted by name (repeatable)
    #[arg(
        long = "group-dir",
        num_args = 3,
        value_names = ["TARGET", "GROUP", "DIR"],
        action = clap::ArgAction::Append
    )]
    group_dirs: Vec<String>,

    /// Show a target's generated files under a folder in IDE views
    #[arg(
        long = "ide-folder",
        num_args = 2,
        value_names = ["TARGET", "FOLDER"],
        action = clap::ArgAction::Append
    )]
    ide_folders: Vec<String>,

    /// Output directory for generated files
    #[arg(short, long, default_value = "binbed-out")]
    output: PathBuf,

    /// Embedding mechanism to generate for
    #[arg(long, value_enum, default_value = "host")]
    platform: PlatformArg,

    /// Target triple of the binary being built (defaults to the host)
    #[arg(long, env = "TARGET")]
    target_triple: Option<String>,

    /// When resource-table descriptors get populated
    #[arg(long, value_enum, default_value = "explicit")]
    init: InitArg,

    /// Identifier of the first resource-table entry of each target
    #[arg(long, default_value = "1000")]
    resource_id_base: u16,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only list registered resources without generating anything
    #[arg(long)]
    list_only: bool,

    /// Dry run - don't write files, just show what would be generated
    #[arg(long)]
    dry_run: bool,
}

/// Embedding mechanism selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PlatformArg {
    /// Whatever the target triple (or the host) uses
    Host,
    /// Link-section embedding, ELF assembler syntax
    Elf,
    /// Link-section embedding, Mach-O assembler syntax
    MachO,
    /// Resource-table embedding for PE binaries
    Pe,
}

/// Initialization mode for resource-table descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InitArg {
    /// The program calls binbed_<group>_init() itself
    Explicit,
    /// Also run the init routine as a static initializer before main
    PreMain,
}

impl From<InitArg> for InitMode {
    fn from(arg: InitArg) -> Self {
        match arg {
            InitArg::Explicit => InitMode::Explicit,
            InitArg::PreMain => InitMode::PreMain,
        }
    }
}

/// One registration request, in command-line order
#[derive(Debug, Clone, PartialEq, Eq)]
struct Registration {
    target: String,
    group: String,
    path: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    let registrations = collect_registrations(&cli)?;
    if registrations.is_empty() {
        bail!("Nothing to embed: pass --resource or --group-dir");
    }

    let mut registry = register_all(&registrations)?;
    for pair in cli.ide_folders.chunks(2) {
        if let [target, folder] = pair {
            registry.set_ide_folder(target, folder.clone());
        }
    }

    if cli.list_only {
        return list_resources(&registry);
    }

    generate(&cli, &mut registry)
}

/// Gather `--resource` entries followed by `--group-dir` expansions
fn collect_registrations(cli: &Cli) -> Result<Vec<Registration>> {
    let cwd = env::current_dir().context("Failed to determine the working directory")?;
    let mut registrations = Vec::new();

    for triple in cli.resources.chunks(3) {
        if let [target, group, path] = triple {
            registrations.push(Registration {
                target: target.clone(),
                group: group.clone(),
                path: absolutize(&cwd, Path::new(path)),
            });
        }
    }

    for triple in cli.group_dirs.chunks(3) {
        if let [target, group, dir] = triple {
            let dir = absolutize(&cwd, Path::new(dir));
            for path in files_in(&dir)? {
                registrations.push(Registration {
                    target: target.clone(),
                    group: group.clone(),
                    path,
                });
            }
        }
    }

    Ok(registrations)
}

fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Regular, non-hidden files below `directory`, sorted by name
fn files_in(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut files = Vec::new();
    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", directory.display(), e);
                continue;
            }
        };
        let path = entry.path();

        // Skip directories
        if !entry.file_type().is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            trace!("Skipping hidden file: {}", path.display());
            continue;
        }

        files.push(path.to_path_buf());
    }

    debug!("Found {} file(s) in {}", files.len(), directory.display());
    Ok(files)
}

/// Register everything, reporting every rejected registration before failing.
///
/// Build-scoped failures such as group conflicts stop immediately.
fn register_all(registrations: &[Registration]) -> Result<ResourceRegistry> {
    let mut registry = ResourceRegistry::new();
    let mut failures = 0usize;

    for r in registrations {
        match registry.register(&r.target, &r.group, &r.path) {
            Ok(resource) => debug!(
                "Registered {} as '{}' in {}/{}",
                r.path.display(),
                resource.symbol(),
                r.target,
                r.group
            ),
            Err(e) if e.scope() == FailureScope::Build => {
                return Err(e).with_context(|| {
                    format!("Failed to register {} for target '{}'", r.path.display(), r.target)
                });
            }
            Err(e) => {
                error!("{}", e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} registration(s) failed", failures);
    }

    info!(
        "Registered {} resource(s) across {} target(s)",
        registry.len(),
        registry.targets().len()
    );
    Ok(registry)
}

/// Compute a short hash of the content (first 8 chars of blake3)
fn content_digest(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hash.to_hex()[..8].to_string()
}

/// Print one line per registered resource
fn list_resources(registry: &ResourceRegistry) -> Result<()> {
    for group in registry.groups() {
        for resource in group.resources() {
            let data = fs::read(resource.path())
                .with_context(|| format!("Failed to read {}", resource.path().display()))?;
            println!(
                "{}\t{}\t{}\t{}\t{}\t{}",
                group.target(),
                group.name(),
                resource.symbol(),
                data.len(),
                content_digest(&data),
                resource.path().display()
            );
        }
    }
    Ok(())
}

/// Pick the platform from the command line, the target triple or the host
fn resolve_platform(cli: &Cli) -> Result<Platform> {
    let detected = match &cli.target_triple {
        Some(triple) => Platform::from_target_triple(triple)
            .with_context(|| format!("Unrecognized target triple: {}", triple))?,
        None => Platform::host(),
    };

    let format = match cli.platform {
        PlatformArg::Host => detected.format,
        PlatformArg::Elf => ObjectFormat::Elf,
        PlatformArg::MachO => ObjectFormat::MachO,
        PlatformArg::Pe => ObjectFormat::Pe,
    };
    Ok(Platform::new(format, detected.pointer_width))
}

/// Finalize every target and write its plan file
fn generate(cli: &Cli, registry: &mut ResourceRegistry) -> Result<()> {
    let platform = resolve_platform(cli)?;
    info!(
        "Embedding for {} ({}-bit pointers)",
        platform.format,
        platform.pointer_width.bytes() * 8
    );

    let config = EmbedderConfig {
        resource_table: ResourceTableConfig::new()
            .id_base(cli.resource_id_base)
            .init_mode(cli.init.into()),
        ..EmbedderConfig::default()
    };
    let generator = Generator::new(
        GeneratorConfig::new()
            .output_dir(&cli.output)
            .dry_run(cli.dry_run),
        embedder_for(platform, &config),
    );

    let targets: Vec<String> = registry.targets().into_iter().map(str::to_string).collect();
    let mut plan = BuildPlan::new();

    for target in &targets {
        let finalized = generator
            .finalize(registry, target, &mut plan)
            .with_context(|| format!("Failed to generate resources for target '{}'", target))?;

        for group in &finalized.groups {
            for file in group.files() {
                if cli.dry_run {
                    println!("Would write: {}", file.path.display());
                    if cli.verbose > 1 {
                        println!("---");
                        println!("{}", file.contents);
                        println!("---");
                    }
                } else {
                    println!("Wrote {}", file.path.display());
                }
            }
        }
    }

    for target in plan.targets() {
        let path = cli
            .output
            .join(format!("{}.plan", symbol::sanitize(&target.name)));
        if cli.dry_run {
            println!("Would write: {}", path.display());
            continue;
        }
        fs::create_dir_all(&cli.output)
            .with_context(|| format!("Failed to create directory: {}", cli.output.display()))?;
        fs::write(&path, target.render())
            .with_context(|| format!("Failed to write file: {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    info!(
        "Summary: {} resource(s), {} target(s), output in {}",
        registry.len(),
        targets.len(),
        cli.output.display()
    );

    Ok(())
}
