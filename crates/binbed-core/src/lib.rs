//! # binbed-core
//!
//! A library for embedding arbitrary files into native executables and
//! libraries built with a C toolchain.
//!
//! Given (target, group, file) registrations, it generates:
//! - native build inputs that bind each file's bytes into the final binary
//! - one C header per group exposing a `{ data, size }` descriptor per file
//!
//! ## Architecture
//!
//! - [`registry`]: resource bookkeeping and build-wide invariants
//! - [`symbol`]: identifiers derived from file names
//! - [`embed`]: the two platform mechanisms (link section, resource table)
//! - [`header`]: per-group header generation
//! - [`wiring`]: attaching generated files to the consuming target
//! - [`generator`]: the `finalize` driver tying the above together
//! - [`error`]: error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use binbed_core::{embedder_for, BuildPlan, EmbedderConfig, Generator, GeneratorConfig};
//! use binbed_core::{Platform, ResourceRegistry};
//!
//! let mut registry = ResourceRegistry::new();
//! registry.register("app", "images", "/assets/mona_lisa.png")?;
//! registry.register("app", "images", "/assets/the_last_supper.png")?;
//!
//! let embedder = embedder_for(Platform::host(), &EmbedderConfig::default());
//! let generator = Generator::new(GeneratorConfig::new().output_dir("gen"), embedder);
//!
//! let mut plan = BuildPlan::new();
//! let finalized = generator.finalize(&mut registry, "app", &mut plan)?;
//! for header in finalized.headers() {
//!     println!("generated {}", header.display());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`Embedder`]: plug in another embedding mechanism
//! - [`TargetSink`]: connect a build tool's target model
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod embed;
pub mod error;
pub mod generator;
pub mod header;
pub mod layout;
pub mod registry;
pub mod symbol;
pub mod wiring;

// Re-export primary types for convenience
pub use embed::{
    embedder_for, Artifact, ArtifactKind, Embedder, EmbedderConfig, InitHook, InitMode,
    LinkSectionConfig, ObjectFormat, Platform, PointerWidth, ResourceTableConfig,
};
pub use error::{Error, FailureScope, Result};
pub use generator::{Finalized, Generator, GeneratorConfig, GroupPlan};
pub use header::HeaderGenerator;
pub use layout::OutputLayout;
pub use registry::{Group, ResourceFile, ResourceRegistry};
pub use symbol::Identifier;
pub use wiring::{BuildPlan, GenerationStep, TargetPlan, TargetSink};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
