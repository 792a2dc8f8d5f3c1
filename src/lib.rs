//! Materializes JBoss-Modules style module-path layouts from an XML
//! descriptor and builds the forked-JVM command line bound to them.
//!
//! The pipeline, leaves first:
//!
//! - **descriptor** - the generic element tree and the streaming parser
//!   that builds it from a module definition file
//! - **index** - `groupId:artifactId` coordinates mapped to resolved
//!   artifact files, built from the host build tool's dependency graph
//! - **layout** - the materializer that writes one directory plus
//!   `module.xml` per module, resolving `$...$` placeholders against the
//!   index and the compiled-classes directories
//! - **fork** - the child-JVM command builder (`-jar <loader> -mp <path>`)
//! - **config** / **preflight** - TOML run configuration and executable
//!   lookup for the command-line front end
//!
//! Everything is single-threaded and blocking; one run owns its element
//! tree and dependency index and nothing is shared across runs.

pub mod config;
pub mod descriptor;
pub mod fork;
pub mod index;
pub mod layout;
pub mod preflight;

pub use config::RunConfig;
pub use descriptor::{parse_descriptor, parse_descriptor_file, ElementNode, Module, ModuleKind, ParseError};
pub use fork::{module_path, ForkCommandBuilder};
pub use index::{DependencyIndex, DependencyNode, LocalRepository, ResolutionState};
pub use layout::{MaterializedLayout, Materializer, BOOTSTRAP_MODULE_NAME};
