pub mod collab;
pub mod config;
pub mod error;
pub mod expr;
pub mod memory;
pub mod merge;
pub mod metadata;
pub mod model;
pub mod resolve;
pub mod walk;
pub mod wasm;

pub use collab::{Collaborators, Overrides};
pub use config::ResolverConfig;
pub use error::{ErrorKind, ResolveError, Result};
pub use memory::InMemoryStore;
pub use metadata::MetadataRequest;
pub use resolve::PipelineResolver;
