#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! Core of depgraph: resolves an npm package's full transitive dependency
//! tree against a registry.

pub mod config;
pub mod deps;
pub mod error;
pub mod version;

pub use config::Config;
pub use error::Error;
pub use version::VERSION;
