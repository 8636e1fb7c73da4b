//! Personas for composable assistant behavior
//!
//! A persona is a named base prompt plus the memories injected into it:
//! - `definition` declares personas (built-in and YAML)
//! - `registry` holds the materialized personas and the active one

pub mod definition;
pub mod registry;

pub use definition::PersonaLoader;
pub use registry::PersonaRegistry;
