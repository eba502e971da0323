//! Tool catalog and the user management tools
//!
//! Provides the immutable registry served by `tools/list` and the tool implementations
//! executed by `tools/call`.

pub mod registry;
pub mod tools;
