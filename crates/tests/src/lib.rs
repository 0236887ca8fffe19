//! Cross-crate integration tests for Ambroute
//!
//! Drive detection, resolution and application together against the
//! in-memory host track graph.

#[cfg(test)]
mod apply_integration;
#[cfg(test)]
mod routing_scenarios;
