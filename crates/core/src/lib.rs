//! Ambroute core: multi-channel routing conflict detection and resolution
//!
//! Containers of an ambient soundscape route their output channels onto a
//! shared physical channel space. This crate detects containers that put
//! different logical signals on the same physical channel and computes
//! labeled, explainable re-routings that resolve those collisions.

pub mod domain;
