//! Host-side implementations of the Ambroute core traits

pub mod host;
