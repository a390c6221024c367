//! Render pipelines.
//!
//! The gallery draws everything with the unlit textured pipeline in `basic`.

pub mod basic;
