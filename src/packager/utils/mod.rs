//! Helpers shared by the staging step and the builders.

pub mod fs;
