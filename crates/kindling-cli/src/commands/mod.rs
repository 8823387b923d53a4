//! CLI commands

pub mod create;
pub mod delete;
pub mod host;
pub mod kind_utils;
pub mod render;
