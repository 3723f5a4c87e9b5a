//! Error plumbing shared by the browseros crates.

pub mod context;

pub use context::FromMessage;
