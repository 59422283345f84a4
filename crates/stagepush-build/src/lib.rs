//! stagepush build - installer builders
//!
//! Produces the installer artifact a publish cycle uploads:
//! - runs an external packager (`process`)
//! - zips the staging tree or just its top-level binaries
//! - stamps the product version into a third-party tool script and runs the tool
//!
//! Exit codes are reported, not judged; the publish cycle compares them
//! against the configured success code.

pub mod archive;
pub mod launch;
pub mod runner;
pub mod script_patch;
pub mod strategy;

pub use launch::{LaunchConfig, PreRun};
pub use runner::{ProcessRunner, RunOutput};
pub use strategy::{InstallerStrategy, StrategyBuilder};
