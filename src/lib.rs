#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod assertions;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod reflector;
pub mod report;
pub mod scope;
pub mod source_loader;
pub mod value;
