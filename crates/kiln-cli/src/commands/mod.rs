//! CLI command implementations

pub(crate) mod archive;
pub(crate) mod clean;
pub(crate) mod common;
pub(crate) mod compile;
pub(crate) mod deps;
pub(crate) mod ls;
pub(crate) mod run;
pub(crate) mod seed;
