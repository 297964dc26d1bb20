// Caller-side plumbing around the extractor: configuration, logging,
// input loading, run identity and report rendering.

pub mod config;
pub mod input;
pub mod logging;
pub mod report;
pub mod run;
