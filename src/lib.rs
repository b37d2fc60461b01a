//! Workspace-wide repository sync and per-repository analysis pipeline.
//!
//! The crate lists every repository of a hosting workspace, keeps a local
//! clone of each in sync, and threads a mutable per-repository context
//! through an ordered set of analysis steps. One step submits the
//! repository to a remote code-quality scanner with de-duplication,
//! submission pacing, and a sync/async wait protocol.

pub mod cli;
pub mod config;
pub mod context;
pub mod fs;
pub mod git;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod steps;
pub mod util;
