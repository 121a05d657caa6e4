//! # sitegraph
//!
//! Library half of the sitegraph binary: HTTP API, CLI, configuration and
//! the service that ties the core engine to its collaborators.

pub mod api;
pub mod cli;
pub mod config;
pub mod controllers;
pub mod files;
pub mod service;
