//! Integration tests for magnetdav
//!
//! These tests drive the full HTTP router over the simulated swarm and an
//! in-memory catalog, covering the JSON API, range streaming, conditional
//! requests, WebDAV discovery and authentication.

#[path = "integration/harness.rs"]
mod harness;

#[path = "integration/api_workflow.rs"]
mod api_workflow;
#[path = "integration/catalog_persistence.rs"]
mod catalog_persistence;
#[path = "integration/range_streaming.rs"]
mod range_streaming;
#[path = "integration/webdav_auth.rs"]
mod webdav_auth;
#[path = "integration/webdav_discovery.rs"]
mod webdav_discovery;
