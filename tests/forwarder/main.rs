//! Forwarder E2E tests
//!
//! Drives the full intake loop against in-memory collaborators: a replaying record
//! source, a recording work queue and a recording commit sink. No broker required.

mod harness;
mod pipeline;
mod run_loop;
