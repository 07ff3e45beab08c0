// SPDX-License-Identifier: MIT

//! Canvas workflow execution engine: compiles canvas graphs into execution
//! plans and drives them through queue-fed workers against pluggable
//! persistence, locking, skill, and accounting collaborators.

pub mod canvas;
pub mod engine;
pub mod error;
pub mod infra;
pub mod server;
