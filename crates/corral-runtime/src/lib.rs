//! Container lifecycle management for the Corral runtime.
//!
//! The supervisor side (state store, launcher, lifecycle commands,
//! network wiring) runs in the invoking process and never mutates
//! process-wide state; the init side (`init` module) runs in the cloned
//! child and composes the `corral-core` primitives into the isolation
//! pipeline before exec'ing the payload.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod exec;
pub mod image;
pub mod init;
pub mod launcher;
pub mod logs;
pub mod monitor;
pub mod network;
pub mod state;
pub mod supervisor;
