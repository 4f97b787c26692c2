//! Claw CLI library: command implementations shared by the `claw` binary
//! and its integration tests.

pub mod commands;
