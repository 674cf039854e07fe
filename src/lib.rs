//! Clinic Visor library - queue display and attendant console
//!
//! This module exports internal components for integration testing.

pub mod announcer;
pub mod cli;
pub mod client;
pub mod config;
pub mod console;
pub mod display;
pub mod health;
pub mod model;
pub mod redact;
pub mod screen;
pub mod sequencer;
