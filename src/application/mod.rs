//! Application layer containing the escrow lifecycle orchestration.
//!
//! This module defines the `EscrowEngine`, the single entry point for every
//! escrow operation. The engine is split across files by concern: lifecycle
//! transitions, time windows, dispute settlement and advisory calls.

pub mod advisory;
pub mod dispute;
pub mod engine;
pub mod timeframe;
