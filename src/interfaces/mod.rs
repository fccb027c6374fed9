//! Outer surfaces: CSV command input, registry output and the command runner.

pub mod csv;
pub mod runner;
