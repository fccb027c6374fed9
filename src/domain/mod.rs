//! Domain model of the escrow engine: identities, records, lifecycle rules
//! and the ports the engine talks to.

pub mod event;
pub mod identity;
pub mod lifecycle;
pub mod ports;
pub mod split;
pub mod transaction;
