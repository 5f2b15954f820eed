//! IP command implementations.

pub mod link;
pub mod monitor;
