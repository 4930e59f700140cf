//! Domain Layer
//!
//! Entities, value objects, ports and pure services of the routing core.
//! Nothing in here performs network I/O.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod services;
pub mod value_objects;
