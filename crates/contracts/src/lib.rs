//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace:
//! the delivery packet, subscriber descriptors, failure policy and the
//! configuration documents. Business crates depend on this crate only,
//! reverse dependencies are prohibited.
//!
//! ## Value Model
//! - Payloads, cookies and extra packet fields are `serde_json::Value`
//! - `Value::Null` is an ordinary payload, never a control signal

mod config;
mod error;
mod packet;
mod policy;
mod subscriber;

pub use config::*;
pub use error::*;
pub use packet::*;
pub use policy::*;
pub use subscriber::*;

pub use serde_json::{Map, Value};
