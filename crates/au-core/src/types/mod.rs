//! Core data types: lifecycle and tag enums, frame envelopes, and the market
//! data snapshots held by the state store.

pub mod enums;
pub mod market_data;
pub mod message;

pub use enums::*;
pub use market_data::*;
pub use message::*;
