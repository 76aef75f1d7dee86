//! EstateShare Common Types
//!
//! Shared types for the fractional property share ledger: identifiers,
//! share prices, trade requests and the error taxonomy.

pub mod identifiers;
pub mod price;
pub mod trade;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use price::*;
pub use trade::*;
pub use error::*;
pub use time::*;
