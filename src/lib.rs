#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// A fixed-capacity Robin Hood hash table for 64-bit keys and values.
pub mod table;

pub use table::CapacityError;
pub use table::InsertOutcome;
pub use table::RobinHoodTable;
pub use table::TableFull;
