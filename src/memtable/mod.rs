//! MemTable Module
//!
//! In-memory buffer of writes that have not reached a segment yet.
//!
//! ## Responsibilities
//! - Last-write-wins buffering of Set and Remove records
//! - Report the record count the flush trigger compares
//! - Ordered iteration for flushing
//!
//! ## Data Structure Choice
//! A plain BTreeMap. The engine's state lock already serializes writers
//! against readers, so the table carries no lock of its own. During a flush
//! the engine holds two generations: the active table and at most one frozen
//! (immutable) table.

mod table;

pub use table::MemTable;
