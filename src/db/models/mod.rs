// src/db/models/mod.rs

//! Data models for the set table
//!
//! Rows are read and written through these structs; SQL stays in this
//! module tree.

mod set;

pub use set::{NewSet, ProvSet, SetCounts, bulk_insert};
