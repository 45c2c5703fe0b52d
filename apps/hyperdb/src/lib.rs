//! # hyperdb
//!
//! Maintenance front end for a hyperdatabase directory.
//!
//! The binary is a thin layer over `hyperdb-core`: it loads a tracker file,
//! opens the database with the schema it declares and runs one command.
//! Mutating commands commit on success and roll back on error.

pub mod cli;
pub mod tracker;

pub use tracker::Tracker;
