//! Discovery, resolution and acquisition of Java runtimes.
//!
//! `javelin-lib` answers three questions: which runtimes are already
//! installed under a directory, which releases the remote registry can
//! offer for this platform, and how to download, verify and unpack one
//! that is missing. Byte-level transfer and extraction run as jobs behind
//! the [`acquire::JobRunner`] boundary.

pub mod acquire;
pub mod catalog;
pub mod paths;
pub mod platform;
pub mod runtime;
