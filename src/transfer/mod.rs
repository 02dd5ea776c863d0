//! File-level building blocks of a transfer: what to skip, how to copy one
//! entry, and how conflicting copies are named and tagged.

pub mod conflict;
pub mod copy;
pub mod filter;
