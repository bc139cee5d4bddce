//! Listmatch Server Library
//!
//! Two parties find the keys their lists share by comparing salted,
//! truncated hashes through this server, which never sees the keys or the
//! salt.
//!
//! # Modules
//!
//! - `codec`: Wire format for hash streams
//! - `matching`: Bitmask membership matching
//! - `upload`: Bounded, expiring store of deposited hash sets
//! - `routes`: HTTP endpoints
//! - `keys`: Client-side key normalization and salted hashing

pub mod codec;
pub mod config;
pub mod error;
pub mod keys;
pub mod matching;
pub mod routes;
pub mod state;
pub mod upload;
