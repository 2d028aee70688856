//! Mini-Blog library.
//!
//! An HTTP API over a single SQLite file exposing posts and comments, where a
//! comment may reply to a top-level comment of the same post but never to a
//! reply.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod db;
pub mod web;
