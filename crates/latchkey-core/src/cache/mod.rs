//! Insertion cache protocol
//!
//! Plain string entries under `key_prefix + key` with store-side expiry.
//! `add` is insert-if-absent: under racing adds exactly one payload wins and
//! every caller gets that payload back.

mod service;

pub use service::*;
