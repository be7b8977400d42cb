//! Cryptographic primitives for license and update verification.

pub mod digest;
pub mod keys;
pub mod verify;
