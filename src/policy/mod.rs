//! Access policy applied to verified license claims.

pub mod access;
