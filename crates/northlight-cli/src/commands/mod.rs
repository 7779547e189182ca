//! Command handlers

pub mod rmdp;
