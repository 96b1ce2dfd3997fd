// src/lib.rs

//! group-spy: polls community group and doulist pages for posts matching
//! keywords and keeps them in a local SQLite database.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
