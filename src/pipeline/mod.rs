//! Pipeline entry points for crawler operations.
//!
//! - `Crawler`: one pass over one group or doulist
//! - `run_poll`: repeat passes over a set of collections until cancelled

pub mod crawl;
pub mod poll;

pub use crawl::{Crawler, PageWindow};
pub use poll::{PollTargets, run_pass, run_poll};
