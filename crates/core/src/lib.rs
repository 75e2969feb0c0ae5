#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and pure logic for the visits tracker.

pub mod accumulate;
pub mod api;
pub mod error;
pub mod model;

mod util;

pub use accumulate::{apply_poll, increment, observed_count, FetchResult};
pub use error::TaskError;
pub use model::*;
pub use util::{new_task_id, now_utc};
