#![forbid(unsafe_code)]

pub mod deadline;
pub mod error;
pub mod model;
pub mod review;
pub mod scoring;
pub mod streak;
pub mod time;

pub use deadline::Deadline;
pub use error::Error;
pub use time::Clock;
