pub mod job;
pub mod pipeline;
