pub mod local;
pub mod upload;
