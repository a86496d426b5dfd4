pub mod image;
pub mod job;
pub mod render;
pub mod progress;
