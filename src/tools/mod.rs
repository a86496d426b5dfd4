pub mod video_tools;
pub mod image_tools;
pub mod log;
pub mod geometry;
pub mod recognition;
pub mod file_tools;
pub mod scheduler;

pub mod text_tools;

pub mod clock;
