pub mod config;
pub mod error;
pub mod levels;
pub mod sample_buffer;
pub mod state;
pub mod track;
