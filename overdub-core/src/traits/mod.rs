pub mod input;
pub mod observer;
pub mod output;
