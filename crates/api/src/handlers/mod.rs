pub mod cache;
pub mod sculptures;
pub mod tasks;
