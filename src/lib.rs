pub mod config;
pub mod control;
pub mod drive;
pub mod error;
pub mod messages;
pub mod runtime;
pub mod sensors;
