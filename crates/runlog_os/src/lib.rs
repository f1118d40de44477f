#![forbid(unsafe_code)]

pub mod admin;
pub mod clock;
pub mod gateway;
pub mod submission;
