#![forbid(unsafe_code)]

pub mod admission;
pub mod auth;
pub mod evidence;
