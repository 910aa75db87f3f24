//! ProtoPad: compile C# fragments, run them locally or on a connected
//! device, and map dumps and failures back onto the fragment.

pub mod cache;
pub mod cli;
pub mod compile;
pub mod config;
pub mod dump;
pub mod execution;
pub mod handlers;
pub mod instrument;
pub mod mapper;
pub mod printer;
pub mod session;
pub mod target;
pub mod template;
pub mod transport;
pub mod utils;
