mod client;
mod config;
mod logging;
mod stream;

pub use client::*;
pub use config::*;
pub use logging::*;
pub use stream::*;
