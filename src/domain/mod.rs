mod progress;
mod reconnect;
mod stream;
mod types;

pub use progress::*;
pub use reconnect::*;
pub use stream::*;
pub use types::*;
