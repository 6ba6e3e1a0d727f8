mod share;
mod stream;

pub use share::*;
pub use stream::*;
