mod observation;
mod result;

pub use observation::*;
pub use result::*;
