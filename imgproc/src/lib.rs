pub mod border;
pub mod census;
pub mod mean;

pub use border::*;
pub use census::*;
pub use mean::*;
