pub mod claude;
pub mod traits;
pub mod util;

pub use claude::Claude;
pub use traits::ChatCompletion;
