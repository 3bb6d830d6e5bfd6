pub mod proxy;
pub mod scrape;

pub use proxy::*;
pub use scrape::*;
