mod age;
mod cache;
mod calendar;
mod combined;
mod error;
mod excess;
mod fetch;
mod ioutil;
mod progress;
mod reference;
mod source;
mod tidy;
mod timeseries;
mod transform;
pub mod eurostat;
pub mod hmd;

pub use age::*;
pub use cache::*;
pub use calendar::*;
pub use combined::*;
pub use error::*;
pub use excess::*;
pub use fetch::*;
pub use ioutil::{is_remote, magic_open, open_location, write_output};
pub use progress::*;
pub use reference::*;
pub use source::*;
pub use tidy::*;
pub use timeseries::*;
pub use transform::*;


/// Environment variable naming the trusted combined dataset used by
/// `rescale` steps.
pub static REFERENCE_ENV: &'static str = "COVID_AGE_REFERENCE";
