pub mod sinks;

pub use sinks::{ConsoleSink, FileSink, ReadingSink};
