mod filter;
pub use filter::LogFilter;

mod format;
pub use format::LogFormat;

mod timer;
pub use timer::UtcRfc3339;
