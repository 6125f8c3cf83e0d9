//! Reply post-processing: strip model artifacts, then optionally restyle.
//!
//! Both steps are best-effort. A pattern that does not match, or a style
//! transform that refuses its input, leaves the text as it was.

pub mod clean;
pub mod style;

pub use clean::ReplyCleaner;
pub use style::{stylize, stylize_with, StyleError, StyleFlags};
