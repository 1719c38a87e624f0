//! contains utils used in database construction and profiling

pub mod dumpload;
pub mod files;
pub mod parameters;
pub mod seqid;
pub mod seqops;

pub use files::*;
pub use parameters::*;
