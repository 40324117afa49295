//! Sample collection: perf subprocess control and output parsing

pub mod perf_session;
pub mod script_parser;

pub use perf_session::{spawn_sample_reader, PerfSession, SampleStream, ScriptReader};
pub use script_parser::{RawFrame, Sample, ScriptParser};
