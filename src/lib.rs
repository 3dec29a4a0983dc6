//! Per-URL HTTP latency from recorded packet traces.
//!
//! A capture is decoded into TCP segments ([`sniff`]), classified into
//! request/response events ([`parser`]), correlated per flow
//! ([`correlator`]) and folded into fixed-width time buckets
//! ([`aggregate`]). [`pipeline::Pipeline`] owns that state for one run and
//! produces a [`report::Report`].

pub mod aggregate;
pub mod config;
pub mod correlator;
pub mod error;
pub mod flow;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod sniff;
pub mod tracker;

pub use config::{Config, OutputFormat};
pub use error::{Error, Result};
pub use pipeline::{analyze_capture, Pipeline, PipelineStats};
pub use report::Report;
