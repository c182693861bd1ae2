pub mod archive;
pub mod batch;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod transform;
