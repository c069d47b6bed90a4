//! The object-store collaborator of the benchmark.
//!
//! Everything the benchmark needs from a remote store is expressed through the [`ObjectClient`]
//! trait: point reads and writes of a single object, plus listing and batched deletion for
//! clearing a bucket before a run. Two implementations are provided:
//!
//! - [`S3Client`] talks to Amazon S3 or any S3-compatible service.
//! - [`InMemoryClient`] keeps objects in process memory and can simulate a store that serves
//!   stale values, which is useful for dry runs and tests.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod common;
mod error;
mod in_memory;
mod s3_compatible;

pub use common::{KeyStream, ObjectClient, SharedClient};
pub use error::{ClientError, ClientResult};
pub use in_memory::InMemoryClient;
pub use s3_compatible::{S3Client, S3Config};
