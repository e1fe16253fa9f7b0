//! Domain Layer
//!
//! Trait abstractions the pipelines depend on.
//!
//! - **Ports** (`ports.rs`) - lane channels and the coding primitive
//!
//! # Usage
//!
//! ```ignore
//! use stripeflow::domain::{ByteSink, ByteSource};
//!
//! async fn copy_stripe<S: ByteSource, K: ByteSink>(src: &mut S, dst: &mut K) -> Result<()> {
//!     let mut buf = vec![0u8; 4096];
//!     let n = src.read(&mut buf).await?;
//!     buf.truncate(n);
//!     dst.write(buf.into()).await
//! }
//! ```

pub mod ports;

pub use ports::{BoxSink, BoxSource, ByteSink, ByteSource, StripeCoder};
