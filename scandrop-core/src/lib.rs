//! # Scandrop Core
//!
//! Unattended intake for scanned documents: files dropped into a watched
//! directory are left to settle, searched for an identifying code and filed
//! under that code, or set aside with a failure reason.
//!
//! ## Feature Flags
//!
//! - `watch` (default): the `notify`-backed [`intake::WatchLoop`]
//! - `tool-adapters` (default): [`intake::adapters`] renderers and decoders
//!   that shell out to poppler-utils and zbar
//!
//! ## Architecture
//!
//! - [`intake::layout`]: the four directories and their invariants
//! - [`intake::stability`]: settling detection for files still being written
//! - [`intake::identify`]: the renderer/decoder seam and orientation retries
//! - [`intake::collision`]: race-free destination naming
//! - [`intake::task`]: one file, start to finish
//! - [`intake::dispatcher`]: bounded worker pool with backpressure
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scandrop_core::intake::{
//!     IntakeConfig, IntakeContext, IntakeLayout, WatchLoop, WorkerPool,
//!     adapters::{PopplerRenderer, ZbarIdentifier},
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! async fn serve(config: IntakeConfig) -> scandrop_core::Result<()> {
//!     let layout = IntakeLayout::prepare(&config.directories)?;
//!     let config = Arc::new(config);
//!     let ctx = IntakeContext::new(
//!         layout.clone(),
//!         Arc::clone(&config),
//!         Arc::new(PopplerRenderer::default()),
//!         Arc::new(ZbarIdentifier::default()),
//!     )?;
//!
//!     let pool = WorkerPool::start(Arc::new(ctx), config.pool);
//!     let cancel = CancellationToken::new();
//!     WatchLoop::new(&layout, config.watch.clone(), pool.dispatcher())
//!         .run(cancel)
//!         .await?;
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod error;
pub mod intake;

pub use error::{IntakeError, Result};
