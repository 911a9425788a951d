//! Barcode to product name, and product name to verified safety data sheet.

pub mod api;
pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod normalize;
pub mod pdf;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod types;
pub mod verifier;

pub use pipeline::{Resolver, ResolverSettings};
pub use types::{ProductCandidate, ProductRecord, SdsResolution, SearchHit};
