//! Catalog search client.
//!
//! Issues spatial/temporal/attribute queries against a remote metadata
//! catalog and yields asset descriptors as a lazy, paginated stream:
//!
//! - Pagination is transparent: the stream keeps fetching pages until the
//!   catalog is exhausted or the caller stops consuming it. Dropping the
//!   stream stops pagination; remaining pages are never fetched.
//! - Transient transport failures are retried with exponential backoff.
//! - Every yielded descriptor intersects the requested region and lies
//!   within the requested time interval.
//!
//! # Example
//!
//! ```rust,ignore
//! use catalog_client::{CatalogClient, CompareOp, SearchRequest};
//! use raster_common::BoundingBox;
//!
//! let client = CatalogClient::connect("https://catalog.example.com")?;
//! let request = SearchRequest::collections(["sentinel-2-l2a"])
//!     .within(BoundingBox::new(-105.3, 39.9, -104.9, 40.1))
//!     .between(start, end)
//!     .filter("cloud_cover", CompareOp::Lt, 10.0);
//!
//! let descriptors = client.search_collected(request).await?;
//! ```

pub mod client;
pub mod error;
pub mod request;
pub mod transport;

pub use client::{AssetStream, CatalogClient, RetryPolicy};
pub use error::QueryError;
pub use request::{AttributeFilter, CompareOp, SearchRequest, SpatialFilter};
pub use transport::{CatalogTransport, HttpTransport, SearchPage, TransportError};
