//! Nominatim API client
//!
//! `NominatimClient` turns typed queries into endpoint parameters, validates
//! them, and hands them to a shared [`DataFetcher`]. Validation failures are
//! reported as [`ApiError::InvalidParameter`] before any request is made.

mod options;
mod reverse;
mod search;
mod status;

pub use options::{
    Extensions, OutputFormat, OutputOptions, PolygonOutput, RequestOptions, KNOWN_PARAMETERS,
};
pub use reverse::{ReverseQuery, MAX_ZOOM};
pub use search::{SearchFilters, SearchQuery, StructuredQuery, Viewbox, LAYERS, MAX_SEARCH_LIMIT};
pub use status::StatusFormat;

use thiserror::Error;
use tracing::info;

use crate::config::ClientConfig;
use crate::fetch::{DataFetcher, FetchError, ResponseBody};
use crate::params::QueryParams;

/// Errors returned by [`NominatimClient`] operations
#[derive(Debug, Error)]
pub enum ApiError {
    /// A caller-supplied value was rejected before contacting the server
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ApiError {
    /// Shorthand for [`ApiError::InvalidParameter`]
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ApiError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Client for the search, reverse and status endpoints
#[derive(Debug, Clone)]
pub struct NominatimClient {
    fetcher: DataFetcher,
}

impl NominatimClient {
    /// Creates a client using HTTP from `config`
    pub fn new(config: &ClientConfig) -> Result<Self, FetchError> {
        let fetcher = DataFetcher::new(config)?;
        info!(base_url = fetcher.base_url(), "created Nominatim client");
        Ok(Self { fetcher })
    }

    /// Creates a client around an existing fetcher, sharing its cache and limiter
    pub fn with_fetcher(fetcher: DataFetcher) -> Self {
        Self { fetcher }
    }

    /// The fetcher used for every request
    pub fn fetcher(&self) -> &DataFetcher {
        &self.fetcher
    }

    /// Free-form search, e.g. `"Eiffel Tower, Paris"`
    pub async fn search(
        &self,
        query: &SearchQuery,
        options: &RequestOptions,
    ) -> Result<ResponseBody, ApiError> {
        let params = query.to_params(&options.output)?;
        self.execute("search", params, options).await
    }

    /// Search by address fields
    pub async fn structured_search(
        &self,
        query: &StructuredQuery,
        options: &RequestOptions,
    ) -> Result<ResponseBody, ApiError> {
        let params = query.to_params(&options.output)?;
        self.execute("search", params, options).await
    }

    /// Looks up the address nearest to a coordinate
    pub async fn reverse(
        &self,
        query: &ReverseQuery,
        options: &RequestOptions,
    ) -> Result<ResponseBody, ApiError> {
        let params = query.to_params(&options.output)?;
        self.execute("reverse", params, options).await
    }

    /// Reports server and database health
    ///
    /// Only the extension parameters and fetch overrides of `options` apply;
    /// the output fields are ignored.
    pub async fn status(
        &self,
        format: StatusFormat,
        options: &RequestOptions,
    ) -> Result<ResponseBody, ApiError> {
        let params = QueryParams::new().with("format", format.as_str());
        self.execute("status", params, options).await
    }

    async fn execute(
        &self,
        endpoint: &str,
        mut params: QueryParams,
        options: &RequestOptions,
    ) -> Result<ResponseBody, ApiError> {
        options.extensions.append_to(&mut params);
        let body = self.fetcher.fetch(endpoint, &params, &options.fetch).await?;
        Ok(body)
    }
}
