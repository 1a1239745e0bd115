//! Command-line interface parsing for the Nominatim CLI
//!
//! This module handles parsing of CLI arguments using clap, turning them into
//! a client configuration and typed queries, and mapping failures to
//! user-facing messages.

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::api::{
    ApiError, NominatimClient, OutputFormat, OutputOptions, PolygonOutput, RequestOptions,
    ReverseQuery, SearchFilters, SearchQuery, StatusFormat, StructuredQuery, Viewbox,
};
use crate::config::{ClientConfig, ConfigError};
use crate::fetch::{FetchError, ResponseBody};

/// Error types for the command-line front end
#[derive(Debug, Error)]
pub enum CliError {
    /// A `--param` argument was not of the form KEY=VALUE
    #[error("Invalid parameter '{0}'. Expected KEY=VALUE")]
    InvalidKeyValue(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<FetchError> for CliError {
    fn from(err: FetchError) -> Self {
        CliError::Api(ApiError::Fetch(err))
    }
}

/// Nominatim CLI - Geocode addresses and coordinates with OpenStreetMap
#[derive(Parser, Debug)]
#[command(name = "nominatim")]
#[command(about = "Search, reverse geocode and check status against a Nominatim server")]
#[command(version)]
pub struct Cli {
    /// Nominatim server to query (overrides NOMINATIM_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Do not cache responses
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Send requests without client-side rate limiting
    #[arg(long, global = true)]
    pub no_rate_limit: bool,

    /// Make a single attempt per request
    #[arg(long, global = true)]
    pub no_retry: bool,

    /// Maximum attempts per request, including the first
    #[arg(long, global = true, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Log requests, retries and cache activity to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Extra query parameter passed through to the server
    ///
    /// Examples:
    ///   nominatim --param entrances=1 reverse --lat 52.5 --lon 13.4
    #[arg(long = "param", global = true, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Free-form search, e.g. "Eiffel Tower, Paris"
    Search {
        /// Text to search for
        query: String,
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Search by address fields
    Structured {
        #[arg(long)]
        amenity: Option<String>,
        #[arg(long)]
        street: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        county: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        postalcode: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Find the address at a coordinate
    Reverse {
        /// Latitude, -90 to 90
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude, -180 to 180
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Level of detail, 0 (country) to 18 (building)
        #[arg(long)]
        zoom: Option<u8>,
        /// Restrict results to these layers (comma separated)
        #[arg(long, value_delimiter = ',')]
        layer: Vec<String>,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Check that the server and its database are available
    Status {
        /// Response format: text or json
        #[arg(long, value_name = "FORMAT")]
        format: Option<StatusFormat>,
    },
}

/// Result filters for both search commands
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Maximum number of results (1-40)
    #[arg(long)]
    pub limit: Option<u32>,

    /// Two-letter country codes (comma separated)
    #[arg(long = "countrycodes", value_delimiter = ',', value_name = "CODES")]
    pub country_codes: Vec<String>,

    /// Place IDs to leave out (comma separated)
    #[arg(long = "exclude-place-ids", value_delimiter = ',', value_name = "IDS")]
    pub exclude_place_ids: Vec<u64>,

    /// Preferred area as x1,y1,x2,y2
    #[arg(long, allow_hyphen_values = true, value_name = "X1,Y1,X2,Y2")]
    pub viewbox: Option<Viewbox>,

    /// Only return results inside the viewbox
    #[arg(long)]
    pub bounded: bool,

    /// Keep duplicate results
    #[arg(long)]
    pub no_dedupe: bool,

    /// country, state, city or settlement
    #[arg(long = "feature-type")]
    pub feature_type: Option<String>,

    /// Restrict results to these layers (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub layer: Vec<String>,
}

impl FilterArgs {
    /// Converts the flags into search filters; unset flags are left out
    pub fn to_filters(&self) -> SearchFilters {
        SearchFilters {
            limit: self.limit,
            country_codes: self.country_codes.clone(),
            exclude_place_ids: self.exclude_place_ids.clone(),
            viewbox: self.viewbox,
            bounded: self.bounded.then_some(true),
            dedupe: self.no_dedupe.then_some(false),
            feature_type: self.feature_type.clone(),
            layer: self.layer.clone(),
        }
    }
}

/// Output fields for search and reverse
#[derive(Args, Debug, Default)]
pub struct OutputArgs {
    /// xml, json, jsonv2, geojson or geocodejson
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Include an address breakdown
    #[arg(long)]
    pub addressdetails: bool,

    /// Include extra OSM tags
    #[arg(long)]
    pub extratags: bool,

    /// Include all name variants
    #[arg(long)]
    pub namedetails: bool,

    /// Preferred result languages, e.g. en,de
    #[arg(long = "accept-language", value_name = "LANGS")]
    pub accept_language: Option<String>,

    /// Contact email sent with each request
    #[arg(long)]
    pub email: Option<String>,

    /// Include geometry as geojson, kml, svg or text
    #[arg(long)]
    pub polygon: Option<PolygonOutput>,

    /// Geometry simplification tolerance in degrees
    #[arg(long = "polygon-threshold", value_name = "DEGREES")]
    pub polygon_threshold: Option<f64>,
}

impl OutputArgs {
    /// Converts the flags into output options, defaulting to `format=json`
    pub fn to_output(&self) -> OutputOptions {
        OutputOptions {
            format: self.format.unwrap_or_default(),
            address_details: self.addressdetails.then_some(true),
            extra_tags: self.extratags.then_some(true),
            name_details: self.namedetails.then_some(true),
            accept_language: self.accept_language.clone(),
            email: self.email.clone(),
            polygon: self.polygon,
            polygon_threshold: self.polygon_threshold,
        }
    }
}

/// Parses a `KEY=VALUE` argument. The value may itself contain `=`.
pub fn parse_key_value(s: &str) -> Result<(String, String), CliError> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::InvalidKeyValue(s.to_string())),
    }
}

impl Cli {
    /// Applies the global flags on top of `config`
    pub fn apply_to(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if self.no_rate_limit {
            config.rate_limit.enabled = false;
        }
        if self.no_retry {
            config.retry.enabled = false;
        }
        if let Some(attempts) = self.max_attempts {
            config.retry.max_attempts = attempts;
        }
    }

    /// Builds the per-request options from the subcommand's output flags and `--param`
    pub fn request_options(&self) -> Result<RequestOptions, ApiError> {
        let mut options = RequestOptions::default();
        match &self.command {
            Command::Search { output, .. }
            | Command::Structured { output, .. }
            | Command::Reverse { output, .. } => options.output = output.to_output(),
            Command::Status { .. } => {}
        }
        for (key, value) in &self.params {
            options.extensions.insert(key, value.as_str())?;
        }
        Ok(options)
    }

    /// Runs the selected subcommand against `client`
    pub async fn execute(&self, client: &NominatimClient) -> Result<ResponseBody, CliError> {
        let options = self.request_options()?;
        let body = match &self.command {
            Command::Search { query, filters, .. } => {
                let query = SearchQuery {
                    q: query.clone(),
                    filters: filters.to_filters(),
                };
                client.search(&query, &options).await?
            }
            Command::Structured {
                amenity,
                street,
                city,
                county,
                state,
                country,
                postalcode,
                filters,
                ..
            } => {
                let query = StructuredQuery {
                    amenity: amenity.clone(),
                    street: street.clone(),
                    city: city.clone(),
                    county: county.clone(),
                    state: state.clone(),
                    country: country.clone(),
                    postalcode: postalcode.clone(),
                    filters: filters.to_filters(),
                };
                client.structured_search(&query, &options).await?
            }
            Command::Reverse {
                lat,
                lon,
                zoom,
                layer,
                ..
            } => {
                let query = ReverseQuery {
                    lat: *lat,
                    lon: *lon,
                    zoom: *zoom,
                    layer: layer.clone(),
                };
                client.reverse(&query, &options).await?
            }
            Command::Status { format } => {
                client.status(format.unwrap_or_default(), &options).await?
            }
        };
        Ok(body)
    }
}

/// Maps an error to the message shown to the user
///
/// Rate limiting, server outages, rejected requests, network failures, bad
/// input and unreadable responses each get their own wording.
pub fn describe_error(err: &CliError) -> String {
    match err {
        CliError::InvalidKeyValue(_) => err.to_string(),
        CliError::Config(e) => format!("Configuration error: {}", e),
        CliError::Api(ApiError::InvalidParameter { .. }) => err.to_string(),
        CliError::Api(ApiError::Fetch(fetch)) => match fetch {
            FetchError::Http { status: 429, .. } => {
                "Rate limited by the Nominatim server (HTTP 429). Wait a moment and try again."
                    .to_string()
            }
            FetchError::Http { status, status_text } if (500..600).contains(status) => format!(
                "Nominatim server unavailable (HTTP {}: {}). Try again later.",
                status, status_text
            ),
            FetchError::Http { status, status_text } => format!(
                "Request rejected by the Nominatim server (HTTP {}: {}).",
                status, status_text
            ),
            FetchError::Network(message) => {
                format!("Could not reach the Nominatim server: {}", message)
            }
            FetchError::Parse(e) => format!("Could not parse the server response: {}", e),
            FetchError::ClientBuild(e) => format!("Could not set up the HTTP client: {}", e),
        },
    }
}
