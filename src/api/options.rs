//! Output options and provider-specific extension parameters
//!
//! Every operation accepts a `RequestOptions`, made of the well-known output
//! fields understood by Nominatim, a separate map of extra query parameters,
//! and per-call overrides for caching, rate limiting and retries.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::fetch::FetchOptions;
use crate::params::QueryParams;

use super::ApiError;

/// Parameter names with a typed field somewhere in the API; extensions may not reuse them
pub const KNOWN_PARAMETERS: &[&str] = &[
    "q",
    "amenity",
    "street",
    "city",
    "county",
    "state",
    "country",
    "postalcode",
    "lat",
    "lon",
    "zoom",
    "format",
    "addressdetails",
    "extratags",
    "namedetails",
    "accept-language",
    "email",
    "polygon_geojson",
    "polygon_kml",
    "polygon_svg",
    "polygon_text",
    "polygon_threshold",
    "limit",
    "countrycodes",
    "exclude_place_ids",
    "viewbox",
    "bounded",
    "dedupe",
    "featureType",
    "layer",
];

/// Response formats for search and reverse lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Xml,
    #[default]
    Json,
    Jsonv2,
    Geojson,
    Geocodejson,
}

impl OutputFormat {
    /// Value sent as the `format` parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Xml => "xml",
            OutputFormat::Json => "json",
            OutputFormat::Jsonv2 => "jsonv2",
            OutputFormat::Geojson => "geojson",
            OutputFormat::Geocodejson => "geocodejson",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xml" => Ok(OutputFormat::Xml),
            "json" => Ok(OutputFormat::Json),
            "jsonv2" => Ok(OutputFormat::Jsonv2),
            "geojson" => Ok(OutputFormat::Geojson),
            "geocodejson" => Ok(OutputFormat::Geocodejson),
            _ => Err(format!(
                "Invalid format: '{}'. Valid formats: xml, json, jsonv2, geojson, geocodejson",
                s
            )),
        }
    }
}

/// Geometry output requested alongside each result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonOutput {
    Geojson,
    Kml,
    Svg,
    Text,
}

impl PolygonOutput {
    /// Name of the query parameter that switches this output on
    pub fn parameter(&self) -> &'static str {
        match self {
            PolygonOutput::Geojson => "polygon_geojson",
            PolygonOutput::Kml => "polygon_kml",
            PolygonOutput::Svg => "polygon_svg",
            PolygonOutput::Text => "polygon_text",
        }
    }
}

impl FromStr for PolygonOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "geojson" => Ok(PolygonOutput::Geojson),
            "kml" => Ok(PolygonOutput::Kml),
            "svg" => Ok(PolygonOutput::Svg),
            "text" => Ok(PolygonOutput::Text),
            _ => Err(format!(
                "Invalid polygon output: '{}'. Valid outputs: geojson, kml, svg, text",
                s
            )),
        }
    }
}

/// Well-known output fields shared by search and reverse
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputOptions {
    pub format: OutputFormat,
    /// Include a breakdown of the address into its elements
    pub address_details: Option<bool>,
    /// Include additional OSM tags such as wikipedia links or opening hours
    pub extra_tags: Option<bool>,
    /// Include the full list of names, including translations
    pub name_details: Option<bool>,
    /// Preferred languages for result names, e.g. `en,de`
    pub accept_language: Option<String>,
    /// Contact address for large numbers of requests
    pub email: Option<String>,
    /// Geometry format to include with each result
    pub polygon: Option<PolygonOutput>,
    /// Simplification tolerance in degrees for returned geometries
    pub polygon_threshold: Option<f64>,
}

impl OutputOptions {
    /// Checks the email address, language list and polygon threshold
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(email) = &self.email {
            let valid = email
                .split_once('@')
                .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
            if !valid {
                return Err(ApiError::invalid("email", "must be a valid email address"));
            }
        }
        if let Some(languages) = &self.accept_language {
            if languages.trim().is_empty() {
                return Err(ApiError::invalid("accept-language", "must not be empty"));
            }
        }
        if let Some(threshold) = self.polygon_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(ApiError::invalid(
                    "polygon_threshold",
                    "must be a non-negative number",
                ));
            }
        }
        Ok(())
    }

    /// Appends the output fields, including `format`, to `params`
    pub fn append_to(&self, params: &mut QueryParams) {
        params
            .append("format", self.format.as_str())
            .append("addressdetails", &self.address_details)
            .append("extratags", &self.extra_tags)
            .append("namedetails", &self.name_details)
            .append("accept-language", &self.accept_language)
            .append("email", &self.email);
        if let Some(polygon) = self.polygon {
            params.append(polygon.parameter(), &true);
        }
        params.append("polygon_threshold", &self.polygon_threshold);
    }
}

/// Provider-specific query parameters without a typed field
///
/// Keys are checked when inserted: they must be non-empty, consist of ASCII
/// letters, digits, `_`, `-`, `:` or `.`, and must not shadow a well-known
/// parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions(BTreeMap<String, String>);

impl Extensions {
    /// Creates an empty set of extension parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter after validating its key
    ///
    /// # Arguments
    /// * `key` - Parameter name sent to the server
    /// * `value` - Value sent verbatim
    ///
    /// # Returns
    /// * `Ok(())` if the key was accepted, replacing any earlier value
    /// * `Err(ApiError::InvalidParameter)` if the key is empty, malformed or
    ///   names a parameter that has a dedicated option
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Result<(), ApiError> {
        if key.is_empty() {
            return Err(ApiError::invalid(key, "parameter name must not be empty"));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
        {
            return Err(ApiError::invalid(key, "parameter name contains invalid characters"));
        }
        if KNOWN_PARAMETERS.contains(&key) {
            return Err(ApiError::invalid(
                key,
                "use the dedicated option instead of an extension parameter",
            ));
        }
        self.0.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Returns the value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    /// Whether no extension parameter is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of extension parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Appends every parameter to `params`, ordered by key
    pub fn append_to(&self, params: &mut QueryParams) {
        for (key, value) in &self.0 {
            params.append(key, value);
        }
    }
}

/// Options accepted by every operation
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub output: OutputOptions,
    pub extensions: Extensions,
    pub fetch: FetchOptions,
}
