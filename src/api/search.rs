//! Free-form and structured search
//!
//! Both flavours hit the `search` endpoint. A free-form query sends `q`; a
//! structured query sends individual address fields. They share the same
//! result filters.

use std::str::FromStr;

use crate::params::{QueryParams, QueryValue};

use super::options::OutputOptions;
use super::ApiError;

/// Maximum number of results Nominatim returns for one search
pub const MAX_SEARCH_LIMIT: u32 = 40;

const FEATURE_TYPES: [&str; 4] = ["country", "state", "city", "settlement"];

/// Layers a result may be restricted to
pub const LAYERS: [&str; 5] = ["address", "poi", "railway", "natural", "manmade"];

/// Preferred search area given by two corner points (longitude, latitude)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewbox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Viewbox {
    fn validate(&self) -> Result<(), ApiError> {
        let in_range = |lon: f64, lat: f64| {
            (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
        };
        if !in_range(self.x1, self.y1) || !in_range(self.x2, self.y2) {
            return Err(ApiError::invalid(
                "viewbox",
                "corners must be valid longitude,latitude pairs",
            ));
        }
        if self.x1 == self.x2 || self.y1 == self.y2 {
            return Err(ApiError::invalid("viewbox", "must span a non-empty area"));
        }
        Ok(())
    }
}

impl QueryValue for Viewbox {
    fn to_query_value(&self) -> Option<String> {
        Some(format!("{},{},{},{}", self.x1, self.y1, self.x2, self.y2))
    }
}

impl FromStr for Viewbox {
    type Err = String;

    /// Parses `x1,y1,x2,y2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let coords: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| format!("Invalid viewbox: '{}'. Expected x1,y1,x2,y2", s))?;
        match coords.as_slice() {
            [x1, y1, x2, y2] => Ok(Viewbox {
                x1: *x1,
                y1: *y1,
                x2: *x2,
                y2: *y2,
            }),
            _ => Err(format!("Invalid viewbox: '{}'. Expected x1,y1,x2,y2", s)),
        }
    }
}

/// Result filters shared by free-form and structured search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Maximum number of results, 1 to 40
    pub limit: Option<u32>,
    /// ISO 3166-1 alpha-2 codes restricting results to these countries
    pub country_codes: Vec<String>,
    /// Place IDs to leave out of the results
    pub exclude_place_ids: Vec<u64>,
    /// Area to prefer, or to restrict to when `bounded` is set
    pub viewbox: Option<Viewbox>,
    /// Restrict results to the viewbox instead of only preferring it
    pub bounded: Option<bool>,
    /// Collapse duplicate results
    pub dedupe: Option<bool>,
    /// One of `country`, `state`, `city`, `settlement`
    pub feature_type: Option<String>,
    /// Any of `address`, `poi`, `railway`, `natural`, `manmade`
    pub layer: Vec<String>,
}

impl SearchFilters {
    /// Checks limit, country codes, viewbox, feature type and layers
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(limit) = self.limit {
            if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
                return Err(ApiError::invalid(
                    "limit",
                    format!("must be between 1 and {}", MAX_SEARCH_LIMIT),
                ));
            }
        }
        for code in &self.country_codes {
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(ApiError::invalid(
                    "countrycodes",
                    format!("'{}' is not a two-letter country code", code),
                ));
            }
        }
        if let Some(viewbox) = &self.viewbox {
            viewbox.validate()?;
        }
        if let Some(feature_type) = &self.feature_type {
            if !FEATURE_TYPES.contains(&feature_type.as_str()) {
                return Err(ApiError::invalid(
                    "featureType",
                    format!("must be one of {}", FEATURE_TYPES.join(", ")),
                ));
            }
        }
        validate_layers(&self.layer)
    }

    /// Appends the set filters to `params`; country codes are lowercased
    pub fn append_to(&self, params: &mut QueryParams) {
        let country_codes: Vec<String> =
            self.country_codes.iter().map(|c| c.to_lowercase()).collect();
        params
            .append("limit", &self.limit)
            .append("countrycodes", &country_codes)
            .append("exclude_place_ids", &self.exclude_place_ids)
            .append("viewbox", &self.viewbox)
            .append("bounded", &self.bounded)
            .append("dedupe", &self.dedupe)
            .append("featureType", &self.feature_type)
            .append("layer", &self.layer);
    }
}

pub(crate) fn validate_layers(layers: &[String]) -> Result<(), ApiError> {
    match layers.iter().find(|l| !LAYERS.contains(&l.as_str())) {
        Some(unknown) => Err(ApiError::invalid(
            "layer",
            format!("'{}' is not one of {}", unknown, LAYERS.join(", ")),
        )),
        None => Ok(()),
    }
}

/// A free-form search such as `"Eiffel Tower, Paris"`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub q: String,
    pub filters: SearchFilters,
}

impl SearchQuery {
    /// Creates a query for `q` with no filters
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            filters: SearchFilters::default(),
        }
    }

    /// Validates the query and builds its parameters
    pub fn to_params(&self, output: &OutputOptions) -> Result<QueryParams, ApiError> {
        if self.q.trim().is_empty() {
            return Err(ApiError::invalid("q", "search query must not be empty"));
        }
        self.filters.validate()?;
        output.validate()?;

        let mut params = QueryParams::new();
        params.append("q", &self.q);
        output.append_to(&mut params);
        self.filters.append_to(&mut params);
        Ok(params)
    }
}

/// A search by individual address fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredQuery {
    pub amenity: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postalcode: Option<String>,
    pub filters: SearchFilters,
}

impl StructuredQuery {
    fn fields(&self) -> [(&'static str, &Option<String>); 7] {
        [
            ("amenity", &self.amenity),
            ("street", &self.street),
            ("city", &self.city),
            ("county", &self.county),
            ("state", &self.state),
            ("country", &self.country),
            ("postalcode", &self.postalcode),
        ]
    }

    /// Validates the query and builds its parameters
    ///
    /// At least one address field must be non-empty.
    pub fn to_params(&self, output: &OutputOptions) -> Result<QueryParams, ApiError> {
        let has_field = self
            .fields()
            .iter()
            .any(|(_, value)| value.as_deref().is_some_and(|v| !v.trim().is_empty()));
        if !has_field {
            return Err(ApiError::invalid(
                "structured",
                "at least one of amenity, street, city, county, state, country, postalcode is required",
            ));
        }
        self.filters.validate()?;
        output.validate()?;

        let mut params = QueryParams::new();
        for (name, value) in self.fields() {
            let value = value.as_deref().map(str::trim).filter(|v| !v.is_empty());
            params.append(name, &value);
        }
        output.append_to(&mut params);
        self.filters.append_to(&mut params);
        Ok(params)
    }
}
