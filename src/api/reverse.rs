//! Reverse geocoding: coordinates to the nearest address

use crate::params::QueryParams;

use super::options::OutputOptions;
use super::search::validate_layers;
use super::ApiError;

/// Most detailed zoom level; 18 resolves to a building
pub const MAX_ZOOM: u8 = 18;

/// A point to look up
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReverseQuery {
    pub lat: f64,
    pub lon: f64,
    /// Level of detail, 0 (country) to 18 (building)
    pub zoom: Option<u8>,
    pub layer: Vec<String>,
}

impl ReverseQuery {
    /// Creates a query for a point with no zoom or layer restriction
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ..Default::default()
        }
    }

    /// Checks coordinate ranges, zoom and layers
    pub fn validate(&self) -> Result<(), ApiError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(ApiError::invalid("lat", "must be between -90 and 90"));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(ApiError::invalid("lon", "must be between -180 and 180"));
        }
        if let Some(zoom) = self.zoom {
            if zoom > MAX_ZOOM {
                return Err(ApiError::invalid(
                    "zoom",
                    format!("must be between 0 and {}", MAX_ZOOM),
                ));
            }
        }
        validate_layers(&self.layer)
    }

    /// Validates the query and builds its parameters
    pub fn to_params(&self, output: &OutputOptions) -> Result<QueryParams, ApiError> {
        self.validate()?;
        output.validate()?;

        let mut params = QueryParams::new();
        params
            .append("lat", &self.lat)
            .append("lon", &self.lon)
            .append("zoom", &self.zoom);
        output.append_to(&mut params);
        params.append("layer", &self.layer);
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_params() {
        let query = ReverseQuery {
            zoom: Some(18),
            ..ReverseQuery::new(51.5074, -0.1278)
        };

        let params = query.to_params(&OutputOptions::default()).unwrap();

        assert_eq!(
            params.to_query_string(),
            "lat=51.5074&lon=-0.1278&zoom=18&format=json"
        );
    }

    #[test]
    fn test_coordinate_bounds() {
        assert!(ReverseQuery::new(90.0, 180.0).validate().is_ok());
        assert!(ReverseQuery::new(-90.0, -180.0).validate().is_ok());

        let err = ReverseQuery::new(91.0, 0.0).validate().unwrap_err();
        assert!(err.to_string().contains("'lat'"));

        let err = ReverseQuery::new(0.0, -180.5).validate().unwrap_err();
        assert!(err.to_string().contains("'lon'"));

        assert!(ReverseQuery::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_zoom_above_maximum_is_rejected() {
        let query = ReverseQuery {
            zoom: Some(19),
            ..ReverseQuery::new(48.8566, 2.3522)
        };
        let err = query.to_params(&OutputOptions::default()).unwrap_err();
        assert!(err.to_string().contains("'zoom'"));
    }

    #[test]
    fn test_layer_filter() {
        let mut query = ReverseQuery::new(48.8566, 2.3522);
        query.layer = vec!["poi".to_string()];
        let params = query.to_params(&OutputOptions::default()).unwrap();
        assert_eq!(params.get("layer"), Some("poi"));

        query.layer = vec!["roads".to_string()];
        assert!(query.validate().is_err());
    }
}
