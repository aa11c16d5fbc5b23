//! The geocoding result type shared by every store and fetcher.

use serde::{Deserialize, Serialize};

/// A single geocoding match.
///
/// Latitude and longitude stay as the exact decimal strings the upstream
/// service returned; they are never parsed into floats. The serialized field
/// names match the Nominatim response shape, so the same type decodes upstream
/// bodies, encodes cache values and renders HTTP responses. Any extra upstream
/// fields are ignored on decode.
///
/// # Examples
///
/// ```
/// use geocache::location::Location;
///
/// let loc = Location::new("Brussels, Belgium", "50.8503", "4.3517");
/// let json = serde_json::to_string(&loc).unwrap();
/// assert_eq!(json, r#"{"display_name":"Brussels, Belgium","lat":"50.8503","lon":"4.3517"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    display_name: String,
    #[serde(rename = "lat")]
    latitude: String,
    #[serde(rename = "lon")]
    longitude: String,
}

impl Location {
    /// Creates a location from its display name and coordinate strings.
    pub fn new(
        display_name: impl Into<String>,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }

    /// Returns the canonical place name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the latitude, exactly as received.
    pub fn latitude(&self) -> &str {
        &self.latitude
    }

    /// Returns the longitude, exactly as received.
    pub fn longitude(&self) -> &str {
        &self.longitude
    }
}
