//! Wire format for cached values in the persistent backends.
//!
//! A cache value is the JSON array of locations, using the same field names
//! as the upstream response. The encoding is lossless for any sequence,
//! including the empty one.

use crate::location::Location;

use super::StoreError;

/// Serializes a sequence of locations to JSON bytes.
pub fn encode(locations: &[Location]) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(locations)?)
}

/// Deserializes JSON bytes produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<Vec<Location>, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Decodes a stored value, if there is one, into a cache answer.
///
/// A missing value and a stored empty sequence both read as `None`, so an
/// empty answer never counts as a hit.
pub fn decode_stored(raw: Option<&[u8]>) -> Result<Option<Vec<Location>>, StoreError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let locations = decode(raw)?;
    Ok((!locations.is_empty()).then_some(locations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ranked_sequence() {
        let locations = vec![
            Location::new("Brussels, Belgium", "50.8503", "4.3517"),
            Location::new("Brussels, Wisconsin", "44.7366", "-87.6209"),
        ];
        let bytes = encode(&locations).unwrap();
        assert_eq!(decode(&bytes).unwrap(), locations);
    }

    #[test]
    fn round_trips_empty_sequence() {
        let bytes = encode(&[]).unwrap();
        assert_eq!(bytes, b"[]");
        assert!(decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn uses_upstream_field_names() {
        let bytes = encode(&[Location::new("Galway", "53.27", "-9.05")]).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"[{"display_name":"Galway","lat":"53.27","lon":"-9.05"}]"#
        );
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(decode(b"not json"), Err(StoreError::Codec(_))));
    }

    #[test]
    fn stored_value_decodes_to_hit() {
        let bytes = encode(&[Location::new("Galway", "53.27", "-9.05")]).unwrap();
        assert_eq!(
            decode_stored(Some(bytes.as_slice())).unwrap(),
            Some(vec![Location::new("Galway", "53.27", "-9.05")])
        );
    }

    #[test]
    fn missing_and_empty_values_are_absent() {
        assert_eq!(decode_stored(None).unwrap(), None);
        assert_eq!(decode_stored(Some(&b"[]"[..])).unwrap(), None);
    }

    #[test]
    fn corrupt_stored_value_is_an_error() {
        assert!(matches!(
            decode_stored(Some(&b"{oops"[..])),
            Err(StoreError::Codec(_))
        ));
    }
}
