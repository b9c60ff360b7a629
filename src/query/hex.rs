//! Hexagonal cell ids (H3) for station points.

use super::QueryError;
use geo::Point;
use h3o::{LatLng, Resolution};

/// Resolution used when the caller does not pick one.
pub const DEFAULT_RESOLUTION: u8 = 8;

/// Parses a caller-supplied resolution. Anything but an integer in 0..=15
/// is rejected.
pub fn parse_resolution(raw: &str) -> Result<Resolution, QueryError> {
    let invalid = || QueryError::InvalidResolution(raw.to_string());
    let value: u8 = raw.trim().parse().map_err(|_| invalid())?;
    Resolution::try_from(value).map_err(|_| invalid())
}

/// The cell containing `position` at `resolution`, as its canonical hex string.
pub fn cell_id(position: &Point<f64>, resolution: Resolution) -> Option<String> {
    let coord = LatLng::new(position.y(), position.x()).ok()?;
    Some(coord.to_cell(resolution).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("8").unwrap(), Resolution::Eight);
        assert_eq!(parse_resolution("0").unwrap(), Resolution::Zero);
        assert_eq!(parse_resolution("15").unwrap(), Resolution::Fifteen);
    }

    #[test]
    fn test_invalid_resolutions_are_client_errors() {
        for raw in ["abc", "8.5", "-1", "16", ""] {
            let err = parse_resolution(raw).unwrap_err();
            assert!(matches!(err, QueryError::InvalidResolution(_)), "{raw}");
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn test_cell_id_is_deterministic() {
        let notre_dame = Point::new(2.3499, 48.8530);
        let a = cell_id(&notre_dame, Resolution::Eight).unwrap();
        let b = cell_id(&notre_dame, Resolution::Eight).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 15);
        assert_ne!(a, cell_id(&notre_dame, Resolution::Nine).unwrap());
    }

    #[test]
    fn test_cell_contains_point() {
        let point = Point::new(2.2945, 48.8584);
        let id = cell_id(&point, Resolution::Seven).unwrap();
        let cell: h3o::CellIndex = id.parse().unwrap();
        assert_eq!(cell.resolution(), Resolution::Seven);
        let expected = LatLng::new(48.8584, 2.2945).unwrap().to_cell(Resolution::Seven);
        assert_eq!(cell, expected);
    }
}
