use std::{fmt::Display, str::FromStr};

use geo::{Coord, Rect};
use itertools::Itertools;
use shrinkwraprs::Shrinkwrap;

use crate::{
    crs_geo::{Crs, CrsGeometry},
    errors::{Result, StacrioError},
    intersection::Intersection,
};

/// Geographic bounding box (`EPSG:4326`, lon/lat).
///
/// Serialized as `[min-lon, min-lat, max-lon, max-lat]`.
#[derive(Shrinkwrap, Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Bbox(Rect);

impl Bbox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let values = [min_x, min_y, max_x, max_y];
        if values.iter().any(|value| !value.is_finite()) || min_x > max_x || min_y > max_y {
            return Err(StacrioError::InvalidBbox(format!("{values:?}")));
        }
        Ok(Self(Rect::new((min_x, min_y), (max_x, max_y))))
    }

    /// From a STAC `bbox` array, 2D (4 values) or 3D (6 values).
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match *values {
            [min_x, min_y, max_x, max_y] => Self::new(min_x, min_y, max_x, max_y),
            [min_x, min_y, _, max_x, max_y, _] => Self::new(min_x, min_y, max_x, max_y),
            _ => Err(StacrioError::InvalidBbox(format!("{values:?}"))),
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        let (min, max) = (self.0.min(), self.0.max());
        [min.x, min.y, max.x, max.y]
    }

    pub fn geo_bounds(&self) -> GeoBounds {
        GeoBounds(CrsGeometry::new(Crs::WGS84, self.0))
    }

    pub fn intersects(&self, other: &Bbox) -> bool {
        self.0.intersects(&other.0)
    }
}

impl Display for Bbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.to_array().iter().join(", "))
    }
}

impl FromStr for Bbox {
    type Err = StacrioError;

    /// Four comma separated floats: `min-lon,min-lat,max-lon,max-lat`.
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|value| value.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| StacrioError::InvalidBbox(s.into()))?;
        if values.len() != 4 {
            return Err(StacrioError::InvalidBbox(s.into()));
        }
        Self::from_slice(&values)
    }
}

impl TryFrom<Vec<f64>> for Bbox {
    type Error = StacrioError;
    fn try_from(value: Vec<f64>) -> Result<Self> {
        Self::from_slice(&value)
    }
}

impl From<Bbox> for Vec<f64> {
    fn from(value: Bbox) -> Self {
        value.to_array().to_vec()
    }
}

/// Footprint of a catalog entry, read from its document `bbox`.
///
/// Longitudes run west to east, so `west > east` crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl Footprint {
    /// From a STAC `bbox` array, 2D (4 values) or 3D (6 values).
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let (west, south, east, north) = match *values {
            [west, south, east, north] => (west, south, east, north),
            [west, south, _, east, north, _] => (west, south, east, north),
            _ => return Err(StacrioError::InvalidBbox(format!("{values:?}"))),
        };
        let footprint = Self {
            west,
            south,
            east,
            north,
        };
        let longitude = -180.0..=180.0;
        let valid = if footprint.crosses_antimeridian() {
            longitude.contains(&west) && longitude.contains(&east) && south <= north
        } else {
            Bbox::new(west, south, east, north).is_ok()
        };
        if !valid {
            return Err(StacrioError::InvalidBbox(format!("{values:?}")));
        }
        Ok(footprint)
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// The footprint as boxes that do not wrap, one east and one west of the
    /// antimeridian when it crosses.
    pub fn parts(&self) -> Vec<Bbox> {
        let boxes = if self.crosses_antimeridian() {
            vec![
                Rect::new((self.west, self.south), (180., self.north)),
                Rect::new((-180., self.south), (self.east, self.north)),
            ]
        } else {
            vec![Rect::new((self.west, self.south), (self.east, self.north))]
        };
        boxes.into_iter().map(Bbox).collect()
    }

    pub fn intersects(&self, bbox: &Bbox) -> bool {
        self.parts().iter().any(|part| part.intersects(bbox))
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }
}

/// Bounds in 'geospace' with an explicit crs.
#[derive(Shrinkwrap, Debug, Clone, PartialEq)]
pub struct GeoBounds(CrsGeometry<Rect>);

impl GeoBounds {
    pub fn new(crs: Crs, rect: Rect) -> Self {
        Self(CrsGeometry::new(crs, rect))
    }

    pub fn crs(&self) -> Crs {
        self.0.crs()
    }

    pub fn rect(&self) -> Rect {
        *self.0
    }

    /// Bounding rect of these bounds expressed in `crs`.
    pub fn projected(&self, crs: Crs) -> Result<GeoBounds> {
        Ok(GeoBounds::new(crs, self.0.projected_bounds(crs)?))
    }
}

/// Pixel bounds of a reading window.
///
/// Deffined by:
///     - `offset`: (column, row) of the top left pixel,
///         with origin at top left pixel of raster.
///     - `shape`: (W, H) a.ka. columns, rows.
#[derive(Shrinkwrap, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds(Rect<usize>);

impl PixelBounds {
    pub fn new(offset: (usize, usize), shape: (usize, usize)) -> Self {
        let offset = Coord::from(offset);
        let max = offset + Coord::from(shape);
        Self(Rect::new(offset, max))
    }

    /// Coords of the top left pixel of the window.
    pub fn offset(&self) -> (usize, usize) {
        self.0.min().x_y()
    }

    /// (width, height)
    pub fn shape(&self) -> (usize, usize) {
        (self.0.width(), self.0.height())
    }

    /// Pixel area of the window.
    pub fn size(&self) -> usize {
        self.0.width() * self.0.height()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_bbox() {
        let bbox: Bbox = "-118.89, 38.54, -118.57, 38.84".parse().unwrap();
        assert_eq!(bbox.to_array(), [-118.89, 38.54, -118.57, 38.84]);
        assert_eq!(bbox.to_string(), "[-118.89, 38.54, -118.57, 38.84]");
    }

    #[rstest]
    #[case("1,2,3")]
    #[case("a,b,c,d")]
    #[case("10,0,0,10")]
    #[case("0,0,10,NaN")]
    fn rejects_invalid_bbox(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Bbox>(),
            Err(StacrioError::InvalidBbox(_))
        ));
    }

    #[test]
    fn reads_3d_stac_bbox() {
        let bbox: Bbox = serde_json::from_str("[1.0, 2.0, -10.0, 3.0, 4.0, 50.0]").unwrap();
        assert_eq!(bbox.to_array(), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn antimeridian_footprint_wraps() {
        let footprint = Footprint::from_slice(&[177., -20., -178., -15.]).unwrap();
        assert!(footprint.crosses_antimeridian());
        assert_eq!(footprint.parts().len(), 2);
        assert_eq!(footprint.to_array(), [177., -20., -178., -15.]);
        for clip in ["179,-19,180,-16", "-179.5,-19,-179,-16"] {
            assert!(footprint.intersects(&clip.parse().unwrap()), "{clip}");
        }
        assert!(!footprint.intersects(&"0,-19,10,-16".parse().unwrap()));
        assert!(!footprint.intersects(&"179,0,180,10".parse().unwrap()));
    }

    #[rstest]
    #[case(&[177., -20., -178.])]
    #[case(&[190., -20., -178., -15.])]
    #[case(&[177., -15., -178., -20.])]
    #[case(&[0., 0., 10., f64::NAN])]
    fn rejects_invalid_footprint(#[case] values: &[f64]) {
        assert!(matches!(
            Footprint::from_slice(values),
            Err(StacrioError::InvalidBbox(_))
        ));
    }

    #[test]
    fn pixel_bounds_shape() {
        let bounds = PixelBounds::new((2, 3), (4, 5));
        assert_eq!(bounds.offset(), (2, 3));
        assert_eq!(bounds.shape(), (4, 5));
        assert_eq!(bounds.size(), 20);
        assert!(PixelBounds::new((1, 1), (0, 3)).is_empty());
    }
}
