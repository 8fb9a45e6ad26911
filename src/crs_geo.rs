use std::{fmt::Display, str::FromStr};

use geo::{Coord, MapCoords, Rect};
use itertools::Itertools;
use proj::Proj;
use shrinkwraprs::Shrinkwrap;

use crate::errors::{Result, StacrioError};

/// Number of points sampled along each edge when projecting a [Rect].
const EDGE_SAMPLES: usize = 21;

/// Coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    epsg: u32,
}

impl Crs {
    pub const WGS84: Crs = Crs { epsg: 4326 };
    pub const WEB_MERCATOR: Crs = Crs { epsg: 3857 };

    pub fn from_epsg(epsg: u32) -> Result<Self> {
        if epsg == 0 {
            return Err(StacrioError::InvalidCrs(epsg.to_string()));
        }
        Ok(Self { epsg })
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Authority string as understood by proj, e.g. `EPSG:32611`.
    pub fn code(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }
}

impl Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl FromStr for Crs {
    type Err = StacrioError;

    /// Accepts `EPSG:<code>` (any case), a bare code and `OGC:CRS84`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("OGC:CRS84") {
            return Ok(Self::WGS84);
        }
        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("EPSG") => code,
            Some(_) => return Err(StacrioError::InvalidCrs(s.into())),
            None => trimmed,
        };
        code.parse::<u32>()
            .map_err(|_| StacrioError::InvalidCrs(s.into()))
            .and_then(Self::from_epsg)
    }
}

impl TryFrom<String> for Crs {
    type Error = StacrioError;
    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.code()
    }
}

fn transformer(from: Crs, to: Crs) -> Result<Proj> {
    Ok(Proj::new_known_crs(&from.code(), &to.code(), None)?)
}

/// Geometry tagged with the [Crs] its coordinates are expressed in.
#[derive(Shrinkwrap, Debug, Clone, PartialEq)]
pub struct CrsGeometry<G> {
    crs: Crs,
    #[shrinkwrap(main_field)]
    geometry: G,
}

impl<G> CrsGeometry<G> {
    pub fn new(crs: Crs, geometry: G) -> Self {
        Self { crs, geometry }
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn into_inner(self) -> G {
        self.geometry
    }
}

impl<G: MapCoords<f64, f64, Output = G> + Clone> CrsGeometry<G> {
    pub fn with_crs(self, crs: Crs) -> Result<Self> {
        if self.crs == crs {
            return Ok(self);
        }
        let geometry = self.projected_geometry(crs)?;
        Ok(Self { crs, geometry })
    }

    /// Clones if crs is same.
    pub fn projected_geometry(&self, crs: Crs) -> Result<G> {
        if self.crs == crs {
            return Ok(self.geometry.clone());
        }
        let proj = transformer(self.crs, crs)?;
        Ok(self.geometry.try_map_coords(|coord: Coord| {
            proj.convert(coord.x_y()).map(Coord::from)
        })?)
    }
}

impl CrsGeometry<Rect> {
    /// Bounding rect of this rect in `crs`.
    ///
    /// Edges are densified before projecting so curved edges in the target
    /// crs are still enclosed.
    pub fn projected_bounds(&self, crs: Crs) -> Result<Rect> {
        if self.crs == crs {
            return Ok(self.geometry);
        }
        let proj = transformer(self.crs, crs)?;
        let (min, max) = (self.geometry.min(), self.geometry.max());
        let steps = (0..EDGE_SAMPLES).map(|step| step as f64 / (EDGE_SAMPLES - 1) as f64);
        let first = proj.convert(min.x_y())?;
        let (min_x, min_y, max_x, max_y) = steps
            .flat_map(|t| {
                let x = min.x + t * (max.x - min.x);
                let y = min.y + t * (max.y - min.y);
                [(x, min.y), (x, max.y), (min.x, y), (max.x, y)]
            })
            .map(|point| proj.convert(point))
            .fold_ok(
                (first.0, first.1, first.0, first.1),
                |(min_x, min_y, max_x, max_y), (x, y)| {
                    (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
                },
            )?;
        Ok(Rect::new((min_x, min_y), (max_x, max_y)))
    }
}
