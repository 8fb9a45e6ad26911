use chrono::{DateTime, Utc};

use crate::errors::{Result, StacrioError};

mod data;
mod lazy;
mod materialize;

pub use data::DataArray;
pub use lazy::{BandRead, LazyArray};
pub use materialize::Materializer;

pub const TIME: &str = "time";
pub const BAND: &str = "band";
pub const Y: &str = "y";
pub const X: &str = "x";

/// Attribute holding the crs of the array as `EPSG:<code>`.
pub const CRS_ATTR: &str = "crs";

/// Coordinate labels, one vector per dimension.
///
/// `y`/`x` are pixel center coordinates in the array crs.
#[derive(Debug, Clone, PartialEq)]
pub struct Coords {
    pub time: Option<Vec<DateTime<Utc>>>,
    pub band: Vec<String>,
    pub y: Vec<f64>,
    pub x: Vec<f64>,
}

impl Coords {
    pub fn dims(&self) -> Vec<&'static str> {
        match self.time {
            Some(_) => vec![TIME, BAND, Y, X],
            None => vec![BAND, Y, X],
        }
    }

    /// Lengths of the label vectors, in [Self::dims] order.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(4);
        if let Some(time) = &self.time {
            shape.push(time.len());
        }
        shape.extend([self.band.len(), self.y.len(), self.x.len()]);
        shape
    }

    /// Fails unless every label vector has the length of its dimension.
    pub(crate) fn check(&self, shape: &[usize]) -> Result<()> {
        let labels = self.shape();
        if labels.len() != shape.len() {
            return Err(StacrioError::ShapeMismatch {
                dim: self.dims().join(","),
                labels: labels.len(),
                length: shape.len(),
            });
        }
        for ((dim, labels), length) in self.dims().into_iter().zip(labels).zip(shape) {
            if labels != *length {
                return Err(StacrioError::ShapeMismatch {
                    dim: dim.into(),
                    labels,
                    length: *length,
                });
            }
        }
        Ok(())
    }
}
