use std::{cell::Cell, collections::HashMap};

use ndarray::{s, Array2};
use num::NumCast;

use crate::{
    components::{
        bounds::PixelBounds,
        source::{DType, DataType, RasterInfo, RasterSource},
        transforms::GridSpec,
    },
    errors::{Result, StacrioError},
};

/// In-process raster, values shaped (rows, columns).
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRaster {
    grid: GridSpec,
    dtype: DType,
    nodata: Option<f64>,
    values: Array2<f64>,
}

impl MemoryRaster {
    pub fn new(grid: GridSpec, values: Array2<f64>) -> Result<Self> {
        let (width, height) = grid.shape();
        let (rows, columns) = values.dim();
        if rows != height {
            return Err(StacrioError::ShapeMismatch {
                dim: "y".into(),
                labels: height,
                length: rows,
            });
        }
        if columns != width {
            return Err(StacrioError::ShapeMismatch {
                dim: "x".into(),
                labels: width,
                length: columns,
            });
        }
        Ok(Self {
            grid,
            dtype: DType::F64,
            nodata: None,
            values,
        })
    }

    /// Raster with `value(column, row)` at every pixel.
    pub fn from_fn(grid: GridSpec, value: impl Fn(usize, usize) -> f64) -> Self {
        let (width, height) = grid.shape();
        let values = Array2::from_shape_fn((height, width), |(row, column)| value(column, row));
        Self {
            grid,
            dtype: DType::F64,
            nodata: None,
            values,
        }
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }
}

/// Rasters keyed by href, counting every header and pixel access.
#[derive(Debug, Default)]
pub struct MemorySource {
    rasters: HashMap<String, MemoryRaster>,
    describes: Cell<usize>,
    reads: Cell<usize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, href: impl Into<String>, raster: MemoryRaster) {
        self.rasters.insert(href.into(), raster);
    }

    pub fn with_raster(mut self, href: impl Into<String>, raster: MemoryRaster) -> Self {
        self.insert(href, raster);
        self
    }

    /// Number of [RasterSource::describe] calls so far.
    pub fn describes(&self) -> usize {
        self.describes.get()
    }

    /// Number of [RasterSource::read_window] calls so far.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    /// Signed hrefs fall back to their unsigned form.
    fn raster(&self, href: &str) -> Result<&MemoryRaster> {
        self.rasters
            .get(href)
            .or_else(|| {
                href.split_once('?')
                    .and_then(|(unsigned, _)| self.rasters.get(unsigned))
            })
            .ok_or_else(|| StacrioError::CatalogAccess {
                url: href.into(),
                reason: "no such raster in memory".into(),
            })
    }
}

impl RasterSource for MemorySource {
    fn describe(&self, href: &str) -> Result<RasterInfo> {
        self.describes.set(self.describes.get() + 1);
        let raster = self.raster(href)?;
        Ok(RasterInfo {
            grid: raster.grid,
            dtype: raster.dtype,
            nodata: raster.nodata,
        })
    }

    fn read_window<T: DataType>(&self, href: &str, window: &PixelBounds) -> Result<Array2<T>> {
        self.reads.set(self.reads.get() + 1);
        let raster = self.raster(href)?;
        let (column, row) = window.offset();
        let (width, height) = window.shape();
        let (rows, columns) = raster.values.dim();
        if column + width > columns || row + height > rows {
            return Err(StacrioError::ShapeMismatch {
                dim: "window".into(),
                labels: (column + width).max(row + height),
                length: columns.max(rows),
            });
        }
        raster
            .values
            .slice(s![row..row + height, column..column + width])
            .iter()
            .map(|value| <T as NumCast>::from(*value).ok_or(StacrioError::Uncastable))
            .collect::<Result<Vec<T>>>()
            .and_then(|pixels| Ok(Array2::from_shape_vec((height, width), pixels)?))
    }
}
