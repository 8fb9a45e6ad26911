use std::marker::PhantomData;

use log::{debug, info};
use ndarray::{Array2, ArrayD, IxDyn};
use num::NumCast;
use serde_json::Value;

use crate::{
    components::{
        array::{Coords, DataArray, BAND, CRS_ATTR, TIME},
        band::Band,
        bounds::PixelBounds,
        source::{DType, DataType, RasterSource},
        stac::Properties,
        transforms::GridSpec,
    },
    crs_geo::Crs,
    errors::{Result, StacrioError},
};

/// Read of one band of one entry onto the array grid.
#[derive(Debug, Clone, PartialEq)]
pub struct BandRead {
    pub href: String,
    /// Native grid of the raster.
    pub grid: GridSpec,
    /// Part of the raster covering the array, `None` when it does not.
    pub window: Option<PixelBounds>,
    pub nodata: Option<f64>,
}

impl BandRead {
    /// Value of pixels the raster does not cover.
    pub fn fill<T: DataType>(&self) -> T {
        self.nodata
            .and_then(<T as NumCast>::from)
            .unwrap_or_else(T::zero)
    }

    fn read<T: DataType, S: RasterSource>(
        &self,
        source: &S,
        target: &GridSpec,
    ) -> Result<Array2<T>> {
        let (width, height) = target.shape();
        let fill = self.fill::<T>();
        let Some(window) = &self.window else {
            debug!("{} does not cover the array", self.href);
            return Ok(Array2::from_elem((height, width), fill));
        };
        let pixels = source.read_window::<T>(&self.href, window)?;
        let (window_width, window_height) = window.shape();
        if pixels.dim() != (window_height, window_width) {
            return Err(StacrioError::ShapeMismatch {
                dim: format!("window of {}", self.href),
                labels: window_height * window_width,
                length: pixels.len(),
            });
        }
        let (columns, rows) = self.grid.window_grid(window).sample_indexes(target);
        Ok(Array2::from_shape_fn((height, width), |(row, column)| {
            match (rows[row], columns[column]) {
                (Some(row), Some(column)) => pixels[[row, column]],
                _ => fill,
            }
        }))
    }
}

/// Labeled array description, no pixels are read until [LazyArray::realize].
#[derive(Debug, Clone, PartialEq)]
pub struct LazyArray<T: DataType> {
    coords: Coords,
    attrs: Properties,
    grid: GridSpec,
    bands: Vec<Band>,
    /// Reads by [time][band].
    plan: Vec<Vec<BandRead>>,
    _t: PhantomData<T>,
}

impl<T: DataType> LazyArray<T> {
    pub(crate) fn new(
        coords: Coords,
        grid: GridSpec,
        bands: Vec<Band>,
        plan: Vec<Vec<BandRead>>,
        attrs: Properties,
    ) -> Result<Self> {
        if coords.time.is_none() && plan.len() != 1 {
            return Err(StacrioError::ShapeMismatch {
                dim: TIME.into(),
                labels: 0,
                length: plan.len(),
            });
        }
        let band_count = plan.first().map_or(0, Vec::len);
        if let Some(reads) = plan.iter().find(|reads| reads.len() != band_count) {
            return Err(StacrioError::ShapeMismatch {
                dim: BAND.into(),
                labels: band_count,
                length: reads.len(),
            });
        }
        let array = Self {
            coords,
            attrs,
            grid,
            bands,
            plan,
            _t: PhantomData,
        };
        array.coords.check(&array.shape())?;
        Ok(array)
    }

    pub fn dims(&self) -> Vec<&'static str> {
        self.coords.dims()
    }

    pub fn shape(&self) -> Vec<usize> {
        let (width, height) = self.grid.shape();
        let mut shape = Vec::with_capacity(4);
        if self.coords.time.is_some() {
            shape.push(self.plan.len());
        }
        shape.extend([self.plan.first().map_or(0, Vec::len), height, width]);
        shape
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn coords(&self) -> &Coords {
        &self.coords
    }

    pub fn attrs(&self) -> &Properties {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn crs(&self) -> Option<Crs> {
        self.attr(CRS_ATTR)?.as_str()?.parse().ok()
    }

    /// Relabels the crs attribute, `crs` must parse as a [Crs].
    pub fn set_crs(&mut self, crs: &str) -> Result<()> {
        let crs: Crs = crs.parse()?;
        self.attrs.insert(CRS_ATTR.into(), crs.code().into());
        Ok(())
    }

    /// Pixel grid all bands are resampled onto.
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Bands of the first time step, in band axis order.
    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn plan(&self) -> &[Vec<BandRead>] {
        &self.plan
    }

    /// Nodata per band, as declared by the first time step.
    pub fn nodata(&self) -> Vec<Option<f64>> {
        self.plan
            .first()
            .map(|reads| reads.iter().map(|read| read.nodata).collect())
            .unwrap_or_default()
    }

    /// Reads every planned window and resamples it onto [Self::grid].
    pub fn realize<S: RasterSource>(&self, source: &S) -> Result<DataArray<T>> {
        let shape = self.shape();
        info!("realizing {} array of shape {shape:?}", T::DTYPE);
        let mut values = Vec::with_capacity(shape.iter().product());
        for read in self.plan.iter().flatten() {
            let plane = read.read::<T, S>(source, &self.grid)?;
            values.extend(plane.iter().copied());
        }
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
        DataArray::new(
            self.coords.clone(),
            self.attrs.clone(),
            self.grid,
            self.nodata(),
            data,
        )
    }
}
