use ndarray::{ArrayD, ArrayView2, Axis, Ix2};
use serde_json::Value;

use crate::{
    components::{
        array::{Coords, CRS_ATTR},
        source::{DType, DataType},
        stac::Properties,
        transforms::GridSpec,
    },
    crs_geo::Crs,
    errors::Result,
};

/// Realized array, same dims, coords and attributes as its lazy origin.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray<T> {
    coords: Coords,
    attrs: Properties,
    grid: GridSpec,
    nodata: Vec<Option<f64>>,
    data: ArrayD<T>,
}

impl<T: DataType> DataArray<T> {
    pub(crate) fn new(
        coords: Coords,
        attrs: Properties,
        grid: GridSpec,
        nodata: Vec<Option<f64>>,
        data: ArrayD<T>,
    ) -> Result<Self> {
        coords.check(data.shape())?;
        Ok(Self {
            coords,
            attrs,
            grid,
            nodata,
            data,
        })
    }

    pub fn dims(&self) -> Vec<&'static str> {
        self.coords.dims()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
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

    pub fn attrs_mut(&mut self) -> &mut Properties {
        &mut self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Crs attribute, `None` when absent or not a valid crs.
    pub fn crs(&self) -> Option<Crs> {
        self.attr(CRS_ATTR)?.as_str()?.parse().ok()
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn data(&self) -> &ArrayD<T> {
        &self.data
    }

    pub fn into_data(self) -> ArrayD<T> {
        self.data
    }

    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.coords.band.iter().position(|band| band == name)
    }

    /// Length of the time axis, 1 without one.
    pub fn time_len(&self) -> usize {
        self.coords.time.as_ref().map_or(1, Vec::len)
    }

    pub fn band_len(&self) -> usize {
        self.coords.band.len()
    }

    pub fn nodata(&self, band: usize) -> Option<f64> {
        self.nodata.get(band).copied().flatten()
    }

    /// (y, x) plane of one time step and band.
    pub fn plane(&self, time: usize, band: usize) -> Option<ArrayView2<'_, T>> {
        if time >= self.time_len() || band >= self.band_len() {
            return None;
        }
        let view = self.data.view();
        let view = match self.coords.time {
            Some(_) => view.index_axis_move(Axis(0), time),
            None => view,
        };
        view.index_axis_move(Axis(0), band)
            .into_dimensionality::<Ix2>()
            .ok()
    }
}
