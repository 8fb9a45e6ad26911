use geo::{AffineTransform, Coord, Rect};
use shrinkwraprs::Shrinkwrap;

use crate::{
    components::bounds::{GeoBounds, PixelBounds},
    crs_geo::Crs,
    errors::{Result, StacrioError},
    intersection::Intersection,
};

/// Fractions closer than this to a whole pixel are snapped to it.
const PIXEL_EPSILON: f64 = 1e-6;

fn snap_floor(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < PIXEL_EPSILON {
        rounded
    } else {
        value.floor()
    }
}

fn snap_ceil(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < PIXEL_EPSILON {
        rounded
    } else {
        value.ceil()
    }
}

/// Transform from pixel space (column, row) to geo space.
#[derive(Shrinkwrap, Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(AffineTransform);

impl GeoTransform {
    pub fn new(a: f64, b: f64, xoff: f64, d: f64, e: f64, yoff: f64) -> Self {
        Self(AffineTransform::new(a, b, xoff, d, e, yoff))
    }

    /// From a STAC `proj:transform`, `[a, b, c, d, e, f]` with optional
    /// trailing `[0, 0, 1]`.
    pub fn from_stac(values: &[f64]) -> Option<Self> {
        match *values {
            [a, b, xoff, d, e, yoff] | [a, b, xoff, d, e, yoff, _, _, _] => {
                Some(Self::new(a, b, xoff, d, e, yoff))
            }
            _ => None,
        }
    }

    /// From a gdal geo transform, `[c, a, b, f, d, e]`.
    pub fn from_gdal(gdal_transform: [f64; 6]) -> Self {
        Self::new(
            gdal_transform[1],
            gdal_transform[2],
            gdal_transform[0],
            gdal_transform[4],
            gdal_transform[5],
            gdal_transform[3],
        )
    }

    pub fn is_north_up(&self) -> bool {
        self.b() == 0. && self.d() == 0. && self.a() != 0. && self.e() != 0.
    }

    /// Pixel size (x, y), always positive.
    pub fn resolution(&self) -> (f64, f64) {
        (self.a().abs(), self.e().abs())
    }

    /// Transform of the grid with its origin moved to `offset`.
    pub fn shifted(&self, offset: (usize, usize)) -> Self {
        let origin = self.apply(Coord {
            x: offset.0 as f64,
            y: offset.1 as f64,
        });
        Self::new(self.a(), self.b(), origin.x, self.d(), self.e(), origin.y)
    }

    /// Fractional (column, row) of a geo coordinate, north-up grids only.
    fn pixel_of(&self, coord: Coord) -> (f64, f64) {
        ((coord.x - self.xoff()) / self.a(), (coord.y - self.yoff()) / self.e())
    }
}

/// Pixel grid of a raster: transform, shape (W, H) and crs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    transform: GeoTransform,
    shape: (usize, usize),
    crs: Crs,
}

impl GridSpec {
    /// Fails for rotated grids, `description` names the raster in the error.
    pub fn new(
        transform: GeoTransform,
        shape: (usize, usize),
        crs: Crs,
        description: &str,
    ) -> Result<Self> {
        if !transform.is_north_up() {
            return Err(StacrioError::UnsupportedGrid(description.into()));
        }
        Ok(Self {
            transform,
            shape,
            crs,
        })
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// (width, height)
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn resolution(&self) -> (f64, f64) {
        self.transform.resolution()
    }

    /// Geo rect covered by the full grid.
    pub fn footprint(&self) -> Rect {
        let (width, height) = self.shape;
        let origin = self.transform.apply(Coord { x: 0., y: 0. });
        let corner = self.transform.apply(Coord {
            x: width as f64,
            y: height as f64,
        });
        Rect::new(origin, corner)
    }

    pub fn geo_bounds(&self) -> GeoBounds {
        GeoBounds::new(self.crs, self.footprint())
    }

    /// Pixel index range (start, end) covering `[low, high]` along one axis.
    fn pixel_span(low: f64, high: f64) -> (f64, f64) {
        let (low, high) = if low < high { (low, high) } else { (high, low) };
        (snap_floor(low), snap_ceil(high))
    }

    /// Grid on this pixel lattice that covers `extent`, possibly extending
    /// past the raster.
    ///
    /// `None` when the snapped grid has no pixels.
    pub fn aligned_to(&self, extent: &Rect) -> Option<GridSpec> {
        let (min, max) = (extent.min(), extent.max());
        let (col_a, row_a) = self.transform.pixel_of(min);
        let (col_b, row_b) = self.transform.pixel_of(max);
        let (col_start, col_end) = Self::pixel_span(col_a, col_b);
        let (row_start, row_end) = Self::pixel_span(row_a, row_b);
        let width = (col_end - col_start) as usize;
        let height = (row_end - row_start) as usize;
        if width == 0 || height == 0 {
            return None;
        }
        let origin = self.transform.apply(Coord {
            x: col_start,
            y: row_start,
        });
        let transform = GeoTransform::new(
            self.transform.a(),
            0.,
            origin.x,
            0.,
            self.transform.e(),
            origin.y,
        );
        Some(GridSpec {
            transform,
            shape: (width, height),
            crs: self.crs,
        })
    }

    /// Window of this grid that covers `extent`, clamped to the raster.
    ///
    /// `None` when they do not overlap by at least a pixel.
    pub fn window(&self, extent: &Rect) -> Option<PixelBounds> {
        let overlap = self.footprint().intersection(extent)?;
        let (min, max) = (overlap.min(), overlap.max());
        let (col_a, row_a) = self.transform.pixel_of(min);
        let (col_b, row_b) = self.transform.pixel_of(max);
        let (col_start, col_end) = Self::pixel_span(col_a, col_b);
        let (row_start, row_end) = Self::pixel_span(row_a, row_b);
        let (width, height) = self.shape;
        let clamp = |value: f64, limit: usize| value.max(0.).min(limit as f64) as usize;
        let (col_start, col_end) = (clamp(col_start, width), clamp(col_end, width));
        let (row_start, row_end) = (clamp(row_start, height), clamp(row_end, height));
        let window = PixelBounds::new(
            (col_start, row_start),
            (col_end - col_start, row_end - row_start),
        );
        (!window.is_empty()).then_some(window)
    }

    /// Grid of the pixels inside `window`.
    pub fn window_grid(&self, window: &PixelBounds) -> GridSpec {
        GridSpec {
            transform: self.transform.shifted(window.offset()),
            shape: window.shape(),
            crs: self.crs,
        }
    }

    /// Pixel center coordinates along x, one per column.
    pub fn x_coords(&self) -> Vec<f64> {
        (0..self.shape.0)
            .map(|col| self.transform.xoff() + (col as f64 + 0.5) * self.transform.a())
            .collect()
    }

    /// Pixel center coordinates along y, one per row.
    pub fn y_coords(&self) -> Vec<f64> {
        (0..self.shape.1)
            .map(|row| self.transform.yoff() + (row as f64 + 0.5) * self.transform.e())
            .collect()
    }

    /// Source (column, row) sampled by each output column/row of `target`,
    /// nearest neighbour on pixel centers.
    pub fn sample_indexes(&self, target: &GridSpec) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
        let (width, height) = self.shape;
        let to_index = |value: f64, limit: usize| {
            let index = value.floor();
            (index >= 0. && index < limit as f64).then_some(index as usize)
        };
        let columns = target
            .x_coords()
            .into_iter()
            .map(|x| to_index((x - self.transform.xoff()) / self.transform.a(), width))
            .collect();
        let rows = target
            .y_coords()
            .into_iter()
            .map(|y| to_index((y - self.transform.yoff()) / self.transform.e(), height))
            .collect();
        (columns, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(res: f64, xoff: f64, yoff: f64, shape: (usize, usize)) -> GridSpec {
        GridSpec::new(
            GeoTransform::new(res, 0., xoff, 0., -res, yoff),
            shape,
            Crs::WGS84,
            "test",
        )
        .unwrap()
    }

    #[test]
    fn stac_and_gdal_transforms_agree() {
        let stac = GeoTransform::from_stac(&[30., 0., 300000., 0., -30., 4300000., 0., 0., 1.]);
        let gdal = GeoTransform::from_gdal([300000., 30., 0., 4300000., 0., -30.]);
        assert_eq!(stac, Some(gdal));
        assert_eq!(GeoTransform::from_stac(&[1., 2.]), None);
    }

    #[test]
    fn rejects_rotated_grid() {
        let rotated = GeoTransform::new(30., 1., 0., 1., -30., 0.);
        assert!(matches!(
            GridSpec::new(rotated, (10, 10), Crs::WGS84, "rotated"),
            Err(StacrioError::UnsupportedGrid(name)) if name == "rotated"
        ));
    }

    #[test]
    fn footprint_of_north_up_grid() {
        let grid = grid(0.5, 10., 20., (4, 2));
        assert_eq!(grid.footprint(), Rect::new((10., 19.), (12., 20.)));
    }

    #[test]
    fn window_is_clamped_to_raster() {
        let grid = grid(1., 0., 10., (10, 10));
        let window = grid.window(&Rect::new((2.5, -5.), (20., 7.5))).unwrap();
        assert_eq!(window.offset(), (2, 2));
        assert_eq!(window.shape(), (8, 8));
        assert_eq!(grid.window(&Rect::new((11., 0.), (12., 10.))), None);
    }

    #[test]
    fn aligned_grid_snaps_outwards() {
        let grid = grid(1., 0., 10., (10, 10));
        let aligned = grid.aligned_to(&Rect::new((2.5, 3.2), (4.1, 5.))).unwrap();
        assert_eq!(aligned.shape(), (3, 2));
        assert_eq!(aligned.footprint(), Rect::new((2., 3.), (5., 5.)));
        assert_eq!(aligned.x_coords(), vec![2.5, 3.5, 4.5]);
        assert_eq!(aligned.y_coords(), vec![4.5, 3.5]);
    }

    #[test]
    fn window_grid_keeps_lattice() {
        let grid = grid(1., 0., 10., (10, 10));
        let window = grid.window_grid(&PixelBounds::new((2, 3), (4, 5)));
        assert_eq!(window.shape(), (4, 5));
        assert_eq!(window.footprint(), Rect::new((2., 2.), (6., 7.)));
    }

    #[test]
    fn coarse_grid_samples_repeat() {
        let coarse = grid(2., 0., 4., (2, 2));
        let fine = grid(1., 0., 4., (4, 4));
        let (columns, rows) = coarse.sample_indexes(&fine);
        assert_eq!(columns, vec![Some(0), Some(0), Some(1), Some(1)]);
        assert_eq!(rows, vec![Some(0), Some(0), Some(1), Some(1)]);
        let shifted = grid(1., -1., 4., (4, 4));
        let (columns, _) = coarse.sample_indexes(&shifted);
        assert_eq!(columns, vec![None, Some(0), Some(0), Some(1)]);
    }
}
