use std::path::Path;

use geo::Rect;
use image::{DynamicImage, GrayImage, RgbImage};
use itertools::Itertools;
use log::{info, warn};
use ndarray::ArrayView2;
use num::ToPrimitive;

use crate::{
    components::{array::DataArray, bounds::GeoBounds, source::DataType},
    crs_geo::Crs,
    errors::{Result, StacrioError},
};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Lower and upper percentile mapped to 0 and 255.
    pub percentiles: (f64, f64),
    pub display_crs: Crs,
    pub time_index: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            percentiles: (2., 98.),
            display_crs: Crs::WGS84,
            time_index: 0,
        }
    }
}

/// Where a rendered image lies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Georeference {
    /// Extent in the display crs.
    Geographic { crs: Crs, extent: Rect },
    /// Raw pixel extent, for arrays without a usable crs.
    Pixel { width: u32, height: u32 },
}

#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub image: DynamicImage,
    pub georeference: Georeference,
}

impl RenderedImage {
    /// Encodes the image, format by extension (png, jpeg, ..).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.image.save(path.as_ref())?;
        info!("saved image to {}", path.as_ref().display());
        Ok(())
    }
}

/// Samples counted by the stretch: finite and not nodata.
fn valid_samples<'a, T: DataType>(
    plane: &'a ArrayView2<'a, T>,
    nodata: Option<f64>,
) -> impl Iterator<Item = Option<f64>> + 'a {
    plane.iter().map(move |value| {
        value
            .to_f64()
            .filter(|value| value.is_finite() && Some(*value) != nodata)
    })
}

fn percentile(sorted: &[f64], percent: f64) -> f64 {
    match sorted.len() {
        0 => 0.,
        length => {
            let rank = (percent.clamp(0., 100.) / 100. * (length - 1) as f64).round() as usize;
            sorted[rank.min(length - 1)]
        }
    }
}

/// Plane stretched to u8, invalid samples become 0.
fn stretch<'a, T: DataType>(
    plane: &'a ArrayView2<'a, T>,
    nodata: Option<f64>,
    percentiles: (f64, f64),
) -> Vec<u8> {
    let sorted = valid_samples(plane, nodata)
        .flatten()
        .sorted_by(f64::total_cmp)
        .collect_vec();
    let (low, high) = (percentile(&sorted, percentiles.0), percentile(&sorted, percentiles.1));
    valid_samples(plane, nodata)
        .map(|value| match value {
            Some(value) if high > low => {
                (((value - low) / (high - low)).clamp(0., 1.) * 255.).round() as u8
            }
            _ => 0,
        })
        .collect()
}

/// Turns 1 band (grayscale) or 3 band (RGB) arrays into images.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    options: RenderOptions,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    fn georeference<T: DataType>(
        &self,
        array: &DataArray<T>,
        width: u32,
        height: u32,
    ) -> Georeference {
        let Some(crs) = array.crs() else {
            warn!("array has no valid crs, rendering in pixel coordinates");
            return Georeference::Pixel { width, height };
        };
        match GeoBounds::new(crs, array.grid().footprint()).projected(self.options.display_crs) {
            Ok(bounds) => Georeference::Geographic {
                crs: bounds.crs(),
                extent: bounds.rect(),
            },
            Err(error) => {
                warn!("could not reproject extent from {crs}: {error}, rendering in pixel coordinates");
                Georeference::Pixel { width, height }
            }
        }
    }

    pub fn render<T: DataType>(&self, array: &DataArray<T>) -> Result<RenderedImage> {
        let bands = array.band_len();
        let unsupported = || {
            StacrioError::Render(format!(
                "{bands} bands can not be rendered, expected 1 (grayscale) or 3 (RGB)"
            ))
        };
        if bands != 1 && bands != 3 {
            return Err(unsupported());
        }
        let time = self.options.time_index;
        let planes = (0..bands)
            .map(|band| {
                array.plane(time, band).ok_or_else(|| {
                    StacrioError::Render(format!(
                        "time index {time} is out of range for {} time steps",
                        array.time_len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let (rows, columns) = planes[0].dim();
        let (width, height) = (
            u32::try_from(columns).map_err(|_| StacrioError::Uncastable)?,
            u32::try_from(rows).map_err(|_| StacrioError::Uncastable)?,
        );
        let channels = planes
            .iter()
            .enumerate()
            .map(|(band, plane)| stretch(plane, array.nodata(band), self.options.percentiles))
            .collect_vec();
        let too_small = || StacrioError::Render("pixel buffer does not match image size".into());
        let image = match channels.as_slice() {
            [gray] => DynamicImage::ImageLuma8(
                GrayImage::from_raw(width, height, gray.clone()).ok_or_else(too_small)?,
            ),
            [red, green, blue] => {
                let interleaved = itertools::izip!(red, green, blue)
                    .flat_map(|(red, green, blue)| [*red, *green, *blue])
                    .collect_vec();
                DynamicImage::ImageRgb8(
                    RgbImage::from_raw(width, height, interleaved).ok_or_else(too_small)?,
                )
            }
            _ => return Err(unsupported()),
        };
        info!("rendered {bands} band image of {width}x{height}");
        Ok(RenderedImage {
            image,
            georeference: self.georeference(array, width, height),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        array::{Coords, CRS_ATTR},
        transforms::{GeoTransform, GridSpec},
    };
    use ndarray::{ArrayD, IxDyn};
    use serde_json::Value;

    fn array(bands: usize, nodata: Option<f64>, value: impl Fn(usize) -> f32) -> DataArray<f32> {
        let grid = GridSpec::new(
            GeoTransform::new(1., 0., 10., 0., -1., 20.),
            (10, 10),
            Crs::WGS84,
            "render",
        )
        .unwrap();
        let data = ArrayD::from_shape_fn(IxDyn(&[bands, 10, 10]), |index| {
            value(index[1] * 10 + index[2])
        });
        let coords = Coords {
            time: None,
            band: (0..bands).map(|band| format!("b{band}")).collect(),
            y: grid.y_coords(),
            x: grid.x_coords(),
        };
        let mut attrs = serde_json::Map::new();
        attrs.insert(CRS_ATTR.into(), Value::from("EPSG:4326"));
        DataArray::new(coords, attrs, grid, vec![nodata; bands], data).unwrap()
    }

    #[test]
    fn single_band_is_grayscale() {
        let rendered = Renderer::default()
            .render(&array(1, None, |index| index as f32))
            .unwrap();
        let image = rendered.image.as_luma8().unwrap();
        assert_eq!(image.dimensions(), (10, 10));
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(2, 0).0, [0]);
        assert_eq!(image.get_pixel(7, 9).0, [255]);
        assert_eq!(image.get_pixel(9, 9).0, [255]);
        assert_eq!(
            rendered.georeference,
            Georeference::Geographic {
                crs: Crs::WGS84,
                extent: Rect::new((10., 10.), (20., 20.))
            }
        );
    }

    #[test]
    fn three_bands_are_rgb() {
        let rendered = Renderer::default()
            .render(&array(3, None, |index| index as f32))
            .unwrap();
        let image = rendered.image.as_rgb8().unwrap();
        assert_eq!(image.get_pixel(9, 9).0, [255, 255, 255]);
    }

    #[test]
    fn other_band_counts_are_rejected() {
        match Renderer::default().render(&array(2, None, |_| 1.)) {
            Err(StacrioError::Render(message)) => assert!(message.starts_with("2 bands")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stretch_ignores_nodata_and_nan() {
        let options = RenderOptions {
            percentiles: (0., 100.),
            ..Default::default()
        };
        let data = array(1, Some(-9999.), |index| match index {
            0 => -9999.,
            1 => f32::NAN,
            index => index as f32,
        });
        let image = Renderer::new(options).render(&data).unwrap().image.into_luma8();
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(1, 0).0, [0]);
        assert_eq!(image.get_pixel(2, 0).0, [0]);
        assert_eq!(image.get_pixel(9, 9).0, [255]);
    }

    #[test]
    fn missing_crs_falls_back_to_pixels() {
        let mut data = array(1, None, |index| index as f32);
        data.attrs_mut().insert(CRS_ATTR.into(), Value::from("not a crs"));
        let rendered = Renderer::default().render(&data).unwrap();
        assert_eq!(
            rendered.georeference,
            Georeference::Pixel {
                width: 10,
                height: 10
            }
        );
        assert_eq!(data.attr(CRS_ATTR), Some(&Value::from("not a crs")));
    }

    #[test]
    fn time_index_out_of_range() {
        let options = RenderOptions {
            time_index: 3,
            ..Default::default()
        };
        assert!(matches!(
            Renderer::new(options).render(&array(1, None, |_| 1.)),
            Err(StacrioError::Render(_))
        ));
    }
}
