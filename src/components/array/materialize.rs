use chrono::{DateTime, Utc};
use geo::Rect;
use log::{debug, info};
use serde::de::DeserializeOwned;

use crate::{
    components::{
        array::{BandRead, Coords, LazyArray, CRS_ATTR},
        band::Band,
        bounds::Bbox,
        catalog::CatalogEntry,
        source::{DataType, RasterSource},
        stac::{Asset, Properties},
        transforms::{GeoTransform, GridSpec},
    },
    crs_geo::Crs,
    errors::{Result, StacrioError},
    intersection::Intersection,
};

struct BandLayout {
    band: Band,
    grid: GridSpec,
    nodata: Option<f64>,
}

/// Bands of one entry with the grid of its finest band and the extent to
/// read, in that grid's crs.
struct EntryLayout {
    bands: Vec<BandLayout>,
    base: GridSpec,
    extent: Rect,
}

fn pixel_area(grid: &GridSpec) -> f64 {
    let (x, y) = grid.resolution();
    x * y
}

/// Grid with the smallest pixels, the earliest one on ties.
fn finest<'g>(first: &'g GridSpec, rest: impl Iterator<Item = &'g GridSpec>) -> &'g GridSpec {
    rest.fold(first, |finest, grid| {
        if pixel_area(grid) < pixel_area(finest) {
            grid
        } else {
            finest
        }
    })
}

fn union(lhs: Rect, rhs: Rect) -> Rect {
    let (lhs_min, lhs_max, rhs_min, rhs_max) = (lhs.min(), lhs.max(), rhs.min(), rhs.max());
    Rect::new(
        (lhs_min.x.min(rhs_min.x), lhs_min.y.min(rhs_min.y)),
        (lhs_max.x.max(rhs_max.x), lhs_max.y.max(rhs_max.y)),
    )
}

fn empty_intersection(entry: &CatalogEntry, bbox: &Bbox) -> StacrioError {
    StacrioError::EmptyIntersection {
        entry: entry.id().into(),
        bbox: bbox.to_array(),
    }
}

/// Builds [LazyArray]s from catalog entries.
///
/// Only metadata is read here: `proj:shape`/`proj:transform` when the asset
/// or its item declares them, else the raster header through the source.
#[derive(Debug)]
pub struct Materializer<'a, S: RasterSource> {
    source: &'a S,
}

impl<'a, S: RasterSource> Materializer<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    fn asset_crs(entry: &CatalogEntry, asset: &Asset) -> Result<Option<Crs>> {
        if let Some(epsg) = asset.proj_epsg {
            return Crs::from_epsg(epsg).map(Some);
        }
        if let Some(code) = &asset.proj_code {
            return code.parse().map(Some);
        }
        entry.crs()
    }

    fn item_property<V: DeserializeOwned>(entry: &CatalogEntry, key: &str) -> Option<V> {
        let value = entry.property(key)?;
        serde_json::from_value(value.clone())
            .map_err(|error| debug!("ignoring {key} of {}: {error}", entry.id()))
            .ok()
    }

    /// Asset level `proj:*` fields, falling back to the item properties.
    fn declared_grid(entry: &CatalogEntry, band: &Band) -> Result<Option<GridSpec>> {
        let asset = &band.asset;
        let shape = asset
            .proj_shape
            .or_else(|| Self::item_property(entry, "proj:shape"));
        let transform = asset
            .proj_transform
            .clone()
            .or_else(|| Self::item_property::<Vec<f64>>(entry, "proj:transform"));
        let (Some([rows, columns]), Some(transform)) = (shape, transform.as_deref()) else {
            return Ok(None);
        };
        let (Some(transform), Some(crs)) =
            (GeoTransform::from_stac(transform), Self::asset_crs(entry, asset)?)
        else {
            return Ok(None);
        };
        GridSpec::new(transform, (columns, rows), crs, &band.href).map(Some)
    }

    fn band_layout(&self, entry: &CatalogEntry, band: Band) -> Result<BandLayout> {
        let (grid, nodata) = match Self::declared_grid(entry, &band)? {
            Some(grid) => (grid, band.nodata),
            None => {
                debug!("{} declares no grid, reading its header", band.href);
                let info = self.source.describe(&band.href)?;
                (info.grid, band.nodata.or(info.nodata))
            }
        };
        Ok(BandLayout { band, grid, nodata })
    }

    fn layout(
        &self,
        entry: &CatalogEntry,
        names: &[&str],
        clip: Option<&Bbox>,
    ) -> Result<EntryLayout> {
        let bands = names
            .iter()
            .map(|name| -> Result<BandLayout> {
                let band = entry.band(name)?;
                self.band_layout(entry, band)
            })
            .collect::<Result<Vec<_>>>()?;
        let Some((first, rest)) = bands.split_first() else {
            return Err(StacrioError::EmptySelection(format!(
                "no bands requested from {}",
                entry.id()
            )));
        };
        let base = *finest(&first.grid, rest.iter().map(|layout| &layout.grid));
        if let Some(other) = bands.iter().find(|layout| layout.grid.crs() != base.crs()) {
            return Err(StacrioError::CrsMismatch {
                first: entry.id().into(),
                first_crs: base.crs().to_string(),
                second: format!("{}:{}", entry.id(), other.band.name),
                second_crs: other.grid.crs().to_string(),
            });
        }
        let footprint = base.footprint();
        let extent = match clip {
            None => footprint,
            Some(bbox) => {
                if entry
                    .footprint()
                    .is_some_and(|entry_footprint| !entry_footprint.intersects(bbox))
                {
                    return Err(empty_intersection(entry, bbox));
                }
                let projected = bbox.geo_bounds().projected(base.crs())?.rect();
                let overlap = footprint
                    .intersection(&projected)
                    .ok_or_else(|| empty_intersection(entry, bbox))?;
                if base.aligned_to(&overlap).is_none() {
                    return Err(empty_intersection(entry, bbox));
                }
                overlap
            }
        };
        Ok(EntryLayout {
            bands,
            base,
            extent,
        })
    }

    fn target_grid(base: &GridSpec, extent: &Rect, entry: &CatalogEntry) -> Result<GridSpec> {
        base.aligned_to(extent)
            .ok_or_else(|| StacrioError::UnsupportedGrid(entry.id().into()))
    }

    fn reads(layout: &EntryLayout, target: &GridSpec) -> Vec<BandRead> {
        let extent = target.footprint();
        layout
            .bands
            .iter()
            .map(|band| BandRead {
                href: band.band.href.clone(),
                grid: band.grid,
                window: band.grid.window(&extent),
                nodata: band.nodata,
            })
            .collect()
    }

    /// Bands of one entry stacked along `band`, in the requested order.
    ///
    /// Every band is resampled onto the grid of the finest one. `clip`
    /// (lon/lat) restricts the array to its overlap with the footprint.
    pub fn stack_bands<T: DataType>(
        &self,
        entry: &CatalogEntry,
        bands: &[&str],
        clip: Option<&Bbox>,
    ) -> Result<LazyArray<T>> {
        let layout = self.layout(entry, bands, clip)?;
        let target = Self::target_grid(&layout.base, &layout.extent, entry)?;
        let plan = vec![Self::reads(&layout, &target)];
        let coords = Coords {
            time: None,
            band: bands.iter().map(|band| band.to_string()).collect(),
            y: target.y_coords(),
            x: target.x_coords(),
        };
        let mut attrs = entry.properties().clone();
        attrs.insert(CRS_ATTR.into(), target.crs().code().into());
        info!(
            "stacked {} bands of {} on a {:?} grid",
            bands.len(),
            entry.id(),
            target.shape()
        );
        let bands = layout.bands.into_iter().map(|layout| layout.band).collect();
        LazyArray::new(coords, target, bands, plan, attrs)
    }

    /// Entries stacked along `time`, ascending by acquisition timestamp.
    ///
    /// All entries must share a crs. The array covers the union of their
    /// (clipped) extents on the lattice of the finest band.
    pub fn stack_time<T: DataType>(
        &self,
        entries: &[CatalogEntry],
        bands: &[&str],
        clip: Option<&Bbox>,
    ) -> Result<LazyArray<T>> {
        let mut dated = entries
            .iter()
            .map(|entry| -> Result<(DateTime<Utc>, &CatalogEntry)> {
                let datetime = entry.datetime().ok_or_else(|| StacrioError::MissingTimestamp {
                    entry: entry.id().into(),
                })?;
                Ok((datetime, entry))
            })
            .collect::<Result<Vec<_>>>()?;
        dated.sort_by_key(|(datetime, _)| *datetime);
        let Some((&(_, first_entry), rest)) = dated.split_first() else {
            return Err(StacrioError::EmptySelection("no entries to stack in time".into()));
        };

        let first = self.layout(first_entry, bands, clip)?;
        let others = rest
            .iter()
            .map(|(_, entry)| self.layout(entry, bands, clip))
            .collect::<Result<Vec<_>>>()?;
        let crs = first.base.crs();
        for ((_, entry), layout) in rest.iter().zip(&others) {
            if layout.base.crs() != crs {
                return Err(StacrioError::CrsMismatch {
                    first: first_entry.id().into(),
                    first_crs: crs.to_string(),
                    second: entry.id().into(),
                    second_crs: layout.base.crs().to_string(),
                });
            }
        }
        let reference = *finest(&first.base, others.iter().map(|layout| &layout.base));
        let extent = others
            .iter()
            .map(|layout| layout.extent)
            .fold(first.extent, union);
        let target = Self::target_grid(&reference, &extent, first_entry)?;
        let plan = std::iter::once(&first)
            .chain(&others)
            .map(|layout| Self::reads(layout, &target))
            .collect();

        let coords = Coords {
            time: Some(dated.iter().map(|(datetime, _)| *datetime).collect()),
            band: bands.iter().map(|band| band.to_string()).collect(),
            y: target.y_coords(),
            x: target.x_coords(),
        };
        let mut attrs: Properties = first_entry.properties().clone();
        attrs.retain(|key, value| {
            dated
                .iter()
                .all(|(_, entry)| entry.property(key) == Some(&*value))
        });
        attrs.insert(CRS_ATTR.into(), target.crs().code().into());
        info!(
            "stacked {} entries of {} bands on a {:?} grid",
            dated.len(),
            bands.len(),
            target.shape()
        );
        let bands = first.bands.into_iter().map(|band| band.band).collect();
        LazyArray::new(coords, target, bands, plan, attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        bounds::PixelBounds,
        catalog::CatalogReader,
        fetch::FileFetcher,
        source::{MemoryRaster, MemorySource},
    };
    use crate::crs_geo::CrsGeometry;
    use rstest::{fixture, rstest};
    use serde_json::{json, Value};
    use url::Url;

    /// 4x4 grid of 1 degree pixels with its top left corner at (10, 20).
    fn fine_grid() -> GridSpec {
        GridSpec::new(
            GeoTransform::new(1., 0., 10., 0., -1., 20.),
            (4, 4),
            Crs::WGS84,
            "fine",
        )
        .unwrap()
    }

    fn coarse_grid() -> GridSpec {
        GridSpec::new(
            GeoTransform::new(2., 0., 10., 0., -2., 20.),
            (2, 2),
            Crs::WGS84,
            "coarse",
        )
        .unwrap()
    }

    fn asset(href: &str, grid: &GridSpec, nodata: Option<f64>) -> Value {
        let (width, height) = grid.shape();
        let transform = grid.transform();
        json!({
            "href": href,
            "type": "image/tiff; application=geotiff",
            "proj:shape": [height, width],
            "proj:transform": [transform.a(), 0.0, transform.xoff(), 0.0, transform.e(), transform.yoff()],
            "raster:bands": [{"nodata": nodata}]
        })
    }

    fn item(id: &str, datetime: Option<&str>, epsg: u32) -> CatalogEntry {
        let location = Url::parse(&format!("https://example.com/{id}.json")).unwrap();
        let document = json!({
            "type": "Feature",
            "id": id,
            "bbox": [10.0, 16.0, 14.0, 20.0],
            "properties": {"datetime": datetime, "proj:epsg": epsg, "platform": id},
            "assets": {
                "red": asset(&format!("mem://{id}/red"), &fine_grid(), None),
                "green": asset(&format!("mem://{id}/green"), &fine_grid(), None),
                "blue": asset(&format!("mem://{id}/blue"), &fine_grid(), None),
                "swir": asset(&format!("mem://{id}/swir"), &coarse_grid(), Some(0.)),
            },
            "links": []
        });
        CatalogReader::new(FileFetcher)
            .entry_from_value(document, &location)
            .unwrap()
    }

    #[fixture]
    fn source() -> MemorySource {
        let mut source = MemorySource::new();
        for (id, offset) in [("t1", 0.), ("t2", 100.), ("t3", 200.)] {
            source.insert(
                format!("mem://{id}/red"),
                MemoryRaster::from_fn(fine_grid(), move |column, row| {
                    offset + (row * 4 + column) as f64
                }),
            );
            source.insert(
                format!("mem://{id}/green"),
                MemoryRaster::from_fn(fine_grid(), move |_, _| offset + 50.),
            );
            source.insert(
                format!("mem://{id}/blue"),
                MemoryRaster::from_fn(fine_grid(), move |_, _| offset + 60.),
            );
            source.insert(
                format!("mem://{id}/swir"),
                MemoryRaster::from_fn(coarse_grid(), move |column, row| {
                    1. + (row * 2 + column) as f64
                }),
            );
        }
        source
    }

    #[rstest]
    fn band_order_is_preserved(source: MemorySource) {
        let entry = item("t1", Some("2021-07-12T00:00:00Z"), 4326);
        let materializer = Materializer::new(&source);
        let array = materializer
            .stack_bands::<u16>(&entry, &["red", "green", "blue"], None)
            .unwrap();
        assert_eq!(array.coords().band, vec!["red", "green", "blue"]);
        assert_eq!(array.dims(), vec!["band", "y", "x"]);
        assert_eq!(array.shape(), vec![3, 4, 4]);
        assert_eq!(array.attr("crs"), Some(&json!("EPSG:4326")));
        assert_eq!(source.reads(), 0);
        assert_eq!(source.describes(), 0);

        let data = array.realize(&source).unwrap();
        assert_eq!(source.reads(), 3);
        assert_eq!(data.shape(), &[3, 4, 4]);
        assert_eq!(data.plane(0, 0).unwrap()[[1, 2]], 6);
        assert_eq!(data.plane(0, 1).unwrap()[[0, 0]], 50);
        assert_eq!(data.plane(0, 2).unwrap()[[3, 3]], 60);
    }

    #[rstest]
    fn coarse_bands_are_resampled_to_finest(source: MemorySource) {
        let entry = item("t1", Some("2021-07-12T00:00:00Z"), 4326);
        let data = Materializer::new(&source)
            .stack_bands::<f32>(&entry, &["swir", "red"], None)
            .unwrap()
            .realize(&source)
            .unwrap();
        assert_eq!(data.shape(), &[2, 4, 4]);
        let swir = data.plane(0, 0).unwrap();
        assert_eq!(swir.row(0).to_vec(), vec![1., 1., 2., 2.]);
        assert_eq!(swir.row(3).to_vec(), vec![3., 3., 4., 4.]);
        assert_eq!(data.nodata(0), Some(0.));
        assert_eq!(data.nodata(1), None);
    }

    #[rstest]
    fn clip_restricts_grid(source: MemorySource) {
        let entry = item("t1", Some("2021-07-12T00:00:00Z"), 4326);
        let clip = Bbox::new(11.5, 17.5, 13., 19.).unwrap();
        let array = Materializer::new(&source)
            .stack_bands::<u16>(&entry, &["red"], Some(&clip))
            .unwrap();
        assert_eq!(array.shape(), vec![1, 2, 2]);
        assert_eq!(array.coords().x, vec![11.5, 12.5]);
        assert_eq!(array.coords().y, vec![18.5, 17.5]);
        assert_eq!(array.plan()[0][0].window, Some(PixelBounds::new((1, 1), (2, 2))));
        let data = array.realize(&source).unwrap();
        assert_eq!(data.plane(0, 0).unwrap().row(0).to_vec(), vec![5, 6]);
        assert_eq!(data.plane(0, 0).unwrap().row(1).to_vec(), vec![9, 10]);
    }

    #[rstest]
    fn clip_outside_footprint_is_empty(source: MemorySource) {
        let entry = item("t1", Some("2021-07-12T00:00:00Z"), 4326);
        let clip = Bbox::new(-118.89, 38.54, -118.57, 38.84).unwrap();
        match Materializer::new(&source).stack_bands::<u16>(&entry, &["red"], Some(&clip)) {
            Err(StacrioError::EmptyIntersection { entry, bbox }) => {
                assert_eq!(entry, "t1");
                assert_eq!(bbox, [-118.89, 38.54, -118.57, 38.84]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[rstest]
    fn unknown_band_is_missing(source: MemorySource) {
        let entry = item("t1", Some("2021-07-12T00:00:00Z"), 4326);
        match Materializer::new(&source).stack_bands::<u16>(&entry, &["red", "nir9"], None) {
            Err(StacrioError::MissingBand { band, .. }) => assert_eq!(band, "nir9"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[rstest]
    fn construction_is_deterministic(source: MemorySource) {
        let entry = item("t1", Some("2021-07-12T00:00:00Z"), 4326);
        let clip = Bbox::new(11.5, 17.5, 13., 19.).unwrap();
        let materializer = Materializer::new(&source);
        let first = materializer
            .stack_bands::<u16>(&entry, &["red", "swir"], Some(&clip))
            .unwrap();
        let second = materializer
            .stack_bands::<u16>(&entry, &["red", "swir"], Some(&clip))
            .unwrap();
        assert_eq!(first.shape(), second.shape());
        assert_eq!(first.dtype(), second.dtype());
        assert_eq!(first.coords(), second.coords());
    }

    #[rstest]
    fn time_axis_is_sorted(source: MemorySource) {
        let entries = vec![
            item("t2", Some("2021-07-28T00:00:00Z"), 4326),
            item("t1", Some("2021-07-12T00:00:00Z"), 4326),
            item("t3", Some("2021-08-13T00:00:00Z"), 4326),
        ];
        let array = Materializer::new(&source)
            .stack_time::<u16>(&entries, &["red"], None)
            .unwrap();
        assert_eq!(array.dims(), vec!["time", "band", "y", "x"]);
        let times = array
            .coords()
            .time
            .as_ref()
            .unwrap()
            .iter()
            .map(|time| time.to_rfc3339())
            .collect::<Vec<_>>();
        assert_eq!(
            times,
            vec![
                "2021-07-12T00:00:00+00:00",
                "2021-07-28T00:00:00+00:00",
                "2021-08-13T00:00:00+00:00"
            ]
        );
        assert!(array.attr("platform").is_none());
        assert!(array.attr("proj:epsg").is_some());

        let data = array.realize(&source).unwrap();
        let firsts = (0..3)
            .map(|time| data.plane(time, 0).unwrap()[[0, 0]])
            .collect::<Vec<_>>();
        assert_eq!(firsts, vec![0, 100, 200]);
    }

    #[rstest]
    fn time_stack_needs_timestamps(source: MemorySource) {
        let entries = vec![
            item("t1", Some("2021-07-12T00:00:00Z"), 4326),
            item("t2", None, 4326),
        ];
        match Materializer::new(&source).stack_time::<u16>(&entries, &["red"], None) {
            Err(StacrioError::MissingTimestamp { entry }) => assert_eq!(entry, "t2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[rstest]
    fn time_stack_needs_shared_crs(source: MemorySource) {
        let entries = vec![
            item("t1", Some("2021-07-12T00:00:00Z"), 4326),
            item("t2", Some("2021-07-28T00:00:00Z"), 3857),
        ];
        assert!(matches!(
            Materializer::new(&source).stack_time::<u16>(&entries, &["red"], None),
            Err(StacrioError::CrsMismatch { second, .. }) if second == "t2"
        ));
    }

    #[rstest]
    fn bands_without_grid_are_described(source: MemorySource) {
        let location = Url::parse("https://example.com/t1.json").unwrap();
        let entry = CatalogReader::new(FileFetcher)
            .entry_from_value(
                json!({
                    "type": "Feature",
                    "id": "t1",
                    "properties": {"datetime": "2021-07-12T00:00:00Z"},
                    "assets": {"red": {"href": "mem://t1/red", "type": "image/tiff"}},
                    "links": []
                }),
                &location,
            )
            .unwrap();
        let array = Materializer::new(&source)
            .stack_bands::<u16>(&entry, &["red"], None)
            .unwrap();
        assert_eq!(source.describes(), 1);
        assert_eq!(source.reads(), 0);
        assert_eq!(array.shape(), vec![1, 4, 4]);
    }

    #[rstest]
    fn item_level_grid_is_used(source: MemorySource) {
        let location = Url::parse("https://example.com/t1.json").unwrap();
        let entry = CatalogReader::new(FileFetcher)
            .entry_from_value(
                json!({
                    "type": "Feature",
                    "id": "t1",
                    "properties": {
                        "datetime": "2021-07-12T00:00:00Z",
                        "proj:epsg": 4326,
                        "proj:shape": [4, 4],
                        "proj:transform": [1.0, 0.0, 10.0, 0.0, -1.0, 20.0]
                    },
                    "assets": {"red": {"href": "mem://t1/red", "type": "image/tiff"}},
                    "links": []
                }),
                &location,
            )
            .unwrap();
        let array = Materializer::new(&source)
            .stack_bands::<u16>(&entry, &["red"], None)
            .unwrap();
        assert_eq!(source.describes(), 0);
        assert_eq!(array.shape(), vec![1, 4, 4]);
        assert_eq!(array.coords().x, vec![10.5, 11.5, 12.5, 13.5]);
    }

    #[test]
    fn lonlat_clip_selects_utm_window() {
        let utm = Crs::from_epsg(32611).unwrap();
        let grid = GridSpec::new(
            GeoTransform::new(30., 0., 500_000., 0., -30., 4_300_000.),
            (8, 8),
            utm,
            "utm",
        )
        .unwrap();
        let source = MemorySource::new().with_raster(
            "mem://utm/red",
            MemoryRaster::from_fn(grid, |column, row| (row * 8 + column) as f64),
        );
        let entry = CatalogReader::new(FileFetcher)
            .entry_from_value(
                json!({
                    "type": "Feature",
                    "id": "utm",
                    "bbox": [-118.0, 38.0, -116.0, 40.0],
                    "properties": {"datetime": "2021-07-12T00:00:00Z", "proj:epsg": 32611},
                    "assets": {"red": asset("mem://utm/red", &grid, None)},
                    "links": []
                }),
                &Url::parse("https://example.com/utm.json").unwrap(),
            )
            .unwrap();
        // Pixel centers (1, 1) to (4, 4), expressed in lon/lat.
        let wanted = Rect::new((500_045., 4_299_865.), (500_135., 4_299_955.));
        let lonlat = CrsGeometry::new(utm, wanted)
            .projected_bounds(Crs::WGS84)
            .unwrap();
        let (min, max) = (lonlat.min(), lonlat.max());
        let clip = Bbox::new(min.x, min.y, max.x, max.y).unwrap();

        let array = Materializer::new(&source)
            .stack_bands::<u16>(&entry, &["red"], Some(&clip))
            .unwrap();
        assert_eq!(array.attr("crs"), Some(&json!("EPSG:32611")));
        assert_eq!(array.plan()[0][0].window, Some(PixelBounds::new((1, 1), (4, 4))));
        assert_eq!(array.coords().x, vec![500_045., 500_075., 500_105., 500_135.]);
        let data = array.realize(&source).unwrap();
        assert_eq!(data.plane(0, 0).unwrap().row(0).to_vec(), vec![9, 10, 11, 12]);
    }

    #[rstest]
    fn nothing_to_stack_is_an_empty_selection(source: MemorySource) {
        let entry = item("t1", Some("2021-07-12T00:00:00Z"), 4326);
        let materializer = Materializer::new(&source);
        assert!(matches!(
            materializer.stack_bands::<u16>(&entry, &[], None),
            Err(StacrioError::EmptySelection(_))
        ));
        assert!(matches!(
            materializer.stack_time::<u16>(&[], &["red"], None),
            Err(StacrioError::EmptySelection(_))
        ));
        assert!(matches!(
            materializer.stack_time::<u16>(&[entry], &[], None),
            Err(StacrioError::EmptySelection(_))
        ));
    }
}
