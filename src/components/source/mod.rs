use std::fmt::{Debug, Display};

use gdal::raster::GdalType;
use ndarray::Array2;
use num::{Num, NumCast, ToPrimitive};

use crate::{
    components::{bounds::PixelBounds, transforms::GridSpec},
    errors::{Result, StacrioError},
};

pub mod gdal_source;
pub mod memory;

pub use gdal_source::GdalSource;
pub use memory::{MemoryRaster, MemorySource};

/// Sample types an array can be materialized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl DType {
    /// From a `raster:bands` `data_type`.
    pub fn from_stac(data_type: &str) -> Result<Self> {
        match data_type {
            "uint8" => Ok(Self::U8),
            "uint16" => Ok(Self::U16),
            "int16" => Ok(Self::I16),
            "uint32" => Ok(Self::U32),
            "int32" => Ok(Self::I32),
            "float32" => Ok(Self::F32),
            "float64" => Ok(Self::F64),
            other => Err(StacrioError::UnsupportedDataType(other.into())),
        }
    }

    /// From a gdal data type name (`Byte`, `UInt16`, ..).
    pub fn from_gdal_name(name: &str) -> Result<Self> {
        match name {
            "Byte" | "UInt8" => Ok(Self::U8),
            "UInt16" => Ok(Self::U16),
            "Int16" => Ok(Self::I16),
            "UInt32" => Ok(Self::U32),
            "Int32" => Ok(Self::I32),
            "Float32" => Ok(Self::F32),
            "Float64" => Ok(Self::F64),
            other => Err(StacrioError::UnsupportedDataType(other.into())),
        }
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::I16 => "int16",
            Self::U32 => "uint32",
            Self::I32 => "int32",
            Self::F32 => "float32",
            Self::F64 => "float64",
        };
        f.write_str(name)
    }
}

pub trait DataType:
    Num + NumCast + ToPrimitive + Copy + PartialOrd + Debug + Send + Sync + GdalType + 'static
{
    const DTYPE: DType;
}

macro_rules! data_types {
    ($($t:ty => $dtype:ident),* $(,)?) => {
        $(impl DataType for $t {
            const DTYPE: DType = DType::$dtype;
        })*
    };
}

data_types!(
    u8 => U8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
    f64 => F64,
);

/// Header of a raster: grid, stored sample type and nodata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterInfo {
    pub grid: GridSpec,
    pub dtype: DType,
    pub nodata: Option<f64>,
}

/// Reads raster assets by href.
///
/// `describe` reads headers only, `read_window` is the only pixel access.
pub trait RasterSource: Debug {
    fn describe(&self, href: &str) -> Result<RasterInfo>;

    /// Pixels of the first band inside `window`, shaped (rows, columns).
    fn read_window<T: DataType>(&self, href: &str, window: &PixelBounds) -> Result<Array2<T>>;
}
