//! TIFF and GeoTIFF tag constants used by the codec.

pub const TYPE_ASCII: u16 = 2;
pub const TYPE_SHORT: u16 = 3;
pub const TYPE_LONG: u16 = 4;
pub const TYPE_DOUBLE: u16 = 12;

pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_LENGTH: u16 = 257;
pub const TAG_BITS_PER_SAMPLE: u16 = 258;
pub const TAG_COMPRESSION: u16 = 259;
pub const TAG_PHOTOMETRIC: u16 = 262;
pub const TAG_STRIP_OFFSETS: u16 = 273;
pub const TAG_SAMPLES_PER_PIXEL: u16 = 277;
pub const TAG_ROWS_PER_STRIP: u16 = 278;
pub const TAG_STRIP_BYTE_COUNTS: u16 = 279;
pub const TAG_PLANAR_CONFIGURATION: u16 = 284;
pub const TAG_SAMPLE_FORMAT: u16 = 339;
pub const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
pub const TAG_MODEL_TIEPOINT: u16 = 33922;
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
pub const TAG_GDAL_NODATA: u16 = 42113;

pub const COMPRESSION_NONE: u16 = 1;
pub const PHOTOMETRIC_MIN_IS_BLACK: u16 = 1;
pub const PLANAR_SEPARATE: u16 = 2;
pub const SAMPLE_FORMAT_UNSIGNED: u16 = 1;
pub const SAMPLE_FORMAT_FLOAT: u16 = 3;

pub const GEOKEY_MODEL_TYPE: u16 = 1024;
pub const GEOKEY_RASTER_TYPE: u16 = 1025;
pub const GEOKEY_PROJECTED_CS_TYPE: u16 = 3072;
pub const MODEL_TYPE_PROJECTED: u16 = 1;
pub const RASTER_TYPE_PIXEL_IS_AREA: u16 = 1;
