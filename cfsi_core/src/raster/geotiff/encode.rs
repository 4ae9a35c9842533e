//! Baseline GeoTIFF encoder.
//!
//! Writes classic little-endian TIFF: one IFD per page, one strip per band
//! plane (planar configuration 2), uncompressed samples. Georeferencing is
//! carried by ModelPixelScale, ModelTiepoint and a minimal GeoKey directory
//! holding the projected EPSG code; the nodata value goes into the GDAL
//! nodata tag.

use super::tags::*;
use crate::{CfsiError, RasterDtype, Result};
use byteorder::{LE, WriteBytesExt};

/// One image page (the base image or an overview level).
pub(super) struct Page {
	pub nrows: usize,
	pub ncols: usize,
	pub dtype: RasterDtype,
	/// Little-endian sample bytes, one plane per band.
	pub planes: Vec<Vec<u8>>,
	pub geo: GeoTags,
}

pub(super) struct GeoTags {
	pub epsg: u16,
	/// Row-major 3x3 affine; `ydim` must be negative (north-up).
	pub transform: [f64; 9],
	pub nodata: f64,
}

struct IfdEntry {
	tag: u16,
	field_type: u16,
	count: u32,
	/// Inline value or resolved data offset, already left-justified.
	value: [u8; 4],
}

fn inline_shorts(values: &[u16]) -> [u8; 4] {
	let mut raw = [0u8; 4];
	for (index, value) in values.iter().enumerate() {
		raw[index * 2..index * 2 + 2].copy_from_slice(&value.to_le_bytes());
	}
	raw
}

fn inline_long(value: u32) -> [u8; 4] {
	value.to_le_bytes()
}

/// Appends `data`, word-aligned, and returns its offset.
fn append_block(buffer: &mut Vec<u8>, data: &[u8]) -> u32 {
	if buffer.len() % 2 == 1 {
		buffer.push(0);
	}
	let offset = buffer.len() as u32;
	buffer.extend_from_slice(data);
	offset
}

fn shorts_entry(buffer: &mut Vec<u8>, tag: u16, values: &[u16]) -> IfdEntry {
	let value = if values.len() <= 2 {
		inline_shorts(values)
	} else {
		let mut data = Vec::with_capacity(values.len() * 2);
		for v in values {
			data.write_u16::<LE>(*v).unwrap();
		}
		inline_long(append_block(buffer, &data))
	};
	IfdEntry {
		tag,
		field_type: TYPE_SHORT,
		count: values.len() as u32,
		value,
	}
}

fn longs_entry(buffer: &mut Vec<u8>, tag: u16, values: &[u32]) -> IfdEntry {
	let value = if values.len() == 1 {
		inline_long(values[0])
	} else {
		let mut data = Vec::with_capacity(values.len() * 4);
		for v in values {
			data.write_u32::<LE>(*v).unwrap();
		}
		inline_long(append_block(buffer, &data))
	};
	IfdEntry {
		tag,
		field_type: TYPE_LONG,
		count: values.len() as u32,
		value,
	}
}

fn doubles_entry(buffer: &mut Vec<u8>, tag: u16, values: &[f64]) -> IfdEntry {
	let mut data = Vec::with_capacity(values.len() * 8);
	for v in values {
		data.write_f64::<LE>(*v).unwrap();
	}
	IfdEntry {
		tag,
		field_type: TYPE_DOUBLE,
		count: values.len() as u32,
		value: inline_long(append_block(buffer, &data)),
	}
}

fn ascii_entry(buffer: &mut Vec<u8>, tag: u16, text: &str) -> IfdEntry {
	let mut data = text.as_bytes().to_vec();
	data.push(0);
	let value = if data.len() <= 4 {
		let mut raw = [0u8; 4];
		raw[..data.len()].copy_from_slice(&data);
		raw
	} else {
		inline_long(append_block(buffer, &data))
	};
	IfdEntry {
		tag,
		field_type: TYPE_ASCII,
		count: data.len() as u32,
		value,
	}
}

fn sample_format(dtype: RasterDtype) -> u16 {
	match dtype {
		RasterDtype::U8 | RasterDtype::U16 => SAMPLE_FORMAT_UNSIGNED,
		RasterDtype::F32 | RasterDtype::F64 => SAMPLE_FORMAT_FLOAT,
	}
}

/// Encodes `pages` into a complete TIFF byte stream. The first page is the
/// full-resolution image; further pages become chained reduced-resolution
/// IFDs, which is also how the external `.ovr` files are laid out.
pub(super) fn encode(pages: &[Page]) -> Result<Vec<u8>> {
	if pages.is_empty() {
		return Err(CfsiError::RasterIoFailed("nothing to encode".to_string()));
	}

	let mut buffer: Vec<u8> = Vec::new();
	buffer.extend_from_slice(b"II");
	buffer.write_u16::<LE>(42).unwrap();
	let first_ifd_patch = buffer.len();
	buffer.write_u32::<LE>(0).unwrap();

	let mut previous_next_patch = first_ifd_patch;
	for page in pages {
		let samples = page.planes.len();
		if samples == 0 {
			return Err(CfsiError::RasterIoFailed("page without bands".to_string()));
		}
		let expected = page.nrows * page.ncols * (page.dtype.bits() as usize / 8);
		for plane in &page.planes {
			if plane.len() != expected {
				return Err(CfsiError::RasterIoFailed(format!(
					"plane holds {} bytes, expected {expected}",
					plane.len()
				)));
			}
		}
		if page.geo.transform[4] > 0.0 {
			return Err(CfsiError::RasterIoFailed(
				"only north-up transforms (negative ydim) can be written".to_string(),
			));
		}

		// plane data first, IFD afterwards
		let mut strip_offsets = Vec::with_capacity(samples);
		let mut strip_counts = Vec::with_capacity(samples);
		for plane in &page.planes {
			strip_offsets.push(append_block(&mut buffer, plane));
			strip_counts.push(plane.len() as u32);
		}

		let t = &page.geo.transform;
		let pixel_scale = [t[0], -t[4], 0.0];
		let tiepoint = [0.0, 0.0, 0.0, t[2], t[5], 0.0];
		let geo_keys: Vec<u16> = vec![
			1, 1, 0, 3, // version, revision, minor, key count
			GEOKEY_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED,
			GEOKEY_RASTER_TYPE, 0, 1, RASTER_TYPE_PIXEL_IS_AREA,
			GEOKEY_PROJECTED_CS_TYPE, 0, 1, page.geo.epsg,
		];

		let mut entries = vec![
			longs_entry(&mut buffer, TAG_IMAGE_WIDTH, &[page.ncols as u32]),
			longs_entry(&mut buffer, TAG_IMAGE_LENGTH, &[page.nrows as u32]),
			shorts_entry(&mut buffer, TAG_BITS_PER_SAMPLE, &vec![page.dtype.bits(); samples]),
			shorts_entry(&mut buffer, TAG_COMPRESSION, &[COMPRESSION_NONE]),
			shorts_entry(&mut buffer, TAG_PHOTOMETRIC, &[PHOTOMETRIC_MIN_IS_BLACK]),
			longs_entry(&mut buffer, TAG_STRIP_OFFSETS, &strip_offsets),
			shorts_entry(&mut buffer, TAG_SAMPLES_PER_PIXEL, &[samples as u16]),
			longs_entry(&mut buffer, TAG_ROWS_PER_STRIP, &[page.nrows as u32]),
			longs_entry(&mut buffer, TAG_STRIP_BYTE_COUNTS, &strip_counts),
			shorts_entry(&mut buffer, TAG_PLANAR_CONFIGURATION, &[PLANAR_SEPARATE]),
			shorts_entry(
				&mut buffer,
				TAG_SAMPLE_FORMAT,
				&vec![sample_format(page.dtype); samples],
			),
			doubles_entry(&mut buffer, TAG_MODEL_PIXEL_SCALE, &pixel_scale),
			doubles_entry(&mut buffer, TAG_MODEL_TIEPOINT, &tiepoint),
			shorts_entry(&mut buffer, TAG_GEO_KEY_DIRECTORY, &geo_keys),
			ascii_entry(&mut buffer, TAG_GDAL_NODATA, &format!("{}", page.geo.nodata)),
		];
		entries.sort_by_key(|entry| entry.tag);

		// IFD: entry count, entries, next-IFD offset
		if buffer.len() % 2 == 1 {
			buffer.push(0);
		}
		let ifd_offset = buffer.len() as u32;
		buffer[previous_next_patch..previous_next_patch + 4].copy_from_slice(&ifd_offset.to_le_bytes());

		buffer.write_u16::<LE>(entries.len() as u16).unwrap();
		for entry in &entries {
			buffer.write_u16::<LE>(entry.tag).unwrap();
			buffer.write_u16::<LE>(entry.field_type).unwrap();
			buffer.write_u32::<LE>(entry.count).unwrap();
			buffer.extend_from_slice(&entry.value);
		}
		previous_next_patch = buffer.len();
		buffer.write_u32::<LE>(0).unwrap();
	}

	Ok(buffer)
}
