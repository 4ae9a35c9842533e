//! Decoder for the TIFF subset the encoder produces.

use super::tags::*;
use crate::{CfsiError, GridSpec, RasterDtype, RasterInfo, Result};
use byteorder::{ByteOrder, LE};
use ndarray::Array2;
use std::collections::HashMap;

fn decode_error(message: impl Into<String>) -> CfsiError {
	CfsiError::RasterIoFailed(message.into())
}

struct Field {
	field_type: u16,
	count: u32,
	raw: [u8; 4],
}

pub(super) struct Ifd<'a> {
	buffer: &'a [u8],
	fields: HashMap<u16, Field>,
}

fn type_size(field_type: u16) -> usize {
	match field_type {
		TYPE_ASCII => 1,
		TYPE_SHORT => 2,
		TYPE_LONG => 4,
		TYPE_DOUBLE => 8,
		_ => 0,
	}
}

impl<'a> Ifd<'a> {
	/// Raw value bytes of a field, following the offset when the value does
	/// not fit inline.
	fn data(&self, field: &Field) -> Result<&'a [u8]> {
		let length = field.count as usize * type_size(field.field_type);
		if length == 0 {
			return Err(decode_error("field with unsupported type"));
		}
		if length <= 4 {
			// inline values live in the entry itself; reslice from raw copy
			// is not possible, so inline fields are handled by the callers
			// via `raw`
			return Err(decode_error("inline field accessed as block"));
		}
		let offset = LE::read_u32(&field.raw) as usize;
		self
			.buffer
			.get(offset..offset + length)
			.ok_or_else(|| decode_error("field data out of bounds"))
	}

	fn values(&self, tag: u16) -> Result<Vec<u64>> {
		let field = self.fields.get(&tag).ok_or_else(|| decode_error(format!("missing tag {tag}")))?;
		let size = type_size(field.field_type);
		let length = field.count as usize * size;
		let read_one = |bytes: &[u8]| -> u64 {
			match field.field_type {
				TYPE_SHORT => u64::from(LE::read_u16(bytes)),
				TYPE_LONG => u64::from(LE::read_u32(bytes)),
				_ => u64::from(bytes[0]),
			}
		};
		let mut out = Vec::with_capacity(field.count as usize);
		if length <= 4 {
			for index in 0..field.count as usize {
				out.push(read_one(&field.raw[index * size..]));
			}
		} else {
			let data = self.data(field)?;
			for index in 0..field.count as usize {
				out.push(read_one(&data[index * size..]));
			}
		}
		Ok(out)
	}

	fn value(&self, tag: u16) -> Result<u64> {
		Ok(*self
			.values(tag)?
			.first()
			.ok_or_else(|| decode_error(format!("empty tag {tag}")))?)
	}

	fn doubles(&self, tag: u16) -> Result<Vec<f64>> {
		let field = self.fields.get(&tag).ok_or_else(|| decode_error(format!("missing tag {tag}")))?;
		if field.field_type != TYPE_DOUBLE {
			return Err(decode_error(format!("tag {tag} is not of type DOUBLE")));
		}
		let data = self.data(field)?;
		Ok(data.chunks_exact(8).map(LE::read_f64).collect())
	}

	fn ascii(&self, tag: u16) -> Result<Option<String>> {
		let Some(field) = self.fields.get(&tag) else {
			return Ok(None);
		};
		let bytes = if field.count as usize <= 4 {
			&field.raw[..field.count as usize]
		} else {
			self.data(field)?
		};
		let text = bytes.split(|b| *b == 0).next().unwrap_or_default();
		Ok(Some(String::from_utf8_lossy(text).to_string()))
	}
}

/// All IFDs (pages) of a TIFF buffer.
pub(super) fn parse_ifds(buffer: &[u8]) -> Result<Vec<Ifd<'_>>> {
	if buffer.len() < 8 || &buffer[0..2] != b"II" || LE::read_u16(&buffer[2..4]) != 42 {
		return Err(decode_error("not a little-endian TIFF file"));
	}
	let mut pages = Vec::new();
	let mut next = LE::read_u32(&buffer[4..8]) as usize;
	while next != 0 {
		if next + 2 > buffer.len() {
			return Err(decode_error("IFD offset out of bounds"));
		}
		let count = LE::read_u16(&buffer[next..]) as usize;
		let entries_end = next + 2 + count * 12;
		if entries_end + 4 > buffer.len() {
			return Err(decode_error("IFD truncated"));
		}
		let mut fields = HashMap::with_capacity(count);
		for index in 0..count {
			let base = next + 2 + index * 12;
			let tag = LE::read_u16(&buffer[base..]);
			let field_type = LE::read_u16(&buffer[base + 2..]);
			let count = LE::read_u32(&buffer[base + 4..]);
			let mut raw = [0u8; 4];
			raw.copy_from_slice(&buffer[base + 8..base + 12]);
			fields.insert(tag, Field { field_type, count, raw });
		}
		pages.push(Ifd { buffer, fields });
		next = LE::read_u32(&buffer[entries_end..]) as usize;
	}
	if pages.is_empty() {
		return Err(decode_error("TIFF has no pages"));
	}
	Ok(pages)
}

fn dtype_of(bits: u64, format: u64) -> Result<RasterDtype> {
	match (bits, format) {
		(8, 1) => Ok(RasterDtype::U8),
		(16, 1) => Ok(RasterDtype::U16),
		(32, 3) => Ok(RasterDtype::F32),
		(64, 3) => Ok(RasterDtype::F64),
		_ => Err(decode_error(format!("unsupported sample layout: {bits} bits, format {format}"))),
	}
}

pub(super) fn page_info(page: &Ifd) -> Result<RasterInfo> {
	let ncols = page.value(TAG_IMAGE_WIDTH)? as usize;
	let nrows = page.value(TAG_IMAGE_LENGTH)? as usize;
	let bands = page.value(TAG_SAMPLES_PER_PIXEL)? as usize;
	let bits = page.value(TAG_BITS_PER_SAMPLE)?;
	let format = page.value(TAG_SAMPLE_FORMAT).unwrap_or(1);
	let dtype = dtype_of(bits, format)?;

	let scale = page.doubles(TAG_MODEL_PIXEL_SCALE)?;
	let tiepoint = page.doubles(TAG_MODEL_TIEPOINT)?;
	if scale.len() < 2 || tiepoint.len() < 5 {
		return Err(decode_error("incomplete georeferencing tags"));
	}
	let transform = [scale[0], 0.0, tiepoint[3], 0.0, -scale[1], tiepoint[4], 0.0, 0.0, 1.0];

	let keys = page.values(TAG_GEO_KEY_DIRECTORY)?;
	let mut epsg = None;
	for chunk in keys.chunks_exact(4).skip(1) {
		if chunk[0] == u64::from(GEOKEY_PROJECTED_CS_TYPE) {
			epsg = Some(chunk[3]);
		}
	}
	let epsg = epsg.ok_or_else(|| decode_error("no projected CRS geokey"))?;

	let nodata = page.ascii(TAG_GDAL_NODATA)?.and_then(|text| text.trim().parse().ok());

	Ok(RasterInfo {
		crs: format!("EPSG:{epsg}"),
		grid: GridSpec::new([nrows, ncols], transform),
		dtype,
		bands,
		nodata,
	})
}

/// Reads one band (1-based) of a page as `f64`.
pub(super) fn page_band(page: &Ifd, info: &RasterInfo, band: usize) -> Result<Array2<f64>> {
	if band == 0 || band > info.bands {
		return Err(decode_error(format!("band {band} out of range 1..={}", info.bands)));
	}
	if page.value(TAG_COMPRESSION)? != u64::from(COMPRESSION_NONE) {
		return Err(decode_error("compressed TIFFs are not supported"));
	}
	if page.value(TAG_PLANAR_CONFIGURATION).unwrap_or(1) != u64::from(PLANAR_SEPARATE) && info.bands > 1 {
		return Err(decode_error("interleaved multi-band TIFFs are not supported"));
	}

	let offsets = page.values(TAG_STRIP_OFFSETS)?;
	let counts = page.values(TAG_STRIP_BYTE_COUNTS)?;
	if offsets.len() != info.bands || counts.len() != info.bands {
		return Err(decode_error("expected exactly one strip per band plane"));
	}

	let offset = offsets[band - 1] as usize;
	let count = counts[band - 1] as usize;
	let data = page
		.buffer
		.get(offset..offset + count)
		.ok_or_else(|| decode_error("strip out of bounds"))?;

	let [nrows, ncols] = info.grid.shape;
	let pixels = nrows * ncols;
	let sample_bytes = info.dtype.bits() as usize / 8;
	if count != pixels * sample_bytes {
		return Err(decode_error("strip size does not match image shape"));
	}

	let values: Vec<f64> = match info.dtype {
		RasterDtype::U8 => data.iter().map(|v| f64::from(*v)).collect(),
		RasterDtype::U16 => data.chunks_exact(2).map(|c| f64::from(LE::read_u16(c))).collect(),
		RasterDtype::F32 => data.chunks_exact(4).map(|c| f64::from(LE::read_f32(c))).collect(),
		RasterDtype::F64 => data.chunks_exact(8).map(LE::read_f64).collect(),
	};
	Array2::from_shape_vec((nrows, ncols), values).map_err(|err| decode_error(err.to_string()))
}
