//! Single-band GeoTIFF reading and writing.
//!
//! Pure Rust on top of the `tiff` crate. Georeferencing is carried by the
//! ModelPixelScale + ModelTiepoint pair for north-up grids and by
//! ModelTransformation otherwise. The CRS travels as an EPSG code in the
//! GeoKey directory; PROJ-string CRSs are written as user-defined with the
//! definition in GeoAsciiParams.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use flood_common::{Crs, GeoTransform, GridDescriptor, Tile};
use serde::{Deserialize, Serialize};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::{Compression, DeflateLevel, TiffEncoder};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{IngestionError, Result};

// GeoTIFF tag IDs
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

// GeoKey IDs
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// Compression for written rasters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoTiffCompression {
    None,
    #[default]
    Lzw,
    Deflate,
}

impl GeoTiffCompression {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" | "uncompressed" => Self::None,
            "deflate" | "zip" => Self::Deflate,
            _ => Self::Lzw,
        }
    }

    fn to_tiff(self) -> Compression {
        match self {
            Self::None => Compression::Uncompressed,
            Self::Lzw => Compression::Lzw,
            Self::Deflate => Compression::Deflate(DeflateLevel::Balanced),
        }
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Read the first (only) band of a GeoTIFF into a [`Tile`].
///
/// The GDAL no-data value, if any, becomes the tile's sentinel. A file with
/// no CRS GeoKey yields a grid with `crs == None`.
pub fn read_tile(path: &Path) -> Result<Tile> {
    let mut decoder = open_decoder(path)?;
    let header = read_header(&mut decoder).map_err(|e| IngestionError::geotiff(path, e))?;

    let image = decoder
        .read_image()
        .map_err(|e| IngestionError::geotiff(path, e))?;
    let data = decoding_result_to_f32(image).ok_or_else(|| {
        IngestionError::geotiff(path, "unsupported sample format")
    })?;

    debug!(
        path = %path.display(),
        width = header.grid.width,
        height = header.grid.height,
        crs = ?header.grid.crs,
        "Read GeoTIFF"
    );

    Ok(Tile::new(data, header.grid, header.nodata)?)
}

/// Read only the grid descriptor of a GeoTIFF, without decoding pixels.
pub fn read_grid(path: &Path) -> Result<GridDescriptor> {
    let mut decoder = open_decoder(path)?;
    let header = read_header(&mut decoder).map_err(|e| IngestionError::geotiff(path, e))?;
    Ok(header.grid)
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path)?;
    let decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| IngestionError::geotiff(path, e))?
        .with_limits(Limits::unlimited());
    Ok(decoder)
}

struct Header {
    grid: GridDescriptor,
    nodata: Option<f32>,
}

fn read_header<R: Read + Seek>(decoder: &mut Decoder<R>) -> std::result::Result<Header, String> {
    let (width, height) = decoder.dimensions().map_err(|e| e.to_string())?;

    let samples = decoder
        .find_tag(Tag::SamplesPerPixel)
        .map_err(|e| e.to_string())?
        .map(|v| v.into_u16())
        .transpose()
        .map_err(|e| e.to_string())?
        .unwrap_or(1);
    if samples != 1 {
        return Err(format!("expected a single-band raster, found {} bands", samples));
    }

    let geokeys = read_geokeys(decoder)?;
    let mut transform = read_transform(decoder)?;
    if geokey_value(&geokeys, GT_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
        // Tiepoints name pixel centres; the grid origin is the outer corner.
        let (x, y) = transform.apply(-0.5, -0.5);
        transform.origin_x = x;
        transform.origin_y = y;
    }
    let crs = read_crs(decoder, &geokeys)?;
    let nodata = read_nodata(decoder)?;

    let grid = GridDescriptor::new(crs, transform, width as usize, height as usize)
        .map_err(|e| e.to_string())?;

    Ok(Header { grid, nodata })
}

fn find_f64s<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: u16,
) -> std::result::Result<Option<Vec<f64>>, String> {
    decoder
        .find_tag(Tag::Unknown(tag))
        .map_err(|e| e.to_string())?
        .map(|v| v.into_f64_vec())
        .transpose()
        .map_err(|e| e.to_string())
}

fn find_ascii<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: u16,
) -> std::result::Result<Option<String>, String> {
    decoder
        .find_tag(Tag::Unknown(tag))
        .map_err(|e| e.to_string())?
        .map(|v| v.into_string())
        .transpose()
        .map_err(|e| e.to_string())
}

fn read_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
) -> std::result::Result<GeoTransform, String> {
    let scale = find_f64s(decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = find_f64s(decoder, MODEL_TIEPOINT)?;

    if let (Some(scale), Some(tie)) = (&scale, &tiepoint) {
        if scale.len() < 2 || tie.len() < 6 {
            return Err("malformed ModelPixelScale/ModelTiepoint".to_string());
        }
        let (sx, sy) = (scale[0], scale[1]);
        let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
        return Ok(GeoTransform::north_up(x - i * sx, y + j * sy, sx, -sy));
    }

    if let Some(m) = find_f64s(decoder, MODEL_TRANSFORMATION)? {
        if m.len() < 8 {
            return Err("malformed ModelTransformation".to_string());
        }
        return Ok(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
    }

    Err("no georeferencing tags".to_string())
}

/// The raw GeoKeyDirectory, empty when the tag is absent.
fn read_geokeys<R: Read + Seek>(decoder: &mut Decoder<R>) -> std::result::Result<Vec<u16>, String> {
    Ok(decoder
        .find_tag(Tag::Unknown(GEO_KEY_DIRECTORY))
        .map_err(|e| e.to_string())?
        .map(|v| v.into_u16_vec())
        .transpose()
        .map_err(|e| e.to_string())?
        .unwrap_or_default())
}

/// Value of a key stored inline in the directory (location 0).
fn geokey_value(keys: &[u16], key: u16) -> Option<u16> {
    keys.get(4..)?
        .chunks_exact(4)
        .find(|entry| entry[0] == key && entry[1] == 0)
        .map(|entry| entry[3])
}

fn read_crs<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    keys: &[u16],
) -> std::result::Result<Option<Crs>, String> {
    if keys.is_empty() {
        return Ok(None);
    }

    let code = geokey_value(keys, PROJECTED_CS_TYPE).or_else(|| geokey_value(keys, GEOGRAPHIC_TYPE));

    match code {
        Some(USER_DEFINED) | None => {
            let citation = find_ascii(decoder, GEO_ASCII_PARAMS)?;
            Ok(citation.and_then(|text| {
                let def = text.trim_end_matches(['|', '\0']).trim();
                if def.starts_with('+') {
                    Crs::parse(def).ok()
                } else {
                    None
                }
            }))
        }
        Some(code) => Ok(Some(Crs::Epsg(u32::from(code)))),
    }
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> std::result::Result<Option<f32>, String> {
    Ok(find_ascii(decoder, GDAL_NODATA)?
        .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse::<f32>().ok()))
}

fn decoding_result_to_f32(result: DecodingResult) -> Option<Vec<f32>> {
    let data = match result {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(data)
}

// ============================================================================
// Writing
// ============================================================================

/// Write a tile as a single-band `f32` GeoTIFF.
///
/// The file is written next to `path` and renamed into place, so a crashed
/// run never leaves a truncated raster that would later be skipped as done.
/// The no-data tag is `nan` unless the tile carries its own sentinel.
pub fn write_tile(path: &Path, tile: &Tile, compression: GeoTiffCompression) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".flood-")
        .suffix(".tif.part")
        .tempfile_in(dir)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        encode(&mut writer, tile, compression).map_err(|e| IngestionError::geotiff(path, e))?;
        writer.flush()?;
    }

    tmp.persist(path).map_err(|e| IngestionError::FileRead(e.error))?;

    debug!(
        path = %path.display(),
        width = tile.width(),
        height = tile.height(),
        compression = ?compression,
        "Wrote GeoTIFF"
    );
    Ok(())
}

fn encode<W: Write + Seek>(
    writer: W,
    tile: &Tile,
    compression: GeoTiffCompression,
) -> std::result::Result<(), tiff::TiffError> {
    let mut encoder = TiffEncoder::new(writer)?.with_compression(compression.to_tiff());
    let mut image = encoder.new_image::<Gray32Float>(tile.width() as u32, tile.height() as u32)?;

    let grid = tile.grid();
    let dir = image.encoder();
    let t = &grid.transform;

    if t.is_north_up() && t.pixel_height < 0.0 {
        let scale = [t.pixel_width, -t.pixel_height, 0.0];
        dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), scale.as_slice())?;
        let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
        dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), tiepoint.as_slice())?;
    } else {
        let matrix = [
            t.pixel_width, t.row_rotation, 0.0, t.origin_x,
            t.col_rotation, t.pixel_height, 0.0, t.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::Unknown(MODEL_TRANSFORMATION), matrix.as_slice())?;
    }

    if let Some(crs) = &grid.crs {
        let (keys, ascii) = geokey_directory(crs);
        dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), keys.as_slice())?;
        if let Some(ascii) = ascii {
            dir.write_tag(Tag::Unknown(GEO_ASCII_PARAMS), ascii.as_str())?;
        }
    }

    let nodata = match tile.nodata() {
        Some(v) if !v.is_nan() => v.to_string(),
        _ => "nan".to_string(),
    };
    dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata.as_str())?;

    image.write_data(tile.data())?;
    Ok(())
}

/// GeoKeyDirectory entries plus the GeoAsciiParams they reference.
fn geokey_directory(crs: &Crs) -> (Vec<u16>, Option<String>) {
    let geographic = projection::is_geographic(crs);
    let model_type = if geographic {
        MODEL_TYPE_GEOGRAPHIC
    } else {
        MODEL_TYPE_PROJECTED
    };
    let type_key = if geographic {
        GEOGRAPHIC_TYPE
    } else {
        PROJECTED_CS_TYPE
    };

    let mut entries: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE, 0, 1, model_type],
        [GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA],
    ];

    let code = crs.epsg_code().and_then(|c| u16::try_from(c).ok());
    let ascii = match code {
        Some(code) => {
            entries.push([type_key, 0, 1, code]);
            None
        }
        None => {
            let citation = format!("{}|", crs);
            entries.push([GT_CITATION, GEO_ASCII_PARAMS, citation.len() as u16, 0]);
            entries.push([type_key, 0, 1, USER_DEFINED]);
            Some(citation)
        }
    };

    entries.sort_by_key(|e| e[0]);

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    (keys, ascii)
}
