//! Extended well-known binary (EWKB) geometry codec.
//!
//! Geometry bodies are written and read by `geozero` in its EWKB dialect: an
//! SRID flag on the outermost geometry when a reference is supplied, and a Z
//! flag when three dimensions are requested. In-memory geometries are planar,
//! so three-dimensional output carries a constant Z chosen by the codec.
//!
//! Before a blob is handed to the decoder its headers are walked once. The
//! walk reports the SRID and dimension, rejects truncated input and trailing
//! bytes, and bounds how deeply collections may nest.

use geo::{Coord, Geometry, Polygon};
use geozero::{
    CoordDimensions, GeomProcessor, GeozeroGeometry, ToGeo, ToWkb, error::GeozeroError,
    wkb::Ewkb,
};
use thiserror::Error;

use crate::table::quote_identifier;

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;
const WKB_GEOMETRYCOLLECTION: u32 = 7;

const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;
const EWKB_FLAGS: u32 = EWKB_Z_FLAG | EWKB_M_FLAG | EWKB_SRID_FLAG;

const BYTE_ORDER_BIG_ENDIAN: u8 = 0;
const BYTE_ORDER_LITTLE_ENDIAN: u8 = 1;

const ORDINATE_BYTES: usize = 8;

/// Deepest nesting of multi-geometries and collections accepted on decode.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Coordinate dimension written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub enum Dimension {
    /// X and Y.
    #[default]
    Xy,
    /// X, Y and Z.
    Xyz,
}

impl Dimension {
    /// Number of ordinates per coordinate.
    pub const fn ordinates(self) -> u8 {
        match self {
            Self::Xy => 2,
            Self::Xyz => 3,
        }
    }

    fn coord_dimensions(self) -> CoordDimensions {
        match self {
            Self::Xy => CoordDimensions::xy(),
            Self::Xyz => CoordDimensions::xyz(),
        }
    }
}

impl TryFrom<u8> for Dimension {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Xy),
            3 => Ok(Self::Xyz),
            other => Err(CodecError::UnsupportedDimension { dimension: other }),
        }
    }
}

impl From<Dimension> for u8 {
    fn from(value: Dimension) -> Self {
        value.ordinates()
    }
}

/// Errors raised while encoding or decoding EWKB.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Only two and three dimensional output is supported.
    #[error("unsupported coordinate dimension {dimension}")]
    UnsupportedDimension {
        /// Requested dimension.
        dimension: u8,
    },
    /// The input ended before the geometry was complete.
    #[error("EWKB input truncated at byte {offset}")]
    Truncated {
        /// Offset at which more bytes were expected.
        offset: usize,
    },
    /// The byte order marker was neither 0 nor 1.
    #[error("invalid EWKB byte order marker {marker} at byte {offset}")]
    InvalidByteOrder {
        /// Marker found.
        marker: u8,
        /// Offset of the marker.
        offset: usize,
    },
    /// The geometry type code is not understood.
    #[error("unknown EWKB geometry type {code:#x}")]
    UnknownGeometryType {
        /// Raw type word, flags included.
        code: u32,
    },
    /// A multi-geometry contained a member of the wrong type.
    #[error("expected member of type {expected}, found {found}")]
    UnexpectedMember {
        /// Expected base type code.
        expected: u32,
        /// Found base type code.
        found: u32,
    },
    /// Collections were nested deeper than [`MAX_NESTING_DEPTH`].
    #[error("EWKB geometry nests deeper than {limit} levels")]
    NestingTooDeep {
        /// Depth limit.
        limit: usize,
    },
    /// Bytes remained after the geometry.
    #[error("{remaining} trailing bytes after EWKB geometry")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },
    /// The geometry could not be written.
    #[error("failed to encode geometry as EWKB")]
    Encode(#[source] GeozeroError),
    /// The geometry body could not be read.
    #[error("failed to decode EWKB geometry")]
    Decode(#[source] GeozeroError),
}

/// A geometry read back from the store together with its tags.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGeometry {
    /// The planar geometry.
    pub geometry: Geometry<f64>,
    /// SRID carried by the EWKB header, if any.
    pub srid: Option<i32>,
    /// Dimension found in the header.
    pub dimension: Dimension,
}

/// Encoding side of a spatial store: how geometries are written, read, and
/// projected in SELECT statements.
pub trait GeometryCodec {
    /// Encode `geometry` tagged with `srid` at `dimension`.
    fn encode(
        &self,
        geometry: &Geometry<f64>,
        srid: Option<i32>,
        dimension: Dimension,
    ) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes produced by the store's read projection.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedGeometry, CodecError>;

    /// SQL fragment that reads `column` in the binary form [`Self::decode`]
    /// understands.
    fn decode_column_expression(&self, column: &str) -> String;
}

/// How the read side projects a geometry column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProjection {
    /// Wrap the column in `ST_AsEWKB`, for stores with a native geometry type.
    AsEwkb,
    /// Read the column as is, for stores that keep EWKB blobs.
    Raw,
}

/// EWKB codec parameterised by the read projection and the constant Z used
/// for three-dimensional output.
///
/// # Examples
///
/// ```
/// use geo::{Geometry, Point};
/// use geosync_core::{Dimension, EwkbCodec, GeometryCodec};
///
/// # fn main() -> Result<(), geosync_core::CodecError> {
/// let codec = EwkbCodec::postgis();
/// let point = Geometry::Point(Point::new(1.0, 2.0));
/// let bytes = codec.encode(&point, Some(4326), Dimension::Xy)?;
/// let decoded = codec.decode(&bytes)?;
/// assert_eq!(decoded.geometry, point);
/// assert_eq!(decoded.srid, Some(4326));
/// assert_eq!(codec.decode_column_expression("geom"), r#"ST_AsEWKB("geom")"#);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EwkbCodec {
    projection: ReadProjection,
    z_value: f64,
}

impl EwkbCodec {
    /// Codec for PostGIS: reads through `ST_AsEWKB`.
    pub const fn postgis() -> Self {
        Self {
            projection: ReadProjection::AsEwkb,
            z_value: 0.0,
        }
    }

    /// Codec for stores that persist EWKB blobs verbatim.
    pub const fn blob() -> Self {
        Self {
            projection: ReadProjection::Raw,
            z_value: 0.0,
        }
    }

    /// Use `z_value` as the Z ordinate of three-dimensional output.
    #[must_use]
    pub const fn with_z_value(mut self, z_value: f64) -> Self {
        self.z_value = z_value;
        self
    }

    /// Read projection in use.
    pub const fn projection(&self) -> ReadProjection {
        self.projection
    }
}

impl Default for EwkbCodec {
    fn default() -> Self {
        Self::postgis()
    }
}

impl GeometryCodec for EwkbCodec {
    fn encode(
        &self,
        geometry: &Geometry<f64>,
        srid: Option<i32>,
        dimension: Dimension,
    ) -> Result<Vec<u8>, CodecError> {
        let dims = dimension.coord_dimensions();
        let encoded = match dimension {
            Dimension::Xy => geometry.to_ewkb(dims, srid),
            Dimension::Xyz => ConstantZ {
                geometry,
                z: self.z_value,
            }
            .to_ewkb(dims, srid),
        };
        encoded.map_err(CodecError::Encode)
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedGeometry, CodecError> {
        let layout = Layout::scan(bytes)?;
        let geometry = Ewkb(bytes.to_vec())
            .to_geo()
            .map_err(CodecError::Decode)?;
        Ok(DecodedGeometry {
            geometry,
            srid: layout.srid,
            dimension: layout.dimension,
        })
    }

    fn decode_column_expression(&self, column: &str) -> String {
        match self.projection {
            ReadProjection::AsEwkb => format!("ST_AsEWKB({})", quote_identifier(column)),
            ReadProjection::Raw => quote_identifier(column),
        }
    }
}

/// Planar geometry fed to the EWKB writer with a fixed Z on every coordinate.
struct ConstantZ<'g> {
    geometry: &'g Geometry<f64>,
    z: f64,
}

type ProcessResult = Result<(), GeozeroError>;

impl GeozeroGeometry for ConstantZ<'_> {
    fn process_geom<P: GeomProcessor>(&self, processor: &mut P) -> ProcessResult {
        self.geometry(self.geometry, 0, processor)
    }
}

impl ConstantZ<'_> {
    fn coord<P: GeomProcessor>(
        &self,
        coord: Coord<f64>,
        idx: usize,
        processor: &mut P,
    ) -> ProcessResult {
        processor.coordinate(coord.x, coord.y, Some(self.z), None, None, None, idx)
    }

    fn line<P: GeomProcessor>(
        &self,
        coords: &[Coord<f64>],
        tagged: bool,
        idx: usize,
        processor: &mut P,
    ) -> ProcessResult {
        processor.linestring_begin(tagged, coords.len(), idx)?;
        for (i, coord) in coords.iter().enumerate() {
            self.coord(*coord, i, processor)?;
        }
        processor.linestring_end(tagged, idx)
    }

    fn polygon<P: GeomProcessor>(
        &self,
        polygon: &Polygon<f64>,
        tagged: bool,
        idx: usize,
        processor: &mut P,
    ) -> ProcessResult {
        processor.polygon_begin(tagged, 1 + polygon.interiors().len(), idx)?;
        self.line(&polygon.exterior().0, false, 0, processor)?;
        for (i, ring) in polygon.interiors().iter().enumerate() {
            self.line(&ring.0, false, i + 1, processor)?;
        }
        processor.polygon_end(tagged, idx)
    }

    fn geometry<P: GeomProcessor>(
        &self,
        geometry: &Geometry<f64>,
        idx: usize,
        processor: &mut P,
    ) -> ProcessResult {
        match geometry {
            Geometry::Point(point) => {
                processor.point_begin(idx)?;
                self.coord(point.0, 0, processor)?;
                processor.point_end(idx)
            }
            Geometry::Line(line) => self.line(&[line.start, line.end], true, idx, processor),
            Geometry::LineString(line) => self.line(&line.0, true, idx, processor),
            Geometry::Polygon(polygon) => self.polygon(polygon, true, idx, processor),
            Geometry::Rect(rect) => self.polygon(&rect.to_polygon(), true, idx, processor),
            Geometry::Triangle(triangle) => {
                self.polygon(&triangle.to_polygon(), true, idx, processor)
            }
            Geometry::MultiPoint(points) => {
                processor.multipoint_begin(points.0.len(), idx)?;
                for (i, point) in points.0.iter().enumerate() {
                    self.coord(point.0, i, processor)?;
                }
                processor.multipoint_end(idx)
            }
            Geometry::MultiLineString(lines) => {
                processor.multilinestring_begin(lines.0.len(), idx)?;
                for (i, line) in lines.0.iter().enumerate() {
                    self.line(&line.0, false, i, processor)?;
                }
                processor.multilinestring_end(idx)
            }
            Geometry::MultiPolygon(polygons) => {
                processor.multipolygon_begin(polygons.0.len(), idx)?;
                for (i, polygon) in polygons.0.iter().enumerate() {
                    self.polygon(polygon, false, i, processor)?;
                }
                processor.multipolygon_end(idx)
            }
            Geometry::GeometryCollection(collection) => {
                processor.geometrycollection_begin(collection.0.len(), idx)?;
                for (i, member) in collection.0.iter().enumerate() {
                    self.geometry(member, i, processor)?;
                }
                processor.geometrycollection_end(idx)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Header {
    base_type: u32,
    ordinates: usize,
    has_z: bool,
    srid: Option<i32>,
    little_endian: bool,
}

impl Header {
    const fn member_type(self) -> Option<u32> {
        match self.base_type {
            WKB_MULTIPOINT => Some(WKB_POINT),
            WKB_MULTILINESTRING => Some(WKB_LINESTRING),
            WKB_MULTIPOLYGON => Some(WKB_POLYGON),
            _ => None,
        }
    }
}

/// Tags of the outermost geometry of a well-formed blob.
struct Layout {
    srid: Option<i32>,
    dimension: Dimension,
}

impl Layout {
    fn scan(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut scanner = Scanner { bytes, offset: 0 };
        let header = scanner.geometry(0)?;
        let remaining = bytes.len().saturating_sub(scanner.offset);
        if remaining > 0 {
            return Err(CodecError::TrailingBytes { remaining });
        }
        Ok(Self {
            srid: header.srid,
            dimension: if header.has_z {
                Dimension::Xyz
            } else {
                Dimension::Xy
            },
        })
    }
}

/// Walks EWKB headers and counts, skipping coordinate payloads.
struct Scanner<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Scanner<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let chunk = self
            .offset
            .checked_add(N)
            .and_then(|end| self.bytes.get(self.offset..end))
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or(CodecError::Truncated {
                offset: self.offset,
            })?;
        self.offset += N;
        Ok(chunk)
    }

    fn skip(&mut self, len: Option<usize>) -> Result<(), CodecError> {
        let end = len
            .and_then(|len| self.offset.checked_add(len))
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CodecError::Truncated {
                offset: self.offset,
            })?;
        self.offset = end;
        Ok(())
    }

    fn read_u32(&mut self, little_endian: bool) -> Result<u32, CodecError> {
        let raw = self.take::<4>()?;
        Ok(if little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn read_count(&mut self, little_endian: bool) -> Result<usize, CodecError> {
        let offset = self.offset;
        let count = self.read_u32(little_endian)?;
        usize::try_from(count).map_err(|_| CodecError::Truncated { offset })
    }

    fn header(&mut self) -> Result<Header, CodecError> {
        let offset = self.offset;
        let [marker] = self.take::<1>()?;
        let little_endian = match marker {
            BYTE_ORDER_LITTLE_ENDIAN => true,
            BYTE_ORDER_BIG_ENDIAN => false,
            marker => return Err(CodecError::InvalidByteOrder { marker, offset }),
        };
        let code = self.read_u32(little_endian)?;
        let base_type = code & !EWKB_FLAGS;
        if !(WKB_POINT..=WKB_GEOMETRYCOLLECTION).contains(&base_type) {
            return Err(CodecError::UnknownGeometryType { code });
        }
        let has_z = code & EWKB_Z_FLAG != 0;
        let has_m = code & EWKB_M_FLAG != 0;
        let srid = if code & EWKB_SRID_FLAG == 0 {
            None
        } else {
            Some(i32::from_ne_bytes(self.read_u32(little_endian)?.to_ne_bytes()))
        };
        Ok(Header {
            base_type,
            ordinates: 2 + usize::from(has_z) + usize::from(has_m),
            has_z,
            srid,
            little_endian,
        })
    }

    fn coordinates(&mut self, header: Header) -> Result<(), CodecError> {
        let count = self.read_count(header.little_endian)?;
        self.skip(
            count
                .checked_mul(header.ordinates)
                .and_then(|ordinates| ordinates.checked_mul(ORDINATE_BYTES)),
        )
    }

    fn geometry(&mut self, depth: usize) -> Result<Header, CodecError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(CodecError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
            });
        }
        let header = self.header()?;
        match header.base_type {
            WKB_POINT => self.skip(header.ordinates.checked_mul(ORDINATE_BYTES))?,
            WKB_LINESTRING => self.coordinates(header)?,
            WKB_POLYGON => {
                for _ in 0..self.read_count(header.little_endian)? {
                    self.coordinates(header)?;
                }
            }
            _ => {
                for _ in 0..self.read_count(header.little_endian)? {
                    let member = self.geometry(depth + 1)?;
                    if let Some(expected) = header.member_type()
                        && member.base_type != expected
                    {
                        return Err(CodecError::UnexpectedMember {
                            expected,
                            found: member.base_type,
                        });
                    }
                }
            }
        }
        Ok(header)
    }
}
