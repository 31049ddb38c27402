//! OSM PBF message decoding: `BlobHeader`, `Blob`, `HeaderBlock`, and
//! `PrimitiveBlock` with delta-coded dense nodes, ways, and relations.
//!
//! Field numbers follow the published osmformat/fileformat schema. Only
//! the fields the pipeline consumes are decoded; unknown fields are
//! skipped by the wire reader.

use super::wire::{self, Reader};
use super::{Attr, BlockData, MapNode, MapRelation, MapWay, Member, MemberKind, PbfError};
use crate::geo::SphereCoords;

type Result<T> = std::result::Result<T, PbfError>;

/// fileformat.proto `BlobHeader`
pub struct BlobHeader {
    pub blob_type: String,
    pub datasize: i32,
}

pub fn blob_header(buf: &[u8]) -> Result<BlobHeader> {
    let mut blob_type = None;
    let mut datasize = None;
    let mut r = Reader::new(buf);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => blob_type = Some(utf8(value.bytes()?)?),
            3 => datasize = Some(value.varint()? as i32),
            _ => {}
        }
    }
    match (blob_type, datasize) {
        (Some(blob_type), Some(datasize)) => Ok(BlobHeader {
            blob_type,
            datasize,
        }),
        _ => Err(PbfError::Malformed("blob header missing type or datasize")),
    }
}

/// fileformat.proto `Blob`; payload variants are borrowed from the frame
/// buffer.
pub struct Blob<'a> {
    pub raw: Option<&'a [u8]>,
    pub zlib_data: Option<&'a [u8]>,
    pub lzma: bool,
    pub raw_size: Option<usize>,
}

pub fn blob(buf: &[u8]) -> Result<Blob<'_>> {
    let mut out = Blob {
        raw: None,
        zlib_data: None,
        lzma: false,
        raw_size: None,
    };
    let mut r = Reader::new(buf);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => out.raw = Some(value.bytes()?),
            2 => out.raw_size = Some(value.varint()? as usize),
            3 => out.zlib_data = Some(value.bytes()?),
            4 => out.lzma = true,
            _ => {}
        }
    }
    Ok(out)
}

/// osmformat.proto `HeaderBlock`, feature lists only.
pub struct HeaderBlock {
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
}

pub fn header_block(buf: &[u8]) -> Result<HeaderBlock> {
    let mut out = HeaderBlock {
        required_features: Vec::new(),
        optional_features: Vec::new(),
    };
    let mut r = Reader::new(buf);
    while let Some((field, value)) = r.next_field()? {
        match field {
            4 => out.required_features.push(utf8(value.bytes()?)?),
            5 => out.optional_features.push(utf8(value.bytes()?)?),
            _ => {}
        }
    }
    Ok(out)
}

/// Granularity parameters of one primitive block; raw coordinate units
/// are nanodegrees scaled by these.
struct BlockParams {
    granularity: i64,
    lat_offset: i64,
    lon_offset: i64,
}

impl BlockParams {
    fn degrees(&self, raw: i64, offset: i64) -> f64 {
        1e-9 * (offset + self.granularity * raw) as f64
    }

    fn position(&self, lat: i64, lon: i64) -> SphereCoords {
        SphereCoords::new(
            self.degrees(lat, self.lat_offset),
            self.degrees(lon, self.lon_offset),
        )
    }
}

/// Decode an osmformat.proto `PrimitiveBlock` into plain node, way, and
/// relation records.
pub fn primitive_block(buf: &[u8]) -> Result<BlockData> {
    let mut strings: Vec<String> = Vec::new();
    let mut groups: Vec<&[u8]> = Vec::new();
    let mut params = BlockParams {
        granularity: 100,
        lat_offset: 0,
        lon_offset: 0,
    };

    let mut r = Reader::new(buf);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => string_table(value.bytes()?, &mut strings)?,
            2 => groups.push(value.bytes()?),
            17 => params.granularity = value.varint()? as i64,
            19 => params.lat_offset = value.varint()? as i64,
            20 => params.lon_offset = value.varint()? as i64,
            _ => {}
        }
    }

    let mut block = BlockData::default();
    for group in groups {
        primitive_group(group, &strings, &params, &mut block)?;
    }
    Ok(block)
}

fn string_table(buf: &[u8], strings: &mut Vec<String>) -> Result<()> {
    let mut r = Reader::new(buf);
    while let Some((field, value)) = r.next_field()? {
        if field == 1 {
            strings.push(utf8(value.bytes()?)?);
        }
    }
    Ok(())
}

fn primitive_group(
    buf: &[u8],
    strings: &[String],
    params: &BlockParams,
    block: &mut BlockData,
) -> Result<()> {
    let mut r = Reader::new(buf);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => plain_node(value.bytes()?, params, block)?,
            2 => dense_nodes(value.bytes()?, params, block)?,
            3 => way(value.bytes()?, strings, block)?,
            4 => relation(value.bytes()?, strings, block)?,
            _ => {}
        }
    }
    Ok(())
}

fn plain_node(buf: &[u8], params: &BlockParams, block: &mut BlockData) -> Result<()> {
    let mut id = 0;
    let mut lat = 0;
    let mut lon = 0;
    let mut r = Reader::new(buf);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => id = wire::zigzag(value.varint()?),
            8 => lat = wire::zigzag(value.varint()?),
            9 => lon = wire::zigzag(value.varint()?),
            _ => {}
        }
    }
    block.nodes.push(MapNode {
        id,
        pos: params.position(lat, lon),
    });
    Ok(())
}

/// `DenseNodes`: parallel arrays of delta-coded ids and coordinates.
fn dense_nodes(buf: &[u8], params: &BlockParams, block: &mut BlockData) -> Result<()> {
    let mut ids = Vec::new();
    let mut lats = Vec::new();
    let mut lons = Vec::new();
    let mut r = Reader::new(buf);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => wire::packed_sint64(value.bytes()?, &mut ids)?,
            8 => wire::packed_sint64(value.bytes()?, &mut lats)?,
            9 => wire::packed_sint64(value.bytes()?, &mut lons)?,
            _ => {}
        }
    }
    if ids.len() != lats.len() || ids.len() != lons.len() {
        return Err(PbfError::DeltaMismatch("dense node arrays"));
    }
    block.nodes.reserve(ids.len());
    let (mut id, mut lat, mut lon) = (0i64, 0i64, 0i64);
    for i in 0..ids.len() {
        id += ids[i];
        lat += lats[i];
        lon += lons[i];
        block.nodes.push(MapNode {
            id,
            pos: params.position(lat, lon),
        });
    }
    Ok(())
}

fn way(buf: &[u8], strings: &[String], block: &mut BlockData) -> Result<()> {
    let mut id = 0i64;
    let mut keys = Vec::new();
    let mut vals = Vec::new();
    let mut deltas = Vec::new();
    let mut r = Reader::new(buf);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => id = value.varint()? as i64,
            2 => wire::packed_varints(value.bytes()?, &mut keys)?,
            3 => wire::packed_varints(value.bytes()?, &mut vals)?,
            8 => wire::packed_sint64(value.bytes()?, &mut deltas)?,
            _ => {}
        }
    }
    let mut refs = Vec::with_capacity(deltas.len());
    let mut r = 0i64;
    for d in deltas {
        r += d;
        refs.push(r);
    }
    block.ways.push(MapWay {
        id,
        refs,
        attrs: attrs(&keys, &vals, strings)?,
    });
    Ok(())
}

fn relation(buf: &[u8], strings: &[String], block: &mut BlockData) -> Result<()> {
    let mut id = 0i64;
    let mut keys = Vec::new();
    let mut vals = Vec::new();
    let mut roles = Vec::new();
    let mut memid_deltas = Vec::new();
    let mut types = Vec::new();
    let mut r = Reader::new(buf);
    while let Some((field, value)) = r.next_field()? {
        match field {
            1 => id = value.varint()? as i64,
            2 => wire::packed_varints(value.bytes()?, &mut keys)?,
            3 => wire::packed_varints(value.bytes()?, &mut vals)?,
            8 => wire::packed_varints(value.bytes()?, &mut roles)?,
            9 => wire::packed_sint64(value.bytes()?, &mut memid_deltas)?,
            10 => wire::packed_varints(value.bytes()?, &mut types)?,
            _ => {}
        }
    }
    if roles.len() != memid_deltas.len() || roles.len() != types.len() {
        return Err(PbfError::DeltaMismatch("relation member arrays"));
    }
    let mut members = Vec::with_capacity(roles.len());
    let mut memid = 0i64;
    for i in 0..roles.len() {
        memid += memid_deltas[i];
        members.push(Member {
            id: memid,
            role: lookup(strings, roles[i])?.clone(),
            kind: member_kind(types[i])?,
        });
    }
    block.relations.push(MapRelation {
        id,
        members,
        attrs: attrs(&keys, &vals, strings)?,
    });
    Ok(())
}

fn member_kind(raw: u64) -> Result<MemberKind> {
    match raw {
        0 => Ok(MemberKind::Node),
        1 => Ok(MemberKind::Way),
        2 => Ok(MemberKind::Relation),
        _ => Err(PbfError::Malformed("unknown relation member type")),
    }
}

fn attrs(keys: &[u64], vals: &[u64], strings: &[String]) -> Result<Vec<Attr>> {
    if keys.len() != vals.len() {
        return Err(PbfError::DeltaMismatch("tag key/value arrays"));
    }
    keys.iter()
        .zip(vals)
        .map(|(&k, &v)| {
            Ok(Attr {
                key: lookup(strings, k)?.clone(),
                value: lookup(strings, v)?.clone(),
            })
        })
        .collect()
}

fn lookup(strings: &[String], index: u64) -> Result<&String> {
    strings
        .get(index as usize)
        .ok_or(PbfError::BadStringRef(index as usize))
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| PbfError::Utf8)
}
