//! Hand-rolled PBF encoding helpers for decoder tests: enough of the
//! wire format to frame blobs and build synthetic primitive blocks with
//! delta-coded fields.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

pub fn put_tag(buf: &mut Vec<u8>, field: u32, wire: u32) {
    put_varint(buf, ((field as u64) << 3) | wire as u64);
}

pub fn put_varint_field(buf: &mut Vec<u8>, field: u32, v: u64) {
    put_tag(buf, field, 0);
    put_varint(buf, v);
}

pub fn put_bytes_field(buf: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    put_tag(buf, field, 2);
    put_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn put_packed_sint64(buf: &mut Vec<u8>, field: u32, vals: &[i64]) {
    let mut payload = Vec::new();
    for &v in vals {
        put_varint(&mut payload, zigzag_encode(v));
    }
    put_bytes_field(buf, field, &payload);
}

fn put_packed_varints(buf: &mut Vec<u8>, field: u32, vals: &[u64]) {
    let mut payload = Vec::new();
    for &v in vals {
        put_varint(&mut payload, v);
    }
    put_bytes_field(buf, field, &payload);
}

fn deltas(vals: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(vals.len());
    let mut prev = 0;
    for &v in vals {
        out.push(v - prev);
        prev = v;
    }
    out
}

fn nano(deg: f64) -> i64 {
    // granularity 100, offsets 0: raw units are 100 nanodegrees
    (deg * 1e7).round() as i64
}

/// A `DenseNodes` group from `(id, lat, lon)` tuples.
pub fn group_dense(nodes: &[(i64, f64, f64)]) -> Vec<u8> {
    let mut group = Vec::new();
    put_bytes_field(&mut group, 2, &dense_message(nodes, false));
    group
}

/// Same, but with the lat array one element short.
pub fn group_dense_mismatched(nodes: &[(i64, f64, f64)]) -> Vec<u8> {
    let mut group = Vec::new();
    put_bytes_field(&mut group, 2, &dense_message(nodes, true));
    group
}

fn dense_message(nodes: &[(i64, f64, f64)], drop_one_lat: bool) -> Vec<u8> {
    let ids: Vec<i64> = nodes.iter().map(|n| n.0).collect();
    let mut lats: Vec<i64> = nodes.iter().map(|n| nano(n.1)).collect();
    let lons: Vec<i64> = nodes.iter().map(|n| nano(n.2)).collect();
    if drop_one_lat {
        lats.pop();
    }
    let mut msg = Vec::new();
    put_packed_sint64(&mut msg, 1, &deltas(&ids));
    put_packed_sint64(&mut msg, 8, &deltas(&lats));
    put_packed_sint64(&mut msg, 9, &deltas(&lons));
    msg
}

/// A `Way` message; tags are string-table indexes.
pub fn way(id: i64, tags: &[(u64, u64)], refs: &[i64]) -> Vec<u8> {
    let mut msg = Vec::new();
    put_varint_field(&mut msg, 1, id as u64);
    let keys: Vec<u64> = tags.iter().map(|t| t.0).collect();
    let vals: Vec<u64> = tags.iter().map(|t| t.1).collect();
    if !tags.is_empty() {
        put_packed_varints(&mut msg, 2, &keys);
        put_packed_varints(&mut msg, 3, &vals);
    }
    put_packed_sint64(&mut msg, 8, &deltas(refs));
    msg
}

/// A `Relation` message; members are `(role index, member id, type)`.
pub fn relation(id: i64, tags: &[(u64, u64)], members: &[(u64, i64, u64)]) -> Vec<u8> {
    let mut msg = Vec::new();
    put_varint_field(&mut msg, 1, id as u64);
    let keys: Vec<u64> = tags.iter().map(|t| t.0).collect();
    let vals: Vec<u64> = tags.iter().map(|t| t.1).collect();
    if !tags.is_empty() {
        put_packed_varints(&mut msg, 2, &keys);
        put_packed_varints(&mut msg, 3, &vals);
    }
    let roles: Vec<u64> = members.iter().map(|m| m.0).collect();
    let memids: Vec<i64> = members.iter().map(|m| m.1).collect();
    let types: Vec<u64> = members.iter().map(|m| m.2).collect();
    put_packed_varints(&mut msg, 8, &roles);
    put_packed_sint64(&mut msg, 9, &deltas(&memids));
    put_packed_varints(&mut msg, 10, &types);
    msg
}

/// A `PrimitiveGroup` holding serialized ways and relations.
pub fn group_ways(ways: Vec<Vec<u8>>, relations: Vec<Vec<u8>>) -> Vec<u8> {
    let mut group = Vec::new();
    for w in ways {
        put_bytes_field(&mut group, 3, &w);
    }
    for r in relations {
        put_bytes_field(&mut group, 4, &r);
    }
    group
}

/// A `PrimitiveBlock` with the default granularity.
pub fn primitive_block(strings: &[&str], groups: Vec<Vec<u8>>) -> Vec<u8> {
    let mut table = Vec::new();
    for s in strings {
        put_bytes_field(&mut table, 1, s.as_bytes());
    }
    let mut block = Vec::new();
    put_bytes_field(&mut block, 1, &table);
    for g in groups {
        put_bytes_field(&mut block, 2, &g);
    }
    block
}

/// Wrap serialized block bytes in a zlib-compressed `Blob`.
pub fn blob_zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    let compressed = enc.finish().unwrap();
    let mut blob = Vec::new();
    put_varint_field(&mut blob, 2, data.len() as u64);
    put_bytes_field(&mut blob, 3, &compressed);
    blob
}

/// Wrap serialized block bytes in an uncompressed `Blob`.
pub fn blob_raw(data: &[u8]) -> Vec<u8> {
    let mut blob = Vec::new();
    put_bytes_field(&mut blob, 1, data);
    put_varint_field(&mut blob, 2, data.len() as u64);
    blob
}

/// A `Blob` carrying the unsupported LZMA encoding.
pub fn blob_lzma(data: &[u8]) -> Vec<u8> {
    let mut blob = Vec::new();
    put_varint_field(&mut blob, 2, data.len() as u64);
    put_bytes_field(&mut blob, 4, data);
    blob
}

/// An `OSMHeader` blob declaring the given required features.
pub fn header_blob(required: &[&str]) -> Vec<u8> {
    let mut header = Vec::new();
    for f in required {
        put_bytes_field(&mut header, 4, f.as_bytes());
    }
    blob_raw(&header)
}

/// Frame one blob with an explicit declared datasize.
pub fn frame_with_datasize(out: &mut Vec<u8>, blob_type: &str, blob: &[u8], datasize: i64) {
    let mut header = Vec::new();
    put_bytes_field(&mut header, 1, blob_type.as_bytes());
    put_tag(&mut header, 3, 0);
    put_varint(&mut header, datasize as u64);
    out.extend_from_slice(&(header.len() as i32).to_be_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(blob);
}

pub fn frame(out: &mut Vec<u8>, blob_type: &str, blob: &[u8]) {
    frame_with_datasize(out, blob_type, blob, blob.len() as i64);
}

/// Assemble a complete framed stream.
pub fn file(blobs: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
    let mut out = Vec::new();
    for (blob_type, blob) in blobs {
        frame(&mut out, blob_type, &blob);
    }
    out
}
