//! Streaming OSM PBF decoder.
//!
//! The stream is framed as `[4-byte big-endian header length][BlobHeader]
//! [Blob of the declared datasize]`. One reader thread parses frames
//! sequentially, decodes the `OSMHeader` block inline, and distributes
//! raw `OSMData` payloads over a bounded channel to a fixed pool of
//! decode workers. Each worker decompresses, deserializes, and
//! delta-decodes its blob into a [`BlockData`] pushed to a result
//! channel, then emits a sentinel at shutdown. The caller's thread
//! aggregates results in arbitrary order (blocks are keyed by stable
//! element ids) and invokes the per-block callback; it exits after one
//! sentinel per worker.

pub mod proto;
pub mod wire;

#[cfg(test)]
pub(crate) mod testenc;

use byteorder::{BigEndian, ByteOrder};
use crossbeam_channel::bounded;
use flate2::read::ZlibDecoder;
use std::io::Read;
use thiserror::Error;

use crate::geo::SphereCoords;

#[derive(Debug, Error)]
pub enum PbfError {
    #[error("i/o error reading stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("short read: got {got} of {want} bytes")]
    ShortRead { got: usize, want: usize },
    #[error("truncated protobuf message")]
    Truncated,
    #[error("unsupported wire type {0}")]
    WireType(u32),
    #[error("malformed message: {0}")]
    Malformed(&'static str),
    #[error("zero-length blob")]
    EmptyBlob,
    #[error("unsupported blob encoding: {0}")]
    UnsupportedEncoding(&'static str),
    #[error("unsupported required feature {0:?}")]
    RequiredFeature(String),
    #[error("mismatched parallel arrays: {0}")]
    DeltaMismatch(&'static str),
    #[error("string table index {0} out of range")]
    BadStringRef(usize),
    #[error("invalid utf-8 in string table")]
    Utf8,
}

impl PbfError {
    /// Whether a worker-side decode failure aborts the whole run. Framing
    /// errors on the reader thread are always fatal and never consult
    /// this.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PbfError::Io(_)
                | PbfError::ShortRead { .. }
                | PbfError::EmptyBlob
                | PbfError::UnsupportedEncoding(_)
                | PbfError::RequiredFeature(_)
                | PbfError::DeltaMismatch(_)
        )
    }
}

/// A decoded map node with its original sparse id.
#[derive(Debug, Clone, Copy)]
pub struct MapNode {
    pub id: i64,
    pub pos: SphereCoords,
}

/// A resolved tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub key: String,
    pub value: String,
}

/// A decoded way: ordered node references plus resolved tags.
#[derive(Debug, Clone)]
pub struct MapWay {
    pub id: i64,
    pub refs: Vec<i64>,
    pub attrs: Vec<Attr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id: i64,
    pub role: String,
    pub kind: MemberKind,
}

#[derive(Debug, Clone)]
pub struct MapRelation {
    pub id: i64,
    pub members: Vec<Member>,
    pub attrs: Vec<Attr>,
}

/// One decoded primitive block.
#[derive(Debug, Default)]
pub struct BlockData {
    pub nodes: Vec<MapNode>,
    pub ways: Vec<MapWay>,
    pub relations: Vec<MapRelation>,
}

enum Decoded {
    Block(BlockData),
    Failed(PbfError),
    Done,
}

/// Streaming decoder with a fixed worker pool.
pub struct Decoder {
    workers: usize,
}

impl Default for Decoder {
    fn default() -> Decoder {
        Decoder::new()
    }
}

impl Decoder {
    /// One worker per CPU minus one: the reader thread keeps a core busy.
    pub fn new() -> Decoder {
        Decoder::with_workers(num_cpus::get().saturating_sub(1))
    }

    pub fn with_workers(workers: usize) -> Decoder {
        Decoder {
            workers: workers.max(1),
        }
    }

    /// Decode the whole stream, invoking `block_fn` once per decoded
    /// block in arbitrary order. A malformed block is logged and
    /// dropped; framing, compression, schema-feature, and
    /// parallel-array errors abort with `Err`.
    pub fn read_map<R, F>(&self, input: R, mut block_fn: F) -> Result<(), PbfError>
    where
        R: Read + Send,
        F: FnMut(&BlockData),
    {
        let workers = self.workers;
        std::thread::scope(|scope| {
            let (work_tx, work_rx) = bounded::<Vec<u8>>(workers * 2);
            let (out_tx, out_rx) = bounded::<Decoded>(workers * 2);

            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let out_tx = out_tx.clone();
                scope.spawn(move || {
                    for payload in work_rx.iter() {
                        let msg = match decode_data_blob(&payload) {
                            Ok(block) => Decoded::Block(block),
                            Err(e) => Decoded::Failed(e),
                        };
                        if out_tx.send(msg).is_err() {
                            return;
                        }
                    }
                    let _ = out_tx.send(Decoded::Done);
                });
            }
            drop(work_rx);
            drop(out_tx);

            let reader = scope.spawn(move || read_stream(input, work_tx));

            let mut fatal: Option<PbfError> = None;
            let mut done = 0;
            let mut blocks = 0u64;
            while done < workers {
                match out_rx.recv() {
                    Ok(Decoded::Block(block)) => {
                        blocks += 1;
                        if fatal.is_none() {
                            block_fn(&block);
                        }
                    }
                    Ok(Decoded::Failed(e)) if e.is_fatal() => {
                        // Keep draining so the pool shuts down cleanly.
                        fatal.get_or_insert(e);
                    }
                    Ok(Decoded::Failed(e)) => {
                        log::warn!("dropping undecodable block: {e}");
                    }
                    Ok(Decoded::Done) => done += 1,
                    Err(_) => break,
                }
            }

            let read = match reader.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            if let Some(e) = fatal {
                return Err(e);
            }
            let nread = read?;
            log::info!("finished reading {nread} bytes, {blocks} data blocks");
            Ok(())
        })
    }
}

/// Reader loop: parse frames, validate the header block, hand data blobs
/// to the pool. Returns the total bytes consumed.
fn read_stream<R: Read>(
    mut input: R,
    work_tx: crossbeam_channel::Sender<Vec<u8>>,
) -> Result<u64, PbfError> {
    let mut nread: u64 = 0;
    while let Some(hsize) = read_frame_len(&mut input)? {
        nread += 4;
        if hsize <= 0 {
            return Err(PbfError::Malformed("nonpositive blob header length"));
        }
        let header_buf = read_exactly(&mut input, hsize as usize)?;
        nread += hsize as u64;

        let header = proto::blob_header(&header_buf)?;
        if header.datasize <= 0 {
            return Err(PbfError::EmptyBlob);
        }
        let payload = read_exactly(&mut input, header.datasize as usize)?;
        nread += header.datasize as u64;
        log::debug!("read blob {} size {}", header.blob_type, header.datasize);

        match header.blob_type.as_str() {
            "OSMHeader" => check_header(&payload)?,
            "OSMData" => {
                if work_tx.send(payload).is_err() {
                    // Aggregator has gone away; stop reading.
                    break;
                }
            }
            other => log::debug!("skipping blob type {other}"),
        }
    }
    Ok(nread)
}

/// Read the next frame's 4-byte length, or `None` on a clean end of
/// stream. EOF inside the length word is a short read.
fn read_frame_len<R: Read>(input: &mut R) -> Result<Option<i32>, PbfError> {
    let mut buf = [0u8; 4];
    let mut got = 0;
    while got < 4 {
        let n = input.read(&mut buf[got..])?;
        if n == 0 {
            if got == 0 {
                return Ok(None);
            }
            return Err(PbfError::ShortRead { got, want: 4 });
        }
        got += n;
    }
    Ok(Some(BigEndian::read_i32(&buf)))
}

fn read_exactly<R: Read>(input: &mut R, want: usize) -> Result<Vec<u8>, PbfError> {
    let mut buf = vec![0u8; want];
    let mut got = 0;
    while got < want {
        let n = input.read(&mut buf[got..])?;
        if n == 0 {
            return Err(PbfError::ShortRead { got, want });
        }
        got += n;
    }
    Ok(buf)
}

/// The only schema features this decoder understands.
const SUPPORTED_FEATURES: [&str; 2] = ["OsmSchema-V0.6", "DenseNodes"];

fn check_header(payload: &[u8]) -> Result<(), PbfError> {
    let data = inflate(payload)?;
    let header = proto::header_block(&data)?;
    for feature in &header.required_features {
        if !SUPPORTED_FEATURES.contains(&feature.as_str()) {
            return Err(PbfError::RequiredFeature(feature.clone()));
        }
    }
    Ok(())
}

fn decode_data_blob(payload: &[u8]) -> Result<BlockData, PbfError> {
    let data = inflate(payload)?;
    proto::primitive_block(&data)
}

/// Extract a blob's payload, inflating zlib if needed. The alternate
/// LZMA encoding is unsupported and fatal.
fn inflate(payload: &[u8]) -> Result<Vec<u8>, PbfError> {
    let blob = proto::blob(payload)?;
    if blob.lzma {
        return Err(PbfError::UnsupportedEncoding("lzma"));
    }
    if let Some(raw) = blob.raw {
        return Ok(raw.to_vec());
    }
    let Some(zlib) = blob.zlib_data else {
        return Err(PbfError::UnsupportedEncoding("unknown"));
    };
    let mut out = Vec::with_capacity(blob.raw_size.unwrap_or(0));
    ZlibDecoder::new(zlib)
        .read_to_end(&mut out)
        .map_err(|_| PbfError::Malformed("bad zlib stream"))?;
    if let Some(want) = blob.raw_size {
        if out.len() != want {
            return Err(PbfError::ShortRead {
                got: out.len(),
                want,
            });
        }
    }
    Ok(out)
}
