//! Binary .rsvw snapshot format for a layout's constraints and weights.
//!
//! Chunks and connection chunks are not stored; they are re-derived on load.
//!
//! Header (16 bytes):
//!   [0..4]   Magic: "RSVW"
//!   [4..6]   Version: u16 (LE)
//!   [6..8]   Flags: u16 (LE)
//!   [8..12]  Block count: u32 (LE)
//!   [12..16] CRC32 of body
//!
//! Body:
//!   ConstraintSet (schema order, u64 each)
//!   Per block in `Block::ALL` order:
//!     rows u32, cols u32, col_ptr[cols + 1] u32, nnz u32,
//!     row_idx[nnz] u32, values[nnz] f32

use std::io::{self, Read};
use std::path::Path;

use crate::config::ConstraintSet;
use crate::mask::Mask;
use crate::network::NetworkLayout;
use crate::population::{Block, BlockSet};
use crate::weights::WeightMatrix;

const MAGIC: &[u8; 4] = b"RSVW";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 16;

fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// A body that ends early is corrupt data, not an I/O failure.
fn truncated(e: io::Error) -> io::Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        invalid("truncated body")
    } else {
        e
    }
}

// ---- Write primitives ----

fn write_u32(w: &mut Vec<u8>, val: u32) {
    w.extend_from_slice(&val.to_le_bytes());
}

fn write_u64(w: &mut Vec<u8>, val: u64) {
    w.extend_from_slice(&val.to_le_bytes());
}

fn write_f32(w: &mut Vec<u8>, val: f32) {
    w.extend_from_slice(&val.to_le_bytes());
}

fn write_len(w: &mut Vec<u8>, val: usize) -> io::Result<()> {
    let v = u32::try_from(val).map_err(|_| invalid(format!("{val} does not fit in u32")))?;
    write_u32(w, v);
    Ok(())
}

// ---- Read primitives ----

fn read_u32(r: &mut &[u8]) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut &[u8]) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f32(r: &mut &[u8]) -> io::Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

/// Read a length and check the remaining body can hold `len * item_size` bytes.
fn read_len(r: &mut &[u8], item_size: usize) -> io::Result<usize> {
    let len = read_u32(r)? as usize;
    if len.saturating_mul(item_size) > r.len() {
        return Err(invalid(format!("length {len} overruns body")));
    }
    Ok(len)
}

// ---- Serialization ----

fn serialize_constraints(w: &mut Vec<u8>, c: &ConstraintSet) {
    for (_, value) in c.schema() {
        write_u64(w, value as u64);
    }
}

fn deserialize_constraints(r: &mut &[u8]) -> io::Result<ConstraintSet> {
    let mut vals = [0usize; ConstraintSet::FIELD_COUNT];
    for v in vals.iter_mut() {
        *v = usize::try_from(read_u64(r)?).map_err(|_| invalid("constraint value overflows usize"))?;
    }
    Ok(ConstraintSet {
        num_chips: vals[0],
        num_cores_per_chip: vals[1],
        neurons_per_core: vals[2],
        reservoir_ex_size: vals[3],
        reservoir_in_size: vals[4],
        num_connections_per_neuron: vals[5],
        cue_patch_neurons: vals[6],
        max_synapses_per_core: vals[7],
    })
}

fn serialize_block(w: &mut Vec<u8>, weights: &WeightMatrix) -> io::Result<()> {
    let mask = weights.mask();
    write_len(w, mask.rows())?;
    write_len(w, mask.cols())?;
    for &ptr in mask.col_ptr() {
        write_len(w, ptr)?;
    }
    write_len(w, mask.nnz())?;
    for &r in mask.row_indices() {
        write_u32(w, r);
    }
    for &v in weights.values() {
        write_f32(w, v);
    }
    Ok(())
}

fn deserialize_block(r: &mut &[u8], block: Block) -> io::Result<WeightMatrix> {
    let rows = read_u32(r)? as usize;
    let cols = read_u32(r)? as usize;
    if cols.saturating_add(1).saturating_mul(4) > r.len() {
        return Err(invalid(format!("{block}: {cols} columns overrun body")));
    }
    let mut col_ptr = Vec::with_capacity(cols + 1);
    for _ in 0..=cols {
        col_ptr.push(read_u32(r)? as usize);
    }
    let nnz = read_len(r, 8)?;
    let mut row_idx = Vec::with_capacity(nnz);
    for _ in 0..nnz {
        row_idx.push(read_u32(r)?);
    }
    let mut values = Vec::with_capacity(nnz);
    for _ in 0..nnz {
        values.push(read_f32(r)?);
    }

    let mask = Mask::from_raw_parts(rows, cols, col_ptr, row_idx)
        .map_err(|e| invalid(format!("{block} mask: {e}")))?;
    WeightMatrix::from_parts(mask, values).map_err(|e| invalid(format!("{block} weights: {e}")))
}

/// Encode constraints and weights into a snapshot.
pub fn encode(constraints: &ConstraintSet, weights: &BlockSet<WeightMatrix>) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    serialize_constraints(&mut body, constraints);
    for (_, w) in weights.iter() {
        serialize_block(&mut body, w)?;
    }

    let checksum = crc32(&body);

    let mut data = Vec::with_capacity(HEADER_LEN + body.len());
    data.extend_from_slice(MAGIC);
    data.extend_from_slice(&VERSION.to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes()); // flags
    data.extend_from_slice(&(Block::ALL.len() as u32).to_le_bytes());
    data.extend_from_slice(&checksum.to_le_bytes());
    data.extend_from_slice(&body);
    Ok(data)
}

/// Decode a snapshot produced by [`encode`].
pub fn decode(data: &[u8]) -> io::Result<(ConstraintSet, BlockSet<WeightMatrix>)> {
    if data.len() < HEADER_LEN {
        return Err(invalid("file too small"));
    }
    if &data[0..4] != MAGIC {
        return Err(invalid("bad magic"));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != VERSION {
        return Err(invalid(format!("unsupported version: {version}")));
    }
    let _flags = u16::from_le_bytes([data[6], data[7]]);
    let n_blocks = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    if n_blocks as usize != Block::ALL.len() {
        return Err(invalid(format!("expected {} blocks, header says {n_blocks}", Block::ALL.len())));
    }
    let expected_crc = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);

    let body = &data[HEADER_LEN..];
    let actual_crc = crc32(body);
    if actual_crc != expected_crc {
        return Err(invalid(format!("CRC mismatch: expected {expected_crc:08X}, got {actual_crc:08X}")));
    }

    let mut r: &[u8] = body;
    let constraints = deserialize_constraints(&mut r).map_err(truncated)?;
    let weights = BlockSet::try_from_fn(|block| deserialize_block(&mut r, block)).map_err(truncated)?;
    if !r.is_empty() {
        return Err(invalid(format!("{} trailing bytes", r.len())));
    }
    Ok((constraints, weights))
}

impl NetworkLayout {
    /// Save constraints and weights to a binary .rsvw file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let data = encode(self.constraints(), self.weight_set())?;
        std::fs::write(path, data)
    }

    /// Load a .rsvw file and re-derive chunks and connection chunks.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = std::fs::read(path)?;
        let (constraints, weights) = decode(&data)?;
        NetworkLayout::from_weights(constraints, weights).map_err(|e| invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::build;

    fn constraints() -> ConstraintSet {
        ConstraintSet {
            num_chips: 1,
            num_cores_per_chip: 4,
            neurons_per_core: 32,
            reservoir_ex_size: 64,
            reservoir_in_size: 16,
            num_connections_per_neuron: 8,
            cue_patch_neurons: 4,
            max_synapses_per_core: 64,
        }
    }

    #[test]
    fn round_trip_in_memory() {
        let layout = build(&constraints(), 42).unwrap();
        let data = encode(layout.constraints(), layout.weight_set()).unwrap();
        let (c, w) = decode(&data).unwrap();
        assert_eq!(&c, layout.constraints());
        assert_eq!(&w, layout.weight_set());
    }

    #[test]
    fn round_trip_file_rebuilds_chunks() {
        let layout = build(&constraints(), 7).unwrap();
        let path = std::env::temp_dir().join("reservoir_chunks_test_round_trip.rsvw");

        layout.save(&path).expect("save failed");
        let loaded = NetworkLayout::load(&path).expect("load failed");

        assert_eq!(loaded.weight_set(), layout.weight_set());
        assert_eq!(loaded.ex_chunks(), layout.ex_chunks());
        assert_eq!(loaded.in_chunks(), layout.in_chunks());
        assert_eq!(loaded.connection_chunks(), layout.connection_chunks());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn corrupted_body_detected() {
        let layout = build(&constraints(), 42).unwrap();
        let mut data = encode(layout.constraints(), layout.weight_set()).unwrap();
        data[HEADER_LEN + 4] ^= 0xFF;
        let err = decode(&data).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("CRC"));
    }

    #[test]
    fn bad_header_rejected() {
        let layout = build(&constraints(), 42).unwrap();
        let data = encode(layout.constraints(), layout.weight_set()).unwrap();

        let mut bad_magic = data.clone();
        bad_magic[0] = b'X';
        assert!(decode(&bad_magic).unwrap_err().to_string().contains("magic"));

        let mut bad_version = data.clone();
        bad_version[4] = 9;
        assert!(decode(&bad_version).unwrap_err().to_string().contains("version"));

        assert!(decode(&data[..10]).is_err());
    }

    /// Keep the first `body_len` body bytes and fix up the CRC, so only the
    /// length handling can reject the result.
    fn cut_body(data: &[u8], body_len: usize) -> Vec<u8> {
        let body = &data[HEADER_LEN..HEADER_LEN + body_len];
        let mut out = data[..HEADER_LEN].to_vec();
        out[12..16].copy_from_slice(&crc32(body).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn truncated_body_rejected() {
        let layout = build(&constraints(), 42).unwrap();
        let data = encode(layout.constraints(), layout.weight_set()).unwrap();
        let body_len = data.len() - HEADER_LEN;
        let constraints_len = ConstraintSet::FIELD_COUNT * 8;

        // Inside the constraint set, inside the first block's shape, inside
        // its col_ptr, one short of its col_ptr, inside the last values
        let cuts = [
            10,
            constraints_len + 6,
            constraints_len + 8 + 4,
            constraints_len + 8 + 64 * 4,
            body_len - 12,
        ];
        for cut in cuts {
            let err = decode(&cut_body(&data, cut)).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidData, "cut at {cut}: {err}");
        }
    }
}
