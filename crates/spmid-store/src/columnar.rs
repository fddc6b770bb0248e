//! Per-record columnar track-data file (§4.8, §6.2).
//!
//! One row per note: `(track_index, note_offset, note_id, finger, velocity,
//! uuid, hammers_ts, hammers_val, after_ts, after_val)`. Array fields are
//! raw little-endian bytes of their fixed-width element types. Unlike the
//! wire-format codec in `spmid_format::decode` (which treats UUIDs as
//! ephemeral decode-time identity), this codec preserves UUIDs bit-exactly
//! so a stored record can be reloaded without losing note identity —
//! grounded on the original's `parquet_utility.py` column layout, which
//! keeps a `uuid` column for the same reason.

use spmid_format::{Note, Track};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"SPST";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColumnarError {
    #[error("bad magic bytes in columnar file")]
    BadMagic,
    #[error("unexpected end of columnar file at byte offset {0}")]
    UnexpectedEof(usize),
    #[error("unsupported columnar file version {0}")]
    UnsupportedVersion(u8),
}

type Result<T> = std::result::Result<T, ColumnarError>;

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(ColumnarError::UnexpectedEof(self.pos))?;
        if end > self.data.len() {
            return Err(ColumnarError::UnexpectedEof(self.pos));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_uuid(&mut self) -> Result<uuid::Uuid> {
        let b = self.take(16)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(b);
        Ok(uuid::Uuid::from_bytes(bytes))
    }

    fn read_samples(&mut self, count: u32) -> Result<Vec<(u32, u16)>> {
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let t_rel = self.read_u32()?;
            let value = self.read_u16()?;
            out.push((t_rel, value));
        }
        Ok(out)
    }
}

/// Encode tracks into the columnar on-disk representation, one row per note.
pub fn encode_tracks(tracks: &[Track]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(1); // version
    out.extend_from_slice(&(tracks.len() as u32).to_le_bytes());
    for (track_index, track) in tracks.iter().enumerate() {
        out.extend_from_slice(&(track_index as u32).to_le_bytes());
        out.extend_from_slice(&(track.notes.len() as u32).to_le_bytes());
        for note in &track.notes {
            out.extend_from_slice(&note.offset.to_le_bytes());
            out.push(note.id);
            out.push(note.finger);
            out.extend_from_slice(&note.velocity.to_le_bytes());
            out.extend_from_slice(note.uuid.as_bytes());
            out.extend_from_slice(&(note.hammers.len() as u32).to_le_bytes());
            out.extend_from_slice(&(note.after_touch.len() as u32).to_le_bytes());
            for &(t_rel, v) in &note.hammers {
                out.extend_from_slice(&t_rel.to_le_bytes());
                out.extend_from_slice(&v.to_le_bytes());
            }
            for &(t_rel, v) in &note.after_touch {
                out.extend_from_slice(&t_rel.to_le_bytes());
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    out
}

/// Decode a columnar file back into tracks, reconstructing Notes bit-exactly
/// including their original UUIDs.
pub fn decode_tracks(data: &[u8]) -> Result<Vec<Track>> {
    let mut cursor = Cursor::new(data);

    let magic = cursor.take(4)?;
    if magic != MAGIC.as_slice() {
        return Err(ColumnarError::BadMagic);
    }
    let version = cursor.read_u8()?;
    if version != 1 {
        return Err(ColumnarError::UnsupportedVersion(version));
    }

    let track_count = cursor.read_u32()?;
    let mut tracks = vec![Track::default(); track_count as usize];
    for _ in 0..track_count {
        let track_index = cursor.read_u32()? as usize;
        let note_count = cursor.read_u32()?;
        let mut notes = Vec::with_capacity(note_count as usize);
        for _ in 0..note_count {
            let offset = cursor.read_u32()?;
            let id = cursor.read_u8()?;
            let finger = cursor.read_u8()?;
            let velocity = cursor.read_u16()?;
            let uuid = cursor.read_uuid()?;
            let hammers_len = cursor.read_u32()?;
            let after_len = cursor.read_u32()?;
            let hammers = cursor.read_samples(hammers_len)?;
            let after_touch = cursor.read_samples(after_len)?;

            let mut note = Note::from_raw(offset, id, finger, velocity, hammers, after_touch);
            note.uuid = uuid;
            notes.push(note);
        }
        if let Some(track) = tracks.get_mut(track_index) {
            track.notes = notes;
        }
    }

    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_track(offset: u32, id: u8) -> Track {
        Track { notes: vec![Note::from_raw(offset, id, 1, 80, vec![(0, 200)], vec![(0, 100), (300, 900)])] }
    }

    #[test]
    fn roundtrip_preserves_uuid_bit_exactly() {
        let tracks = vec![note_track(1000, 60), note_track(1050, 60)];
        let original_uuid = tracks[0].notes[0].uuid;
        let bytes = encode_tracks(&tracks);
        let decoded = decode_tracks(&bytes).unwrap();
        assert_eq!(decoded[0].notes[0].uuid, original_uuid);
        assert_eq!(decoded[0].notes[0].offset, 1000);
        assert_eq!(decoded[1].notes[0].after_touch, vec![(0, 100), (300, 900)]);
    }

    #[test]
    fn roundtrip_preserves_all_note_fields() {
        let tracks = vec![note_track(2000, 61)];
        let bytes = encode_tracks(&tracks);
        let decoded = decode_tracks(&bytes).unwrap();
        let original = &tracks[0].notes[0];
        let restored = &decoded[0].notes[0];
        assert_eq!(original.offset, restored.offset);
        assert_eq!(original.id, restored.id);
        assert_eq!(original.finger, restored.finger);
        assert_eq!(original.velocity, restored.velocity);
        assert_eq!(original.hammers, restored.hammers);
        assert_eq!(original.after_touch, restored.after_touch);
        assert_eq!(original.key_on_ms, restored.key_on_ms);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encode_tracks(&[note_track(0, 1)]);
        bytes[0] = b'X';
        assert_eq!(decode_tracks(&bytes).unwrap_err(), ColumnarError::BadMagic);
    }

    #[test]
    fn truncated_file_is_unexpected_eof() {
        let mut bytes = encode_tracks(&[note_track(0, 1)]);
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(decode_tracks(&bytes).unwrap_err(), ColumnarError::UnexpectedEof(_)));
    }

    #[test]
    fn empty_tracks_roundtrip() {
        let bytes = encode_tracks(&[Track::default(), Track::default()]);
        let decoded = decode_tracks(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].is_empty());
    }
}
