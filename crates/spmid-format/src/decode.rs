use crate::note::{Note, Track};

/// Magic bytes expected at the start of an SPMID container.
pub const MAGIC: &[u8; 4] = b"SPMD";

/// Minimum number of tracks a well-formed container must declare
/// (track 0 = reference, track 1 = replay).
const MIN_TRACK_COUNT: u32 = 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("bad magic bytes: expected {expected:?}, got {actual:?}")]
    BadMagic { expected: [u8; 4], actual: [u8; 4] },
    #[error("unexpected end of input at byte offset {0}")]
    UnexpectedEof(usize),
    #[error("track count too low: container declares {0}, minimum is {MIN_TRACK_COUNT}")]
    TrackCountTooLow(u32),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// A small forward-only byte cursor over the container buffer.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::UnexpectedEof(self.pos))?;
        if end > self.data.len() {
            return Err(DecodeError::UnexpectedEof(self.pos));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
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

/// Decode a full SPMID container into its ordered list of tracks.
///
/// Deterministic except for the fresh UUID assigned to each note.
pub fn decode(data: &[u8]) -> Result<Vec<Track>> {
    let mut cursor = Cursor::new(data);

    let magic = cursor.take(4)?;
    if magic != MAGIC.as_slice() {
        let mut actual = [0u8; 4];
        actual.copy_from_slice(magic);
        return Err(DecodeError::BadMagic { expected: *MAGIC, actual });
    }

    let track_count = cursor.read_u32()?;
    if track_count < MIN_TRACK_COUNT {
        return Err(DecodeError::TrackCountTooLow(track_count));
    }

    let mut tracks = Vec::with_capacity(track_count as usize);
    for _ in 0..track_count {
        let note_count = cursor.read_u32()?;
        let mut notes = Vec::with_capacity(note_count as usize);
        for _ in 0..note_count {
            let offset = cursor.read_u32()?;
            let id = cursor.read_u8()?;
            let finger = cursor.read_u8()?;
            let velocity = cursor.read_u16()?;
            let hammers_len = cursor.read_u32()?;
            let after_len = cursor.read_u32()?;
            let hammers = cursor.read_samples(hammers_len)?;
            let after_touch = cursor.read_samples(after_len)?;
            notes.push(Note::from_raw(offset, id, finger, velocity, hammers, after_touch));
        }
        tracks.push(Track { notes });
    }

    Ok(tracks)
}

/// Encode a list of tracks back into the SPMID wire format. Used primarily
/// by tests and by the persistence store's fixture generation; the UUIDs
/// are not part of the wire format and are not round-tripped by this
/// function (the columnar store in `spmid-store` handles UUID-preserving
/// round-trips separately).
pub fn encode(tracks: &[Track]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(tracks.len() as u32).to_le_bytes());
    for track in tracks {
        out.extend_from_slice(&(track.notes.len() as u32).to_le_bytes());
        for note in &track.notes {
            out.extend_from_slice(&note.offset.to_le_bytes());
            out.push(note.id);
            out.push(note.finger);
            out.extend_from_slice(&note.velocity.to_le_bytes());
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

#[cfg(test)]
mod tests {
    use super::*;

    fn single_note_track(offset: u32, id: u8, hammers: Vec<(u32, u16)>, after: Vec<(u32, u16)>) -> Track {
        Track {
            notes: vec![Note::from_raw(offset, id, 1, 80, hammers, after)],
        }
    }

    #[test]
    fn roundtrip_two_tracks() {
        let tracks = vec![
            single_note_track(1000, 60, vec![(0, 200)], vec![(0, 100), (300, 900)]),
            single_note_track(1050, 60, vec![(0, 190)], vec![(0, 110), (290, 880)]),
        ];
        let bytes = encode(&tracks);
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].notes[0].offset, 1000);
        assert_eq!(decoded[0].notes[0].id, 60);
        assert_eq!(decoded[0].notes[0].hammers, vec![(0, 200)]);
        assert_eq!(decoded[1].notes[0].after_touch, vec![(0, 110), (290, 880)]);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encode(&[single_note_track(0, 1, vec![(0, 1)], vec![(0, 1)]), Track::default()]);
        bytes[0] = b'X';
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::BadMagic { .. }));
    }

    #[test]
    fn too_few_tracks_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err, DecodeError::TrackCountTooLow(1));
    }

    #[test]
    fn truncated_input_is_unexpected_eof() {
        let tracks = vec![
            single_note_track(0, 1, vec![(0, 1)], vec![(0, 1)]),
            Track::default(),
        ];
        let mut bytes = encode(&tracks);
        bytes.truncate(bytes.len() - 2);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof(_)));
    }

    #[test]
    fn decode_is_deterministic_except_for_uuid() {
        let tracks = vec![
            single_note_track(0, 1, vec![(0, 1)], vec![(0, 1)]),
            single_note_track(0, 1, vec![(0, 1)], vec![(0, 1)]),
        ];
        let bytes = encode(&tracks);
        let a = decode(&bytes).unwrap();
        let b = decode(&bytes).unwrap();
        assert_eq!(a[0].notes[0].offset, b[0].notes[0].offset);
        assert_eq!(a[0].notes[0].key_on_ms, b[0].notes[0].key_on_ms);
        assert_ne!(a[0].notes[0].uuid, b[0].notes[0].uuid);
    }

    #[test]
    fn empty_track_decodes_to_zero_notes() {
        let bytes = encode(&[Track::default(), Track::default()]);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].is_empty());
        assert!(decoded[1].is_empty());
    }
}
