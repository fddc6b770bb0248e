use uuid::Uuid;

/// One hammer-acceleration or after-touch sample: `(t_rel, value)`, `t_rel` in
/// 0.1 ms relative to the owning note's `offset`.
pub type Sample = (u32, u16);

/// One piano-key strike decoded from an SPMID container.
///
/// All raw timing fields are in 0.1 ms, matching the wire format. The
/// `_ms`-suffixed derived fields are computed once at decode time and
/// expressed in whole milliseconds (as `f64`, since they are averages /
/// midpoints downstream).
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Absolute wall time of the strike, 0.1 ms.
    pub offset: u32,
    /// Key identity: 1..=88 are piano keys, 89..=90 are pedals.
    pub id: u8,
    pub finger: u8,
    pub velocity: u16,
    /// Stable identity assigned at decode time. Survives filtering,
    /// persistence, and matching.
    pub uuid: Uuid,
    /// Hammer-acceleration samples, `t_rel` relative to `offset`, 0.1 ms.
    pub hammers: Vec<Sample>,
    /// Key-depth envelope samples, `t_rel` relative to `offset`, 0.1 ms.
    pub after_touch: Vec<Sample>,

    pub key_on_ms: f64,
    pub key_off_ms: f64,
    pub duration_ms: f64,
    pub first_hammer_time_ms: f64,
    pub first_hammer_velocity: u16,
}

impl Note {
    /// Build a Note from its raw decoded fields, computing the derived
    /// timing fields eagerly per the decode-time contract.
    pub fn from_raw(
        offset: u32,
        id: u8,
        finger: u8,
        velocity: u16,
        hammers: Vec<Sample>,
        after_touch: Vec<Sample>,
    ) -> Self {
        let uuid = Uuid::new_v4();

        let first_rel = match (hammers.first(), after_touch.first()) {
            (Some(h), Some(a)) => h.0.min(a.0),
            (Some(h), None) => h.0,
            (None, Some(a)) => a.0,
            (None, None) => 0,
        };
        let last_rel = match (hammers.last(), after_touch.last()) {
            (Some(h), Some(a)) => h.0.max(a.0),
            (Some(h), None) => h.0,
            (None, Some(a)) => a.0,
            (None, None) => 0,
        };

        let key_on_ms = (offset as u64 + first_rel as u64) as f64 / 10.0;
        let key_off_ms = (offset as u64 + last_rel as u64) as f64 / 10.0;
        let duration_ms = key_off_ms - key_on_ms;

        let (first_hammer_time_ms, first_hammer_velocity) = match hammers.first() {
            Some(&(t_rel, v)) => ((offset as u64 + t_rel as u64) as f64 / 10.0, v),
            None => (key_on_ms, 0),
        };

        Self {
            offset,
            id,
            finger,
            velocity,
            uuid,
            hammers,
            after_touch,
            key_on_ms,
            key_off_ms,
            duration_ms,
            first_hammer_time_ms,
            first_hammer_velocity,
        }
    }

    pub fn max_after_touch_depth(&self) -> u16 {
        self.after_touch.iter().map(|&(_, v)| v).max().unwrap_or(0)
    }

    /// Time span covered by the after-touch envelope, in 0.1 ms units
    /// (first sample to last sample, not including `offset`).
    pub fn after_touch_span(&self) -> u32 {
        match (self.after_touch.first(), self.after_touch.last()) {
            (Some(first), Some(last)) => last.0.saturating_sub(first.0),
            _ => 0,
        }
    }
}

/// An ordered sequence of Notes produced by the decoder. Track 0 is always
/// the reference; track 1 is always the replay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub notes: Vec<Note>,
}

impl Track {
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}
