use serde::Serialize;

use crate::codec::DecodeError;
use crate::error::{PatchError, PatchResult};

const NO_LINE: i8 = i8::MIN;
const MAX_COMPACT_RUN: u32 = 254;
const MAX_COMPACT_DELTA: i32 = 127;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LineRun {
    pub byte_len: u32,
    pub line_delta: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LineEntry {
    pub start: u32,
    pub end: u32,
    pub line: Option<u32>,
    #[serde(skip)]
    run: usize,
}

impl LineEntry {
    pub fn has_line(&self) -> bool {
        self.line.is_some()
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineTable {
    first_line: u32,
    runs: Vec<LineRun>,
}

impl LineTable {
    pub fn new(first_line: u32, runs: Vec<LineRun>) -> Self {
        Self { first_line, runs }
    }

    pub fn from_spans(first_line: u32, spans: impl IntoIterator<Item = (u32, Option<u32>)>) -> Self {
        let mut current = i64::from(first_line);
        let runs = spans
            .into_iter()
            .map(|(byte_len, line)| {
                let line_delta = line.map(|line| {
                    let delta = i64::from(line) - current;
                    current = i64::from(line);
                    delta as i32
                });
                LineRun {
                    byte_len,
                    line_delta,
                }
            })
            .collect();
        Self { first_line, runs }
    }

    pub fn try_clone(&self) -> PatchResult<Self> {
        let mut runs = Vec::new();
        runs.try_reserve_exact(self.runs.len())?;
        runs.extend_from_slice(&self.runs);
        Ok(Self {
            first_line: self.first_line,
            runs,
        })
    }

    pub fn first_line(&self) -> u32 {
        self.first_line
    }

    pub fn runs(&self) -> &[LineRun] {
        &self.runs
    }

    pub fn entries(&self) -> Entries<'_> {
        Entries {
            runs: &self.runs,
            index: 0,
            offset: 0,
            line: i64::from(self.first_line),
        }
    }

    pub fn total_len(&self) -> u64 {
        self.runs.iter().map(|run| u64::from(run.byte_len)).sum()
    }

    pub fn find_offset_for_line(&self, line: u32) -> PatchResult<u32> {
        self.entries()
            .find(|entry| entry.line.is_some_and(|current| current >= line))
            .map(|entry| entry.start)
            .ok_or(PatchError::LineNotFound { line })
    }

    pub fn find_entry_for_offset(&self, offset: u32) -> PatchResult<LineEntry> {
        self.entries()
            .find(|entry| entry.contains(offset))
            .ok_or(PatchError::OffsetNotFound { offset })
    }

    pub fn line_for_offset(&self, offset: u32) -> Option<u32> {
        self.find_entry_for_offset(offset).ok()?.line
    }

    pub fn adjust(&mut self, offset: u32, delta: i32) -> PatchResult<()> {
        let entry = self.find_entry_for_offset(offset)?;
        let run = &mut self.runs[entry.run];
        let resized = i64::from(run.byte_len) + i64::from(delta);
        if resized < 0 {
            return Err(PatchError::Underrun {
                what: "line table run",
                by: resized.unsigned_abs(),
            });
        }
        run.byte_len = u32::try_from(resized).map_err(|_| {
            PatchError::consistency(format!("line table run at offset {offset} exceeds u32"))
        })?;
        Ok(())
    }

    /// Encodes the table as `(byte delta, line delta)` byte pairs, splitting
    /// runs that do not fit a single pair.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.runs.len() * 2);
        for run in &self.runs {
            let marker = match run.line_delta {
                Some(delta) => {
                    let mut delta = delta;
                    while delta > MAX_COMPACT_DELTA {
                        push_pair(&mut out, 0, MAX_COMPACT_DELTA as i8);
                        delta -= MAX_COMPACT_DELTA;
                    }
                    while delta < -MAX_COMPACT_DELTA {
                        push_pair(&mut out, 0, -MAX_COMPACT_DELTA as i8);
                        delta += MAX_COMPACT_DELTA;
                    }
                    delta as i8
                }
                None => NO_LINE,
            };
            let continuation = if marker == NO_LINE { NO_LINE } else { 0 };
            let mut remaining = run.byte_len;
            let first = remaining.min(MAX_COMPACT_RUN);
            push_pair(&mut out, first as u8, marker);
            remaining -= first;
            while remaining > 0 {
                let chunk = remaining.min(MAX_COMPACT_RUN);
                push_pair(&mut out, chunk as u8, continuation);
                remaining -= chunk;
            }
        }
        out
    }

    pub fn from_bytes(first_line: u32, bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() % 2 != 0 {
            return Err(DecodeError::OddLength(bytes.len()));
        }
        let runs = bytes
            .chunks_exact(2)
            .map(|pair| {
                let delta = pair[1] as i8;
                LineRun {
                    byte_len: u32::from(pair[0]),
                    line_delta: (delta != NO_LINE).then_some(i32::from(delta)),
                }
            })
            .collect();
        Ok(Self { first_line, runs })
    }
}

fn push_pair(out: &mut Vec<u8>, byte_delta: u8, line_delta: i8) {
    out.push(byte_delta);
    out.push(line_delta as u8);
}

pub struct Entries<'a> {
    runs: &'a [LineRun],
    index: usize,
    offset: u32,
    line: i64,
}

impl Iterator for Entries<'_> {
    type Item = LineEntry;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(run) = self.runs.get(self.index) {
            let run_index = self.index;
            self.index += 1;
            if let Some(delta) = run.line_delta {
                self.line += i64::from(delta);
            }
            if run.byte_len == 0 {
                continue;
            }
            let start = self.offset;
            self.offset = self.offset.saturating_add(run.byte_len);
            let line = run
                .line_delta
                .and_then(|_| u32::try_from(self.line).ok());
            return Some(LineEntry {
                start,
                end: self.offset,
                line,
                run: run_index,
            });
        }
        None
    }
}
