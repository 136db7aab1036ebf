use std::collections::VecDeque;

use serde::Serialize;
use tracing::trace;

use crate::codec::{
    Instruction, InstructionKind, branch_target, classify, collect_exact, decode, encode,
    offsets_of, stream_len, verify_targets, width_for,
};
use crate::error::{PatchError, PatchResult};
use crate::line_table::LineTable;
use crate::opcode::WORD_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Placement {
    Before,
    // the instruction at `offset` changed width but did not move
    Within,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Insertion {
    pub offset: u32,
    pub delta: i32,
    pub placement: Placement,
}

impl Insertion {
    pub fn before(offset: u32, delta: i32) -> Self {
        Self {
            offset,
            delta,
            placement: Placement::Before,
        }
    }

    pub fn within(offset: u32, delta: i32) -> Self {
        Self {
            offset,
            delta,
            placement: Placement::Within,
        }
    }

    pub fn moves(&self, position: u32) -> bool {
        match self.placement {
            Placement::Before => position >= self.offset,
            Placement::Within => position > self.offset,
        }
    }

    /// Offset whose line-table run absorbs the size change. For a removal
    /// `offset` is the end of the dropped range, so the run is found at its
    /// start.
    pub fn line_offset(&self) -> u32 {
        match self.placement {
            Placement::Before if self.delta < 0 => {
                self.offset.saturating_sub(self.delta.unsigned_abs())
            }
            _ => self.offset,
        }
    }

    pub fn map_position(insertions: &[Insertion], position: u32) -> i64 {
        insertions
            .iter()
            .filter(|edit| edit.moves(position))
            .fold(i64::from(position), |acc, edit| acc + i64::from(edit.delta))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditOutcome {
    pub code: Vec<u8>,
    pub insertions: Vec<Insertion>,
    pub removed: Vec<Instruction>,
}

impl EditOutcome {
    pub fn size_delta(&self) -> i64 {
        self.insertions
            .iter()
            .map(|edit| i64::from(edit.delta))
            .sum()
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    instruction: Instruction,
    kind: InstructionKind,
    // None for spliced-in instructions
    origin: Option<u32>,
    target: Option<u32>,
    last_byte: u32,
}

#[derive(Clone, Debug)]
pub struct StreamEditor {
    instructions: Vec<Instruction>,
    offsets: Vec<u32>,
}

impl StreamEditor {
    pub fn new(code: &[u8]) -> PatchResult<Self> {
        let instructions = decode(code)?;
        let offsets = collect_exact(instructions.len(), offsets_of(&instructions))?;
        if let Some((instruction, offset)) = instructions
            .iter()
            .zip(&offsets)
            .find(|(instruction, _)| classify(instruction) == InstructionKind::Suspension)
        {
            return Err(PatchError::UnsupportedConstruct {
                offset: *offset,
                opcode: instruction.opcode,
            });
        }
        Ok(Self {
            instructions,
            offsets,
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn len_bytes(&self) -> u32 {
        stream_len(&self.instructions)
    }

    pub fn index_at(&self, offset: u32) -> PatchResult<usize> {
        self.offsets
            .binary_search(&offset)
            .map_err(|_| PatchError::OffsetMisaligned { offset })
    }

    pub fn insert(&self, block: &[Instruction], offset: u32) -> PatchResult<EditOutcome> {
        let index = self.index_at(offset)?;
        if let Some(instruction) = block
            .iter()
            .find(|instruction| classify(instruction) != InstructionKind::Other)
        {
            return Err(PatchError::consistency(format!(
                "spliced block may not contain {}",
                instruction.opcode.mnemonic()
            )));
        }
        let size = stream_len(block);
        let delta = i32::try_from(size)
            .map_err(|_| PatchError::consistency(format!("block of {size} bytes is too large")))?;

        let mut slots = self.slots(block.len())?;
        slots.splice(
            index..index,
            block.iter().map(|instruction| Slot {
                instruction: *instruction,
                kind: InstructionKind::Other,
                origin: None,
                target: None,
                last_byte: 0,
            }),
        );
        finish(slots, Insertion::before(offset, delta), Vec::new())
    }

    pub fn remove(&self, offset: u32, count: usize) -> PatchResult<EditOutcome> {
        let index = self.index_at(offset)?;
        let end = index + count;
        if end > self.instructions.len() {
            return Err(PatchError::Underrun {
                what: "instruction stream",
                by: (end - self.instructions.len()) as u64,
            });
        }
        let removed = collect_exact(count, self.instructions[index..end].iter().copied())?;
        let size = stream_len(&removed);
        let removal_end = offset + size;
        let delta = i32::try_from(size).map_err(|_| {
            PatchError::consistency(format!("removal of {size} bytes is too large"))
        })?;

        let mut slots = self.slots(0)?;
        slots.drain(index..end);
        if let Some(slot) = slots.iter().find(|slot| {
            slot.target
                .is_some_and(|target| offset < target && target < removal_end)
        }) {
            return Err(PatchError::consistency(format!(
                "{} at offset {} jumps into the removed range {offset}..{removal_end}",
                slot.instruction.opcode.mnemonic(),
                slot.origin.unwrap_or_default()
            )));
        }
        finish(slots, Insertion::before(removal_end, -delta), removed)
    }

    fn slots(&self, spare: usize) -> PatchResult<Vec<Slot>> {
        let slots = self
            .instructions
            .iter()
            .zip(&self.offsets)
            .map(|(instruction, offset)| Slot {
                instruction: *instruction,
                kind: classify(instruction),
                origin: Some(*offset),
                target: branch_target(instruction, *offset),
                last_byte: offset + instruction.byte_len() - 1,
            });
        Ok(collect_exact(self.instructions.len() + spare, slots)?)
    }
}

pub fn insert_at(code: &[u8], block: &[Instruction], offset: u32) -> PatchResult<EditOutcome> {
    StreamEditor::new(code)?.insert(block, offset)
}

pub fn remove_at(code: &[u8], offset: u32, count: usize) -> PatchResult<EditOutcome> {
    StreamEditor::new(code)?.remove(offset, count)
}

fn finish(
    mut slots: Vec<Slot>,
    primary: Insertion,
    removed: Vec<Instruction>,
) -> PatchResult<EditOutcome> {
    let insertions = relocate(&mut slots, primary)?;
    let instructions = collect_exact(slots.len(), slots.iter().map(|slot| slot.instruction))?;
    check_layout(&slots, &instructions, &insertions)?;
    verify_targets(&instructions)?;
    let code = encode(&instructions)?;
    Ok(EditOutcome {
        code,
        insertions,
        removed,
    })
}

// Widths only grow while inserting and only shrink while removing, so each
// instruction queues at most three follow-up resizes.
fn relocate(slots: &mut [Slot], primary: Insertion) -> PatchResult<Vec<Insertion>> {
    let growing = primary.delta > 0;
    let limit = 1 + slots.len() * 3;
    let mut pending = VecDeque::from([primary]);
    let mut applied = Vec::new();

    while let Some(edit) = pending.pop_front() {
        if applied.len() > limit {
            return Err(PatchError::consistency(
                "jump relocation did not settle".to_string(),
            ));
        }
        for slot in slots.iter_mut() {
            let (Some(origin), Some(target)) = (slot.origin, slot.target) else {
                continue;
            };
            let crosses = match slot.kind {
                InstructionKind::AbsoluteJump => edit.moves(target),
                InstructionKind::RelativeJump => {
                    edit.moves(target) && !edit.moves(slot.last_byte)
                }
                InstructionKind::Suspension | InstructionKind::Other => false,
            };
            if !crosses {
                continue;
            }
            let arg = i64::from(slot.instruction.arg) + i64::from(edit.delta);
            let arg = u32::try_from(arg).map_err(|_| {
                PatchError::consistency(format!(
                    "relocated operand {arg} of {} at offset {origin} does not fit 32 bits",
                    slot.instruction.opcode.mnemonic()
                ))
            })?;
            let current = slot.instruction.width;
            let width = if growing {
                width_for(arg).max(current)
            } else {
                width_for(arg)
            };
            slot.instruction.arg = arg;
            slot.instruction.width = width;
            if width != current {
                let delta = (i32::from(width) - i32::from(current)) * WORD_SIZE as i32;
                trace!(
                    "{} at offset {origin} resized by {delta} bytes",
                    slot.instruction.opcode.mnemonic()
                );
                pending.push_back(Insertion::within(origin, delta));
            }
        }
        applied.push(edit);
    }
    Ok(applied)
}

fn check_layout(
    slots: &[Slot],
    instructions: &[Instruction],
    insertions: &[Insertion],
) -> PatchResult<()> {
    let offsets = collect_exact(instructions.len(), offsets_of(instructions))?;
    for ((slot, instruction), offset) in slots.iter().zip(instructions).zip(&offsets) {
        let Some(origin) = slot.origin else {
            continue;
        };
        let expected = Insertion::map_position(insertions, origin);
        if i64::from(*offset) != expected {
            return Err(PatchError::consistency(format!(
                "instruction from offset {origin} landed at {offset}, expected {expected}"
            )));
        }
        if let Some(target) = slot.target {
            let expected = Insertion::map_position(insertions, target);
            let actual = branch_target(instruction, *offset).map(i64::from);
            if actual != Some(expected) {
                return Err(PatchError::consistency(format!(
                    "{} at offset {offset} reaches {actual:?}, expected {expected}",
                    instruction.opcode.mnemonic()
                )));
            }
        }
    }
    Ok(())
}

/// Runs are adjusted from the highest offset down, so an earlier adjustment
/// never shifts a run a later one looks up.
pub fn apply_line_adjustments(table: &mut LineTable, insertions: &[Insertion]) -> PatchResult<()> {
    let mut ordered = collect_exact(insertions.len(), insertions.iter().copied())?;
    ordered.sort_by(|a, b| b.line_offset().cmp(&a.line_offset()));
    for edit in &ordered {
        table.adjust(edit.line_offset(), edit.delta)?;
    }
    Ok(())
}
