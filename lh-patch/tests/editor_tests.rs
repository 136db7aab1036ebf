mod common;
use common::*;

use patch::codec::branch_target;
use patch::{ErrorKind, Insertion, Placement, StreamEditor, insert_at, remove_at};

#[test]
fn forward_jump_across_insertion_grows_and_absolute_before_it_stays() {
    // Ten single-word instructions, twenty bytes.
    let code = raw(&[
        (OpCode::JumpAbsolute, 2),
        (OpCode::Nop, 0),
        (OpCode::JumpForward, 10),
        (OpCode::Nop, 0),
        (OpCode::Nop, 0),
        (OpCode::Nop, 0),
        (OpCode::Nop, 0),
        (OpCode::Nop, 0),
        (OpCode::Nop, 0),
        (OpCode::ReturnValue, 0),
    ]);
    assert_eq!(code.len(), 20);

    let outcome = insert_at(&code, &nops(5), 8).expect("insert should succeed");
    assert_eq!(outcome.code.len(), 30);
    assert_eq!(outcome.insertions, vec![Insertion::before(8, 10)]);
    assert_eq!(outcome.size_delta(), 10);

    let instructions = decode(&outcome.code).expect("decode");
    assert_eq!(instructions[0].arg, 2);
    assert_eq!(instructions[2].opcode, OpCode::JumpForward);
    assert_eq!(instructions[2].arg, 20);
    assert_eq!(branch_target(&instructions[2], 4), Some(26));
    assert_eq!(instructions[14].opcode, OpCode::ReturnValue);
}

#[test]
fn jumps_to_the_insertion_point_still_reach_the_original_instruction() {
    let code = raw(&[
        (OpCode::JumpAbsolute, 4),
        (OpCode::JumpForward, 0),
        (OpCode::ReturnValue, 0),
    ]);
    let outcome = insert_at(&code, &nops(2), 4).expect("insert should succeed");
    let instructions = decode(&outcome.code).expect("decode");
    assert_eq!(instructions[0].arg, 8);
    assert_eq!(instructions[1].arg, 4);
    assert_eq!(instructions[4].opcode, OpCode::ReturnValue);
}

#[test]
fn backward_and_unaffected_jumps_are_untouched() {
    let code = raw(&[
        (OpCode::Nop, 0),
        (OpCode::JumpForward, 0),
        (OpCode::Nop, 0),
        (OpCode::JumpAbsolute, 0),
        (OpCode::ReturnValue, 0),
    ]);
    let outcome = insert_at(&code, &nops(1), 6).expect("insert should succeed");
    let instructions = decode(&outcome.code).expect("decode");
    assert_eq!(instructions[1].arg, 0);
    assert_eq!(instructions[4].opcode, OpCode::JumpAbsolute);
    assert_eq!(instructions[4].arg, 0);
}

#[test]
fn relative_jump_that_outgrows_its_width_cascades() {
    let mut program = vec![(OpCode::JumpForward, 250)];
    program.extend(std::iter::repeat_n((OpCode::Nop, 0), 125));
    program.push((OpCode::ReturnValue, 0));
    let code = raw(&program);
    assert_eq!(code.len(), 254);

    let outcome = insert_at(&code, &nops(5), 100).expect("insert should succeed");
    assert_eq!(
        outcome.insertions,
        vec![Insertion::before(100, 10), Insertion::within(0, 2)]
    );
    assert_eq!(outcome.code.len(), 266);

    let instructions = decode(&outcome.code).expect("decode");
    assert_eq!(instructions[0].width, 2);
    assert_eq!(instructions[0].arg, 260);
    assert_eq!(branch_target(&instructions[0], 0), Some(264));
    assert_eq!(
        instructions.last().map(|instruction| instruction.opcode),
        Some(OpCode::ReturnValue)
    );
}

#[test]
fn absolute_jump_counts_its_own_growth() {
    let mut program = vec![(OpCode::JumpAbsolute, 254)];
    program.extend(std::iter::repeat_n((OpCode::Nop, 0), 126));
    program.push((OpCode::ReturnValue, 0));
    let code = raw(&program);

    let outcome = insert_at(&code, &nops(1), 4).expect("insert should succeed");
    let instructions = decode(&outcome.code).expect("decode");
    assert_eq!(instructions[0].width, 2);
    assert_eq!(instructions[0].arg, 258);
    assert_eq!(outcome.insertions[1].placement, Placement::Within);
    let offsets = patch::codec::instruction_offsets(&instructions);
    let landed = offsets
        .iter()
        .position(|offset| *offset == 258)
        .expect("target is an instruction boundary");
    assert_eq!(instructions[landed].opcode, OpCode::ReturnValue);
}

#[test]
fn widening_cascades_through_a_chain_of_jumps() {
    // The first jump only crosses the 255 boundary once the second one widens.
    let mut program = vec![(OpCode::JumpForward, 252), (OpCode::JumpForward, 254)];
    program.extend(std::iter::repeat_n((OpCode::Nop, 0), 127));
    program.push((OpCode::ReturnValue, 0));
    let code = raw(&program);
    assert_eq!(code.len(), 260);

    let outcome = insert_at(&code, &nops(1), 200).expect("insert should succeed");
    assert_eq!(
        outcome.insertions,
        vec![
            Insertion::before(200, 2),
            Insertion::within(2, 2),
            Insertion::within(0, 2),
        ]
    );
    let instructions = decode(&outcome.code).expect("decode");
    assert_eq!((instructions[0].arg, instructions[0].width), (256, 2));
    assert_eq!((instructions[1].arg, instructions[1].width), (256, 2));
    assert_eq!(branch_target(&instructions[0], 0), Some(260));
    assert_eq!(branch_target(&instructions[1], 4), Some(264));
    assert_eq!(instructions[130].opcode, OpCode::ReturnValue);
}

#[test]
fn removal_undoes_insertion_byte_for_byte() {
    let mut program = vec![(OpCode::JumpForward, 250)];
    program.extend(std::iter::repeat_n((OpCode::Nop, 0), 125));
    program.push((OpCode::ReturnValue, 0));
    let code = raw(&program);

    let inserted = insert_at(&code, &nops(5), 100).expect("insert should succeed");
    let removed = remove_at(&inserted.code, 102, 5).expect("remove should succeed");
    assert_eq!(removed.code, code);
    assert_eq!(removed.removed, nops(5));
    assert_eq!(removed.size_delta(), -12);
}

#[test]
fn removal_relocates_jumps_past_the_range() {
    let code = raw(&[
        (OpCode::JumpAbsolute, 8),
        (OpCode::JumpForward, 4),
        (OpCode::Nop, 0),
        (OpCode::Nop, 0),
        (OpCode::ReturnValue, 0),
    ]);
    let outcome = remove_at(&code, 4, 2).expect("remove should succeed");
    assert_eq!(outcome.insertions, vec![Insertion::before(8, -4)]);
    assert_eq!(outcome.insertions[0].line_offset(), 4);
    let instructions = decode(&outcome.code).expect("decode");
    assert_eq!(instructions[0].arg, 4);
    assert_eq!(instructions[1].arg, 0);
}

#[test]
fn removal_rejects_jumps_into_the_removed_range() {
    let code = raw(&[
        (OpCode::JumpAbsolute, 4),
        (OpCode::Nop, 0),
        (OpCode::Nop, 0),
        (OpCode::ReturnValue, 0),
    ]);
    let err = remove_at(&code, 2, 2).expect_err("target 4 would vanish");
    assert_eq!(err.kind(), ErrorKind::Consistency);
}

#[test]
fn removal_past_the_end_underruns() {
    let code = raw(&[(OpCode::Nop, 0), (OpCode::ReturnValue, 0)]);
    assert_eq!(
        remove_at(&code, 2, 3),
        Err(PatchError::Underrun {
            what: "instruction stream",
            by: 2
        })
    );
}

#[test]
fn offsets_inside_an_instruction_are_misaligned() {
    let code = raw(&[(OpCode::LoadConst, 300), (OpCode::ReturnValue, 0)]);
    assert_eq!(
        insert_at(&code, &nops(1), 2),
        Err(PatchError::OffsetMisaligned { offset: 2 })
    );
    assert_eq!(
        insert_at(&code, &nops(1), 3),
        Err(PatchError::OffsetMisaligned { offset: 3 })
    );
    assert!(insert_at(&code, &nops(1), 4).is_ok());
}

#[test]
fn suspending_streams_are_refused_before_editing() {
    let code = raw(&[
        (OpCode::LoadConst, 0),
        (OpCode::YieldValue, 0),
        (OpCode::ReturnValue, 0),
    ]);
    assert_eq!(
        StreamEditor::new(&code).map(|_| ()),
        Err(PatchError::UnsupportedConstruct {
            offset: 2,
            opcode: OpCode::YieldValue
        })
    );
}

#[test]
fn spliced_blocks_may_not_jump() {
    let code = raw(&[(OpCode::Nop, 0), (OpCode::ReturnValue, 0)]);
    let block = [Instruction::new(OpCode::JumpAbsolute, 0)];
    let err = insert_at(&code, &block, 0).expect_err("jumps are not spliceable");
    assert_eq!(err.kind(), ErrorKind::Consistency);
}
