mod common;
use common::*;

use patch::{AssemblerError, FunctionBuilder, LineRun, disassemble};

#[test]
fn countdown_assembles_with_lines_pools_and_depth() {
    let function = countdown();
    assert_eq!(function.name(), "countdown");
    assert_eq!(function.code().len(), 22);
    assert_eq!(function.stack_depth(), 2);
    assert_eq!(
        function.constants().as_slice(),
        [Constant::Int(0), Constant::Int(1), Constant::None]
    );
    assert!(function.names().is_empty());

    let table = function.line_table();
    assert_eq!(table.first_line(), 2);
    assert_eq!(
        table.runs(),
        &[
            LineRun {
                byte_len: 8,
                line_delta: Some(0)
            },
            LineRun {
                byte_len: 8,
                line_delta: Some(1)
            },
            LineRun {
                byte_len: 2,
                line_delta: Some(1)
            },
            LineRun {
                byte_len: 4,
                line_delta: Some(1)
            },
        ]
    );

    let instructions = decode(function.code()).expect("decode");
    assert_eq!(instructions[3].opcode, OpCode::PopJumpIfFalse);
    assert_eq!(instructions[3].arg, 18);
    assert_eq!(instructions[8].arg, 0);
}

#[test]
fn long_forward_jumps_widen_until_they_fit() {
    let mut source = String::from(".line 1\n    jump_forward end\n    jump_absolute end\n");
    for _ in 0..130 {
        source.push_str("    nop\n");
    }
    source.push_str(".label end\n    return_value\n");
    let function = assemble(&source).expect("assemble");

    let instructions = decode(function.code()).expect("decode");
    assert_eq!(instructions[0].width, 2);
    assert_eq!(instructions[1].width, 2);
    // 4 + 4 + 260 bytes precede the return.
    assert_eq!(instructions[0].arg, 264);
    assert_eq!(instructions[1].arg, 268);
    assert_eq!(function.code().len(), 270);
}

#[test]
fn named_constants_and_noline_regions() {
    let source = r#"
.function greet
.firstline 10
.const GREETING "hi; there"
.noline
    load_global print
.line 11
    load_const GREETING
    load_const "hi; there"   ; same constant again
    call_function 2
    pop_top
    load_const None
    return_value
"#;
    let function = assemble(source).expect("assemble");
    assert_eq!(function.constants().len(), 2);
    assert_eq!(function.names().as_slice(), ["print".to_string()]);
    assert_eq!(function.line_table().line_for_offset(0), None);
    assert_eq!(function.line_table().find_offset_for_line(11), Ok(2));
    assert_eq!(function.line_table().first_line(), 10);
}

#[test]
fn parse_errors_carry_line_numbers() {
    let err = assemble("nop\nfrobnicate 1\n").expect_err("unknown opcode");
    assert_eq!(err.line, 2);
    assert!(err.message.contains("frobnicate"));

    let err = assemble("load_fast\n").expect_err("missing operand");
    assert_eq!(err.line, 1);

    let err = assemble("jump_absolute 12\n").expect_err("numeric target");
    assert!(err.message.contains("numeric"));

    let err = assemble("jump_absolute nowhere\nreturn_value\n").expect_err("unknown label");
    assert!(err.message.contains("unknown label 'nowhere'"));

    let err = assemble(".label x\n.label x\nnop\n").expect_err("duplicate label");
    assert_eq!(err.line, 2);
}

#[test]
fn relative_jumps_must_go_forward() {
    let mut builder = FunctionBuilder::new("loop");
    builder.label("top").expect("label");
    builder.op(OpCode::Nop);
    builder.jump(OpCode::JumpForward, "top");
    assert!(matches!(
        builder.finish(),
        Err(AssemblerError::BackwardRelativeJump(label)) if label == "top"
    ));
}

#[test]
fn disassembly_annotates_pools_lines_and_targets() {
    let listing = disassemble(&countdown()).expect("disassemble");
    assert!(listing.contains("function countdown (stack 2):"));
    assert!(listing.contains("  [0002] None"));
    assert!(listing.contains("      ; line 3"));
    assert!(listing.contains("0006\t2912          \tpop_jump_if_false 18 ; to 18"));
    assert!(listing.contains("compare_op 4 ; >"));
}
