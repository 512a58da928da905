//! Disassembler: a [`FlowScript`] opcode list to labeled assembly text the
//! assembler accepts back.

use std::fmt::Write;

use super::opcode::{native_by_id, Instruction, Operand};
use super::FlowScript;

pub fn disassemble(script: &FlowScript) -> String {
    // (opcode index, label-table index, is_jump), sorted by target position.
    let mut pending: Vec<(u32, usize, bool)> = script
        .procedures
        .iter()
        .enumerate()
        .map(|(t, l)| (l.opcode_index, t, false))
        .chain(
            script
                .jumps
                .iter()
                .enumerate()
                .map(|(t, l)| (l.opcode_index, t, true)),
        )
        .collect();
    pending.sort_by_key(|&(index, _, is_jump)| (index, is_jump));

    let mut out = String::new();
    let mut next_label = 0usize;
    for (i, op) in script.opcodes.iter().enumerate() {
        while next_label < pending.len() && pending[next_label].0 == i as u32 {
            emit_label(&mut out, script, pending[next_label]);
            next_label += 1;
        }
        emit_opcode(&mut out, script, op.instruction, op.operand);
    }
    while next_label < pending.len() {
        emit_label(&mut out, script, pending[next_label]);
        next_label += 1;
    }
    out
}

fn emit_label(out: &mut String, script: &FlowScript, (_, table_index, is_jump): (u32, usize, bool)) {
    if is_jump {
        let _ = writeln!(out, "@{}:", script.jumps[table_index].name);
    } else {
        let _ = writeln!(out, "{}:", script.procedures[table_index].name);
    }
}

fn emit_opcode(out: &mut String, script: &FlowScript, instruction: Instruction, operand: Operand) {
    use Instruction::*;

    let mnemonic = match instruction.mnemonic() {
        Some(m) => m.to_string(),
        None => format!("unk_{:02X}", instruction.value()),
    };

    match (instruction, operand) {
        (_, Operand::None) => {
            let _ = writeln!(out, "\t{mnemonic}");
        }
        (PushUInt32, Operand::Int(v)) => {
            let _ = writeln!(out, "\t{mnemonic} {v}");
        }
        (PushFloat, Operand::Float(f)) => {
            let _ = writeln!(out, "\t{mnemonic} {f:?}");
        }
        (Jump | JumpIfFalse, Operand::Short(index)) => {
            match script.jumps.get(index as usize) {
                Some(label) => {
                    let _ = writeln!(out, "\t{mnemonic} {}", label.name);
                }
                None => {
                    let _ = writeln!(out, "\t{mnemonic} {index}");
                }
            }
        }
        (BeginProcedure | CallProcedure, Operand::Short(index)) => {
            match script.procedures.get(index as usize) {
                Some(label) => {
                    let _ = writeln!(out, "\t{mnemonic} {}", label.name);
                }
                None => {
                    let _ = writeln!(out, "\t{mnemonic} {index}");
                }
            }
        }
        (CallNative, Operand::Short(id)) => match native_by_id(id) {
            Some(native) => {
                let _ = writeln!(out, "\t{mnemonic} {} ; args: {}", native.name, native.arg_count);
            }
            None => {
                let _ = writeln!(out, "\t{mnemonic} 0x{id:04X}");
            }
        },
        (_, Operand::Short(value)) => {
            let _ = writeln!(out, "\t{mnemonic} {value}");
        }
        (_, Operand::Int(v)) => {
            let _ = writeln!(out, "\t{mnemonic} {v}");
        }
        (_, Operand::Float(f)) => {
            let _ = writeln!(out, "\t{mnemonic} {f:?}");
        }
    }
}
