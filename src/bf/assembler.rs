//! Two-pass assembler: text source to a [`FlowScript`] with resolved label
//! references.

use anyhow::{anyhow, Result};

use crate::error::CodecError;

use super::opcode::{native_by_name, Instruction, Opcode, Operand};
use super::{FlowScript, Label};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Procedure,
    Jump,
}

struct Fixup {
    name: String,
    opcode_index: usize,
    line: usize,
    kind: LabelKind,
}

/// Assembles source text. Pass 1 collects labels and instructions with
/// unresolved references; pass 2 resolves every reference by exact name
/// match, failing with a "label not found" error naming the label.
pub fn assemble(source: &str) -> Result<FlowScript> {
    let mut script = FlowScript::default();
    let mut fixups: Vec<Fixup> = Vec::new();

    for (index, raw_line) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = match raw_line.find(';') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        }
        .trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_suffix(':') {
            let name = name.trim();
            let opcode_index = script.opcodes.len() as u32;
            if let Some(jump_name) = name.strip_prefix('@') {
                script.jumps.push(Label { name: jump_name.to_string(), opcode_index });
            } else {
                script.procedures.push(Label { name: name.to_string(), opcode_index });
            }
            continue;
        }

        let mut parts = line.split_whitespace();
        let mnemonic = parts.next().unwrap();
        let operand_text = parts.next();
        if parts.next().is_some() {
            return Err(anyhow!(CodecError::InvalidData(format!(
                "trailing tokens after operand (line {line_no})"
            ))));
        }

        let instruction = match Instruction::from_mnemonic(mnemonic) {
            Some(instruction) => instruction,
            None => match mnemonic.strip_prefix("unk_") {
                Some(hex) => Instruction::Unknown(u16::from_str_radix(hex, 16).map_err(|_| {
                    anyhow!(CodecError::InvalidData(format!(
                        "bad unknown-instruction mnemonic '{mnemonic}' (line {line_no})"
                    )))
                })?),
                None => {
                    return Err(anyhow!(CodecError::InvalidData(format!(
                        "unrecognised mnemonic '{mnemonic}' (line {line_no})"
                    ))))
                }
            },
        };

        let operand = parse_operand(
            instruction,
            operand_text,
            line_no,
            script.opcodes.len(),
            &mut fixups,
        )?;
        script.opcodes.push(Opcode::new(instruction, operand));
    }

    for fixup in fixups {
        let labels = match fixup.kind {
            LabelKind::Procedure => &script.procedures,
            LabelKind::Jump => &script.jumps,
        };
        let table_index = labels
            .iter()
            .position(|l| l.name == fixup.name)
            .ok_or_else(|| {
                anyhow!(CodecError::LabelNotFound {
                    label: fixup.name.clone(),
                    line: fixup.line,
                })
            })?;
        script.opcodes[fixup.opcode_index].operand = Operand::Short(table_index as u16);
    }

    Ok(script)
}

fn parse_operand(
    instruction: Instruction,
    text: Option<&str>,
    line_no: usize,
    opcode_index: usize,
    fixups: &mut Vec<Fixup>,
) -> Result<Operand> {
    use Instruction::*;

    if instruction.is_zero_operand() {
        return match text {
            None => Ok(Operand::None),
            Some(t) => Err(anyhow!(CodecError::InvalidData(format!(
                "unexpected operand '{t}' (line {line_no})"
            )))),
        };
    }

    let text = text.ok_or_else(|| {
        anyhow!(CodecError::InvalidData(format!(
            "missing operand (line {line_no})"
        )))
    })?;

    match instruction {
        PushUInt32 => Ok(Operand::Int(parse_int(text, line_no)? as u32)),
        PushFloat => {
            let value: f32 = text.parse().map_err(|_| {
                anyhow!(CodecError::InvalidData(format!(
                    "bad float literal '{text}' (line {line_no})"
                )))
            })?;
            Ok(Operand::Float(value))
        }
        BeginProcedure | CallProcedure | Jump | JumpIfFalse => {
            if let Ok(value) = parse_int(text, line_no) {
                Ok(Operand::Short(value as u16))
            } else {
                let kind = match instruction {
                    Jump | JumpIfFalse => LabelKind::Jump,
                    _ => LabelKind::Procedure,
                };
                fixups.push(Fixup {
                    name: text.to_string(),
                    opcode_index,
                    line: line_no,
                    kind,
                });
                Ok(Operand::Short(0))
            }
        }
        CallNative => {
            if let Some(native) = native_by_name(text) {
                Ok(Operand::Short(native.id))
            } else {
                Ok(Operand::Short(parse_int(text, line_no)? as u16))
            }
        }
        _ => Ok(Operand::Short(parse_int(text, line_no)? as u16)),
    }
}

fn parse_int(text: &str, line_no: usize) -> Result<i64> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(hex) = text.strip_prefix("-0x") {
        i64::from_str_radix(hex, 16).map(|v| -v)
    } else {
        text.parse()
    };
    parsed.map_err(|_| {
        anyhow!(CodecError::InvalidData(format!(
            "bad integer literal '{text}' (line {line_no})"
        )))
    })
}
