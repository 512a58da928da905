use amicitia_codecs::bf::opcode::{native_by_id, native_by_name};
use amicitia_codecs::bf::{assemble, disassemble, FlowScript, Instruction, Label, Opcode, Operand};
use amicitia_codecs::bmd::{Dialog, Message, MessageScript, Token};
use amicitia_codecs::Resource;

#[test]
fn assembles_main_procedure() {
    let source = "main:\n\tpushi 5\n\tpushi 10\n\tadd\n\tret\n";
    let script = assemble(source).unwrap();

    assert_eq!(script.procedures.len(), 1);
    assert_eq!(script.procedures[0].name, "main");
    assert_eq!(script.procedures[0].opcode_index, 0);

    assert_eq!(script.opcodes.len(), 4);
    assert_eq!(
        script.opcodes[0],
        Opcode::new(Instruction::PushUInt32, Operand::Int(5))
    );
    assert_eq!(
        script.opcodes[1],
        Opcode::new(Instruction::PushUInt32, Operand::Int(10))
    );
    assert_eq!(script.opcodes[2], Opcode::new(Instruction::Add, Operand::None));
    assert_eq!(script.opcodes[3], Opcode::new(Instruction::Return, Operand::None));

    // pushi occupies two words, add/ret one each.
    assert_eq!(script.opcodes[0].word_size(), 2);
    assert_eq!(script.opcodes[2].word_size(), 1);
    let total: u32 = script.opcodes.iter().map(|o| o.word_size()).sum();
    assert_eq!(total, 6);
}

#[test]
fn disassembly_reassembles_equivalently() {
    let source = "main:\n\tpushi 5\n\tpushi 10\n\tadd\n\tret\n";
    let script = assemble(source).unwrap();
    let text = disassemble(&script);
    let reassembled = assemble(&text).unwrap();
    assert_eq!(reassembled.opcodes, script.opcodes);
    assert_eq!(reassembled.procedures, script.procedures);
    assert_eq!(reassembled.jumps, script.jumps);
}

#[test]
fn jump_labels_resolve_to_table_indices() {
    let source = "\
main:
\tpushi 0
@loop:
\tpushis 1
\tadd
\tgoto loop
\tret
";
    let script = assemble(source).unwrap();
    assert_eq!(script.jumps.len(), 1);
    assert_eq!(script.jumps[0].name, "loop");
    assert_eq!(script.jumps[0].opcode_index, 1);
    // goto holds the jump-table index, not the opcode index.
    assert_eq!(script.opcodes[3].operand, Operand::Short(0));
}

#[test]
fn unresolved_label_is_reported_by_name() {
    let source = "main:\n\tgoto nowhere\n\tret\n";
    let err = assemble(source).unwrap_err();
    let codec = err.downcast_ref::<amicitia_codecs::CodecError>().unwrap();
    match codec {
        amicitia_codecs::CodecError::LabelNotFound { label, line } => {
            assert_eq!(label, "nowhere");
            assert_eq!(*line, 2);
        }
        other => panic!("expected LabelNotFound, got {other:?}"),
    }
    assert!(err.to_string().contains("nowhere"));
}

#[test]
fn native_calls_use_friendly_names() {
    let script = assemble("main:\n\tcomm MSG\n\tret\n").unwrap();
    assert_eq!(script.opcodes[0].operand, Operand::Short(native_by_name("MSG").unwrap().id));
    let text = disassemble(&script);
    assert!(text.contains("comm MSG"));
    assert!(text.contains(&format!("args: {}", native_by_id(0x0002).unwrap().arg_count)));
    // The hint comment must not break reassembly.
    let reassembled = assemble(&text).unwrap();
    assert_eq!(reassembled.opcodes, script.opcodes);
}

#[test]
fn unknown_instructions_roundtrip_as_unk() {
    let script = assemble("main:\n\tunk_42 7\n\tret\n").unwrap();
    assert_eq!(script.opcodes[0].instruction, Instruction::Unknown(0x42));
    assert_eq!(script.opcodes[0].operand, Operand::Short(7));
    let text = disassemble(&script);
    assert!(text.contains("unk_42 7"));
    assert_eq!(assemble(&text).unwrap().opcodes, script.opcodes);
}

#[test]
fn container_roundtrips_with_extended_opcodes_before_labels() {
    let script = FlowScript {
        user_id: 0,
        local_int_count: 2,
        local_float_count: 0,
        procedures: vec![Label { name: "main".to_string(), opcode_index: 0 }],
        // The jump target sits after two 2-word opcodes, so its stored word
        // offset (4) differs from its opcode index (2).
        jumps: vec![Label { name: "loop".to_string(), opcode_index: 2 }],
        opcodes: vec![
            Opcode::new(Instruction::PushUInt32, Operand::Int(5)),
            Opcode::new(Instruction::PushFloat, Operand::Float(1.5)),
            Opcode::new(Instruction::Add, Operand::None),
            Opcode::new(Instruction::Jump, Operand::Short(0)),
            Opcode::new(Instruction::Return, Operand::None),
        ],
        messages: None,
        strings: Vec::new(),
    };
    let bytes = script.to_bytes().unwrap();
    assert_eq!(&bytes[8..12], b"FLW0");
    let decoded = FlowScript::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, script);
}

#[test]
fn stored_label_offsets_are_word_offsets() {
    let script = FlowScript {
        user_id: 0,
        local_int_count: 0,
        local_float_count: 0,
        procedures: vec![],
        jumps: vec![Label { name: "x".to_string(), opcode_index: 1 }],
        opcodes: vec![
            Opcode::new(Instruction::PushUInt32, Operand::Int(1)),
            Opcode::new(Instruction::Return, Operand::None),
        ],
        messages: None,
        strings: Vec::new(),
    };
    let bytes = script.to_bytes().unwrap();
    // Jump section entry is the second of five 16-byte entries at 0x20.
    let jump_table = 0x20 + 16;
    let data_offset = u32::from_le_bytes(bytes[jump_table + 12..jump_table + 16].try_into().unwrap()) as usize;
    let stored_offset = u32::from_le_bytes(bytes[data_offset + 24..data_offset + 28].try_into().unwrap());
    assert_eq!(stored_offset, 2, "opcode 1 sits at word offset 2");
}

#[test]
fn dangling_label_offset_is_invalid_data() {
    let script = FlowScript {
        user_id: 0,
        local_int_count: 0,
        local_float_count: 0,
        procedures: vec![],
        jumps: vec![Label { name: "x".to_string(), opcode_index: 1 }],
        opcodes: vec![
            Opcode::new(Instruction::PushUInt32, Operand::Int(1)),
            Opcode::new(Instruction::Return, Operand::None),
        ],
        messages: None,
        strings: Vec::new(),
    };
    let mut bytes = script.to_bytes().unwrap();
    let jump_table = 0x20 + 16;
    let data_offset = u32::from_le_bytes(bytes[jump_table + 12..jump_table + 16].try_into().unwrap()) as usize;
    // Point the label into the middle of the pushi literal.
    bytes[data_offset + 24] = 1;
    let err = FlowScript::from_bytes(&bytes).unwrap_err();
    let codec = err
        .root_cause()
        .downcast_ref::<amicitia_codecs::CodecError>()
        .unwrap();
    assert!(matches!(codec, amicitia_codecs::CodecError::InvalidData(_)));
}

#[test]
fn embedded_message_container_roundtrips() {
    let messages = MessageScript {
        user_id: 0,
        messages: vec![Message::Standard {
            name: "EMBED".to_string(),
            actor: None,
            dialogs: vec![Dialog { tokens: vec![Token::Text("inside".to_string())] }],
        }],
        actors: vec![],
    };
    let script = FlowScript {
        user_id: 9,
        local_int_count: 0,
        local_float_count: 0,
        procedures: vec![Label { name: "main".to_string(), opcode_index: 0 }],
        jumps: vec![],
        opcodes: vec![
            Opcode::new(Instruction::CallNative, Operand::Short(2)),
            Opcode::new(Instruction::Return, Operand::None),
        ],
        messages: Some(messages),
        strings: b"hello\0".to_vec(),
    };
    let decoded = FlowScript::from_bytes(&script.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, script);
}

#[test]
fn assembled_script_survives_container_encoding() {
    let source = "\
main:
\tpushi 2
\tpushi 3
\tadd
@done:
\tret
";
    let script = assemble(source).unwrap();
    let decoded = FlowScript::from_bytes(&script.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded.opcodes, script.opcodes);
    assert_eq!(decoded.procedures, script.procedures);
    assert_eq!(decoded.jumps, script.jumps);
    let text = disassemble(&decoded);
    assert_eq!(assemble(&text).unwrap().opcodes, script.opcodes);
}
