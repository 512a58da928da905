use amicitia_codecs::bmd::{
    decode_relocations, encode_relocations, Dialog, Message, MessageScript, Token, DATA_START,
};
use amicitia_codecs::Resource;

fn standard(name: &str, actor: Option<u16>, tokens: Vec<Token>) -> Message {
    Message::Standard {
        name: name.to_string(),
        actor,
        dialogs: vec![Dialog { tokens }],
    }
}

#[test]
fn standard_message_with_actor_roundtrips() {
    let script = MessageScript {
        user_id: 0,
        messages: vec![standard(
            "TEST",
            Some(0),
            vec![
                Token::Text("Hi".to_string()),
                Token::Function { category: 0, id: 7, params: vec![3, 0] },
            ],
        )],
        actors: vec!["Hero".to_string()],
    };

    let bytes = script.to_bytes().unwrap();
    assert_eq!(&bytes[8..12], b"MSG1");
    let decoded = MessageScript::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, script);

    let Message::Standard { name, actor, dialogs } = &decoded.messages[0] else {
        panic!("expected standard message");
    };
    assert_eq!(name, "TEST");
    let actor_index = actor.unwrap() as usize;
    assert_eq!(decoded.actors[actor_index], "Hero");
    assert_eq!(dialogs[0].tokens[0], Token::Text("Hi".to_string()));
    let Token::Function { category, id, params } = &dialogs[0].tokens[1] else {
        panic!("expected function token");
    };
    assert_eq!((*category, *id), (0, 7));
    assert_eq!(params[0], 3);
}

#[test]
fn function_token_wire_form() {
    let script = MessageScript {
        user_id: 0,
        messages: vec![standard(
            "F",
            None,
            vec![Token::Function { category: 2, id: 5, params: vec![0x11, 0x22] }],
        )],
        actors: vec![],
    };
    let bytes = script.to_bytes().unwrap();
    // One parameter pair: marker low nibble 2, then (category << 5) | id.
    let marker_pos = bytes
        .windows(3)
        .position(|w| w == [0xF2, (2 << 5) | 5, 0x11])
        .expect("function token not found in stream");
    assert_eq!(bytes[marker_pos + 3], 0x22);
    assert_eq!(bytes[marker_pos + 4], 0x00, "page must be null terminated");
}

#[test]
fn odd_parameter_count_is_padded() {
    let _ = env_logger::builder().is_test(true).try_init();
    let script = MessageScript {
        user_id: 0,
        messages: vec![standard(
            "P",
            None,
            vec![Token::Function { category: 0, id: 7, params: vec![3] }],
        )],
        actors: vec![],
    };
    let decoded = MessageScript::from_bytes(&script.to_bytes().unwrap()).unwrap();
    let Message::Standard { dialogs, .. } = &decoded.messages[0] else { panic!() };
    let Token::Function { params, .. } = &dialogs[0].tokens[0] else { panic!() };
    assert_eq!(params, &vec![3, 0]);
}

#[test]
fn selection_message_roundtrips() {
    let script = MessageScript {
        user_id: 3,
        messages: vec![Message::Selection {
            name: "CHOICE".to_string(),
            dialogs: vec![
                Dialog { tokens: vec![Token::Text("Yes".to_string())] },
                Dialog { tokens: vec![Token::Text("No".to_string())] },
            ],
        }],
        actors: vec![],
    };
    let decoded = MessageScript::from_bytes(&script.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, script);
}

#[test]
fn shift_jis_text_roundtrips() {
    let script = MessageScript {
        user_id: 0,
        messages: vec![standard("JP", None, vec![Token::Text("こんにちは".to_string())])],
        actors: vec![],
    };
    let decoded = MessageScript::from_bytes(&script.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, script);
}

#[test]
fn no_actor_is_stored_as_ffff() {
    let script = MessageScript {
        user_id: 0,
        messages: vec![standard("NA", None, vec![Token::Text("x".to_string())])],
        actors: vec![],
    };
    let decoded = MessageScript::from_bytes(&script.to_bytes().unwrap()).unwrap();
    let Message::Standard { actor, .. } = &decoded.messages[0] else { panic!() };
    assert_eq!(*actor, None);
}

#[test]
fn encode_is_byte_stable() {
    let script = MessageScript {
        user_id: 1,
        messages: vec![
            standard("ONE", Some(0), vec![Token::Text("first".to_string())]),
            Message::Selection {
                name: "TWO".to_string(),
                dialogs: vec![Dialog { tokens: vec![Token::Text("pick".to_string())] }],
            },
        ],
        actors: vec!["Hero".to_string(), "Rival".to_string()],
    };
    let bytes = script.to_bytes().unwrap();
    let reencoded = MessageScript::from_bytes(&bytes).unwrap().to_bytes().unwrap();
    assert_eq!(reencoded, bytes);
}

#[test]
fn relocation_encoding_roundtrips() {
    let positions = vec![
        DATA_START + 4,
        DATA_START + 8,
        DATA_START + 0x200,
        DATA_START + 0x210,
        DATA_START + 0x25000,
    ];
    let encoded = encode_relocations(&positions, DATA_START);
    let decoded = decode_relocations(&encoded, DATA_START).unwrap();
    assert_eq!(decoded, positions);
}

#[test]
fn relocation_deltas_use_escape_coding() {
    // The first delta counts from one byte below the data start; 0x1000
    // needs the u16 escape and 0x100000 the u32 escape.
    let positions = vec![DATA_START + 4, DATA_START + 0x1004, DATA_START + 0x101004];
    let encoded = encode_relocations(&positions, DATA_START);
    assert_eq!(encoded[0], 5);
    assert_eq!(encoded[1], 0);
    assert_eq!(u16::from_le_bytes(encoded[2..4].try_into().unwrap()), 0x1000);
    assert_eq!(encoded[4], 0);
    assert_eq!(u16::from_le_bytes(encoded[5..7].try_into().unwrap()), 0);
    assert_eq!(
        u32::from_le_bytes(encoded[7..11].try_into().unwrap()),
        0x100000
    );
    assert_eq!(decode_relocations(&encoded, DATA_START).unwrap(), positions);
}

#[test]
fn relocation_at_data_start_is_representable() {
    let encoded = encode_relocations(&[DATA_START], DATA_START);
    assert_eq!(encoded, vec![1]);
    assert_eq!(decode_relocations(&encoded, DATA_START).unwrap(), vec![DATA_START]);
}

#[test]
fn empty_message_list_keeps_actor_table_relocation() {
    // With no messages the actor table offset field sits exactly at the
    // data start; its relocation entry must still be emitted.
    let script = MessageScript {
        user_id: 0,
        messages: vec![],
        actors: vec!["Hero".to_string()],
    };
    let bytes = script.to_bytes().unwrap();
    let reloc_offset = u32::from_le_bytes(bytes[0x10..0x14].try_into().unwrap()) as usize;
    let decoded = decode_relocations(&bytes[reloc_offset..], DATA_START).unwrap();
    assert_eq!(decoded[0], DATA_START);
    assert_eq!(decoded.len(), 2, "actor table field plus one name offset field");
    assert_eq!(MessageScript::from_bytes(&bytes).unwrap(), script);
}

#[test]
fn reloc_header_fields_are_patched() {
    let script = MessageScript {
        user_id: 0,
        messages: vec![standard("R", None, vec![Token::Text("r".to_string())])],
        actors: vec![],
    };
    let bytes = script.to_bytes().unwrap();
    let reloc_offset = u32::from_le_bytes(bytes[0x10..0x14].try_into().unwrap()) as usize;
    let reloc_size = u32::from_le_bytes(bytes[0x14..0x18].try_into().unwrap()) as usize;
    assert!(reloc_size > 0);
    assert_eq!(reloc_offset + reloc_size, bytes.len());
    let decoded = decode_relocations(&bytes[reloc_offset..], DATA_START).unwrap();
    // First patched field is the message offset at 0x24.
    assert_eq!(decoded[0], 0x24);
}

#[test]
fn unknown_message_kind_is_not_implemented() {
    let script = MessageScript {
        user_id: 0,
        messages: vec![standard("K", None, vec![Token::Text("k".to_string())])],
        actors: vec![],
    };
    let mut bytes = script.to_bytes().unwrap();
    // Corrupt the message kind in the pointer table.
    bytes[0x20] = 9;
    let err = MessageScript::from_bytes(&bytes).unwrap_err();
    let codec = err
        .root_cause()
        .downcast_ref::<amicitia_codecs::CodecError>()
        .unwrap();
    assert!(matches!(codec, amicitia_codecs::CodecError::NotImplemented(_)));
}
