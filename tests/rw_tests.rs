use amicitia_codecs::rw::{RwNode, NODE_CLUMP, NODE_FRAME_LIST, NODE_GEOMETRY_LIST};
use amicitia_codecs::Resource;

const VERSION: u32 = 0x1803FFFF;

#[test]
fn clump_roundtrips_nested_children() {
    let clump = RwNode::Composite {
        node_id: NODE_CLUMP,
        version: VERSION,
        children: vec![
            RwNode::Struct { version: VERSION, data: vec![1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0] },
            RwNode::Composite {
                node_id: NODE_FRAME_LIST,
                version: VERSION,
                children: vec![RwNode::Struct { version: VERSION, data: vec![0; 4] }],
            },
            RwNode::Composite {
                node_id: NODE_GEOMETRY_LIST,
                version: VERSION,
                children: vec![RwNode::Struct { version: VERSION, data: vec![0; 4] }],
            },
        ],
    };
    let bytes = clump.to_bytes().unwrap();
    let decoded = RwNode::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, clump);
}

#[test]
fn header_size_excludes_header() {
    let node = RwNode::Struct { version: VERSION, data: vec![0xAB; 20] };
    let bytes = node.to_bytes().unwrap();
    assert_eq!(bytes.len(), 12 + 20);
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 20);
}

#[test]
fn string_body_is_padded_to_four_bytes() {
    let node = RwNode::String { version: VERSION, value: "abcd".to_string() };
    let bytes = node.to_bytes().unwrap();
    // "abcd" + terminator, padded to the next 4-byte boundary.
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 8);
    let decoded = RwNode::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, node);
}

#[test]
fn unknown_node_id_is_preserved_raw() {
    let raw = RwNode::Raw { node_id: 0x0253F2FE, version: VERSION, data: vec![9, 8, 7] };
    let clump = RwNode::Composite {
        node_id: NODE_CLUMP,
        version: VERSION,
        children: vec![raw.clone()],
    };
    let decoded = RwNode::from_bytes(&clump.to_bytes().unwrap()).unwrap();
    let RwNode::Composite { children, .. } = &decoded else { panic!("expected composite") };
    assert_eq!(children[0], raw);
}

#[test]
fn truncated_child_is_invalid_data() {
    let clump = RwNode::Composite { node_id: NODE_CLUMP, version: VERSION, children: vec![] };
    let mut bytes = clump.to_bytes().unwrap();
    // Declare 8 body bytes holding less than one child header.
    bytes[4..8].copy_from_slice(&8u32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 8]);
    let err = RwNode::from_bytes(&bytes).unwrap_err();
    let codec = err
        .root_cause()
        .downcast_ref::<amicitia_codecs::CodecError>()
        .unwrap();
    assert!(matches!(codec, amicitia_codecs::CodecError::InvalidData(_)));
}

#[test]
fn body_overrun_fails() {
    let node = RwNode::Struct { version: VERSION, data: vec![1, 2, 3, 4] };
    let mut bytes = node.to_bytes().unwrap();
    // Claim more body bytes than the stream holds.
    bytes[4..8].copy_from_slice(&100u32.to_le_bytes());
    assert!(RwNode::from_bytes(&bytes).is_err());
}
