use super::*;

fn round_trip(message: &Message) -> Message {
    let text = encode(message).expect("encode should succeed");
    decode(&text).expect("decode should succeed")
}

fn sample_node(name: &str, node_id: u32) -> NodeRef {
    NodeRef {
        name: name.to_owned(),
        extras: NodeExtras { node_id },
    }
}

fn sample_marker() -> Marker {
    Marker {
        id: 4,
        origin: Vec3::new(0.5, 1.0, -2.0),
        end: Vec3::new(0.5, 0.0, -2.0),
        color: Rgb::new(1.0, 0.0, 0.0),
    }
}

// =============================================================
// Round-trip law, one case per vocabulary entry
// =============================================================

#[test]
fn set_user_round_trips() {
    let msg = Message::new(
        0,
        Command::SetUser(UserPayload {
            user_id: 3,
            color: Rgb::new(1.0, 0.0, 0.0),
        }),
    );
    assert_eq!(round_trip(&msg), msg);
}

#[test]
fn new_and_remove_user_round_trip() {
    let new = Message::new(
        0,
        Command::NewUser(UserPayload {
            user_id: 7,
            color: Rgb::new(0.0, 0.5, 1.0),
        }),
    );
    let remove = Message::new(0, Command::RemoveUser(UserIdPayload { user_id: 7 }));
    assert_eq!(round_trip(&new), new);
    assert_eq!(round_trip(&remove), remove);
}

#[test]
fn select_and_deselect_round_trip() {
    let select = Message::new(
        3,
        Command::Select(NodesPayload {
            nodes: vec![sample_node("Cube.001", 12)],
        }),
    );
    let deselect = Message::new(
        3,
        Command::Deselect(NodesPayload {
            nodes: vec![sample_node("Cube.001", 12)],
        }),
    );
    assert_eq!(round_trip(&select), select);
    assert_eq!(round_trip(&deselect), deselect);
}

#[test]
fn update_transform_round_trips() {
    let msg = Message::new(
        5,
        Command::UpdateTransform(TransformsPayload {
            nodes: vec![NodeTransform {
                name: "Cube.001".to_owned(),
                matrix: Mat4::from_translation(1.0, 2.0, 3.0),
                extras: NodeExtras { node_id: 12 },
            }],
        }),
    );
    assert_eq!(round_trip(&msg), msg);
}

#[test]
fn update_camera_round_trips() {
    let msg = Message::new(
        3,
        Command::UpdateCamera(CameraPayload {
            view_matrix: Mat4::from_translation(0.0, 1.5, 4.0),
        }),
    );
    assert_eq!(round_trip(&msg), msg);
}

#[test]
fn pointer_commands_round_trip() {
    let start = Message::new(2, Command::StartPointer);
    let update = Message::new(
        2,
        Command::UpdatePointer(PointerPayload {
            pointer: PointerRay {
                origin: Vec3::new(0.0, 1.0, 0.0),
                end: Vec3::new(0.0, 0.0, -3.0),
            },
        }),
    );
    let end = Message::new(2, Command::EndPointer);
    assert_eq!(round_trip(&start), start);
    assert_eq!(round_trip(&update), update);
    assert_eq!(round_trip(&end), end);
}

#[test]
fn marker_commands_round_trip() {
    let add = Message::new(2, Command::AddMarker(MarkerPayload { marker: sample_marker() }));
    let delete = Message::new(
        2,
        Command::DeleteMarker(MarkerRefPayload {
            marker: MarkerRef { id: 4 },
        }),
    );
    assert_eq!(round_trip(&add), add);
    assert_eq!(round_trip(&delete), delete);
}

#[test]
fn primitive_commands_round_trip() {
    let add = Message::new(
        9,
        Command::AddPrimitive(PrimitivePayload {
            primitive: PrimitiveSpec {
                kind: "Sphere".to_owned(),
                matrix: Some(Mat4::IDENTITY),
                name: None,
            },
        }),
    );
    let delete = Message::new(
        9,
        Command::DeletePrimitive(PrimitiveRefPayload {
            primitive_id: "Sphere.001".to_owned(),
        }),
    );
    assert_eq!(round_trip(&add), add);
    assert_eq!(round_trip(&delete), delete);
}

// =============================================================
// Boundary payloads
// =============================================================

#[test]
fn empty_node_list_round_trips() {
    let msg = Message::new(1, Command::Select(NodesPayload { nodes: vec![] }));
    assert_eq!(round_trip(&msg), msg);
}

#[test]
fn zero_matrix_round_trips() {
    let msg = Message::new(
        1,
        Command::UpdateCamera(CameraPayload {
            view_matrix: Mat4::ZERO,
        }),
    );
    assert_eq!(round_trip(&msg), msg);
}

#[test]
fn maximal_sender_id_round_trips() {
    let msg = Message::new(u32::MAX, Command::StartPointer);
    assert_eq!(round_trip(&msg), msg);
}

// =============================================================
// Wire shape
// =============================================================

#[test]
fn encoded_frame_uses_wire_field_names() {
    let msg = Message::new(
        3,
        Command::SetUser(UserPayload {
            user_id: 3,
            color: Rgb::new(1.0, 0.0, 0.0),
        }),
    );
    let value: Value =
        serde_json::from_str(&encode(&msg).expect("encode")).expect("frame is json");

    assert_eq!(value["senderId"], 3);
    assert_eq!(value["command"], "SET_USER");
    assert_eq!(value["userId"], 3);
    assert_eq!(value["color"], serde_json::json!([1.0, 0.0, 0.0]));
}

#[test]
fn select_wire_shape_nests_node_id_in_extras() {
    let msg = Message::new(
        3,
        Command::Select(NodesPayload {
            nodes: vec![sample_node("Cube.001", 12)],
        }),
    );
    let value: Value =
        serde_json::from_str(&encode(&msg).expect("encode")).expect("frame is json");

    assert_eq!(value["nodes"][0]["name"], "Cube.001");
    assert_eq!(value["nodes"][0]["extras"]["nodeId"], 12);
}

#[test]
fn primitive_spec_uses_type_key_and_omits_absent_fields() {
    let msg = Message::new(
        9,
        Command::AddPrimitive(PrimitivePayload {
            primitive: PrimitiveSpec {
                kind: "Sphere".to_owned(),
                matrix: None,
                name: None,
            },
        }),
    );
    let value: Value =
        serde_json::from_str(&encode(&msg).expect("encode")).expect("frame is json");

    assert_eq!(value["primitive"]["type"], "Sphere");
    assert!(value["primitive"].get("matrix").is_none());
    assert!(value["primitive"].get("name").is_none());
}

// =============================================================
// Unknown and malformed frames
// =============================================================

#[test]
fn unknown_tag_decodes_into_unknown_with_raw_payload() {
    let text = r#"{"senderId": 4, "command": "WAVE_HANDS", "intensity": 11}"#;
    let msg = decode(text).expect("unknown tags decode successfully");

    assert_eq!(msg.sender_id, 4);
    let Command::Unknown { command, payload } = msg.command else {
        panic!("expected Command::Unknown, got {:?}", msg.command);
    };
    assert_eq!(command, "WAVE_HANDS");
    assert_eq!(payload["intensity"], 11);
}

#[test]
fn unknown_command_refuses_to_encode() {
    let msg = Message::new(
        4,
        Command::Unknown {
            command: "WAVE_HANDS".to_owned(),
            payload: serde_json::json!({}),
        },
    );
    let err = encode(&msg).expect_err("unknown commands must not encode");
    assert!(matches!(err, CodecError::UnknownCommand(tag) if tag == "WAVE_HANDS"));
}

#[test]
fn malformed_json_is_a_typed_error() {
    let err = decode("{not json").expect_err("should fail");
    assert!(matches!(err, CodecError::Malformed(_)));
}

#[test]
fn non_object_frame_is_rejected() {
    let err = decode("[1, 2, 3]").expect_err("should fail");
    assert!(matches!(err, CodecError::NotAnObject));
}

#[test]
fn missing_sender_id_is_rejected() {
    let err = decode(r#"{"command": "START_POINTER"}"#).expect_err("should fail");
    assert!(matches!(err, CodecError::MissingField("senderId")));
}

#[test]
fn missing_command_is_rejected() {
    let err = decode(r#"{"senderId": 1}"#).expect_err("should fail");
    assert!(matches!(err, CodecError::MissingField("command")));
}

#[test]
fn sender_id_beyond_u32_is_rejected() {
    let err = decode(r#"{"senderId": 4294967296, "command": "START_POINTER"}"#)
        .expect_err("should fail");
    assert_eq!(err.to_string(), "sender id out of range: 4294967296");
}

#[test]
fn negative_sender_id_is_out_of_range_not_missing() {
    let err = decode(r#"{"senderId": -1, "command": "START_POINTER"}"#).expect_err("should fail");
    assert_eq!(err.to_string(), "sender id out of range: -1");
}

#[test]
fn non_numeric_sender_id_is_rejected_as_missing() {
    let err = decode(r#"{"senderId": "one", "command": "START_POINTER"}"#).expect_err("should fail");
    assert!(matches!(err, CodecError::MissingField("senderId")));
}

#[test]
fn known_tag_with_bad_payload_is_a_payload_error() {
    let err = decode(r#"{"senderId": 1, "command": "SET_USER", "userId": "three"}"#)
        .expect_err("should fail");
    assert!(matches!(err, CodecError::Payload { command, .. } if command == "SET_USER"));
}

#[test]
fn command_tags_match_the_wire_vocabulary() {
    assert_eq!(Message::new(0, Command::StartPointer).command.tag(), "START_POINTER");
    assert_eq!(
        Command::Unknown {
            command: "LATER_THING".to_owned(),
            payload: Value::Null,
        }
        .tag(),
        "LATER_THING"
    );
}
