use garden_walk::protocol::{classify_binary, ClientMessage, InboundFrame, ServerMessage};
use garden_walk::upstream::messages::LiveServerMessage;
use garden_walk::upstream::{Part, UpstreamCommand, UpstreamEvent};
use serde_json::json;

// ============================================================================
// Client <-> relay
// ============================================================================

#[test]
fn test_text_message_serialization() {
    let msg = ClientMessage::Text {
        text: "The leaves are curling".to_string(),
    };

    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json, json!({"type": "text", "text": "The leaves are curling"}));

    let parsed: ClientMessage = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, msg);
}

#[test]
fn test_image_message_uses_camel_case_data() {
    let msg = ClientMessage::image("data:image/jpeg;base64,/9j/4AAQ", "My fern");

    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(
        json,
        json!({"type": "image", "imageData": "/9j/4AAQ", "text": "My fern"})
    );
}

#[test]
fn test_image_message_text_is_optional() {
    let parsed: ClientMessage =
        serde_json::from_str(r#"{"type":"image","imageData":"QUJD"}"#).unwrap();
    assert_eq!(
        parsed,
        ClientMessage::Image {
            image_data: "QUJD".to_string(),
            text: None,
        }
    );
}

#[test]
fn test_server_message_shapes() {
    let cases = vec![
        (
            ServerMessage::SetupComplete {
                session_id: Some("abc".to_string()),
            },
            json!({"type": "setup_complete", "sessionId": "abc"}),
        ),
        (
            ServerMessage::SetupComplete { session_id: None },
            json!({"type": "setup_complete"}),
        ),
        (
            ServerMessage::InputTranscript {
                text: "hi".to_string(),
            },
            json!({"type": "input_transcript", "text": "hi"}),
        ),
        (ServerMessage::TurnComplete, json!({"type": "turn_complete"})),
        (ServerMessage::WalkComplete, json!({"type": "walk_complete"})),
        (
            ServerMessage::Error {
                message: "boom".to_string(),
            },
            json!({"type": "error", "message": "boom"}),
        ),
    ];

    for (message, expected) in cases {
        assert_eq!(serde_json::to_value(&message).unwrap(), expected);
        assert_eq!(message.kind(), expected["type"].as_str().unwrap());
    }
}

#[test]
fn test_control_message_in_binary_frame() {
    let bytes = serde_json::to_vec(&ServerMessage::Interrupted).unwrap();
    assert_eq!(
        classify_binary::<ServerMessage>(&bytes),
        InboundFrame::Control(ServerMessage::Interrupted)
    );

    // PCM that happens to start with '{'
    let pcm = vec![0x7B, 0x00, 0x7B, 0x00];
    assert_eq!(
        classify_binary::<ServerMessage>(&pcm),
        InboundFrame::Audio(pcm.clone())
    );
}

// ============================================================================
// Relay <-> live API
// ============================================================================

#[test]
fn test_realtime_input_wire_shape() {
    let command = UpstreamCommand::RealtimeInput(garden_walk::upstream::Blob {
        mime_type: "audio/pcm;rate=16000".to_string(),
        data: "AAEC".to_string(),
    });

    assert_eq!(
        command.to_wire(),
        json!({
            "realtimeInput": {
                "audio": {"mimeType": "audio/pcm;rate=16000", "data": "AAEC"}
            }
        })
    );
}

#[test]
fn test_client_content_wire_shape() {
    let command = UpstreamCommand::user_turn(vec![
        Part::text("Look at this"),
        Part::inline("image/jpeg", "QUJD"),
    ]);

    assert_eq!(
        command.to_wire(),
        json!({
            "clientContent": {
                "turns": [{
                    "role": "user",
                    "parts": [
                        {"text": "Look at this"},
                        {"inlineData": {"mimeType": "image/jpeg", "data": "QUJD"}}
                    ]
                }],
                "turnComplete": true
            }
        })
    );
}

#[test]
fn test_server_content_flattens_in_order() {
    let raw = json!({
        "serverContent": {
            "inputTranscription": {"text": "it's wilting"},
            "outputTranscription": {"text": "Let's see"},
            "modelTurn": {
                "parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQID"}}]
            },
            "turnComplete": true
        }
    });

    let message: LiveServerMessage = serde_json::from_value(raw).unwrap();
    assert_eq!(
        message.into_events(),
        vec![
            UpstreamEvent::InputTranscription("it's wilting".to_string()),
            UpstreamEvent::OutputTranscription("Let's see".to_string()),
            UpstreamEvent::Audio(vec![1, 2, 3]),
            UpstreamEvent::TurnComplete,
        ]
    );
}

#[test]
fn test_setup_complete_is_recognized() {
    let message: LiveServerMessage =
        serde_json::from_value(json!({"setupComplete": {"sessionId": "s-1"}})).unwrap();
    assert_eq!(
        message.into_events(),
        vec![UpstreamEvent::SetupComplete {
            session_id: Some("s-1".to_string())
        }]
    );

    let bare: LiveServerMessage = serde_json::from_value(json!({"setupComplete": {}})).unwrap();
    assert_eq!(
        bare.into_events(),
        vec![UpstreamEvent::SetupComplete { session_id: None }]
    );
}

#[test]
fn test_interruption_is_recognized() {
    let message: LiveServerMessage =
        serde_json::from_value(json!({"serverContent": {"interrupted": true}})).unwrap();
    assert_eq!(message.into_events(), vec![UpstreamEvent::Interrupted]);
}
