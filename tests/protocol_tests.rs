//! Codec Tests
//!
//! Tests for command and response encoding/decoding.

use std::io::Cursor;

use cinderkv::error::CinderError;
use cinderkv::protocol::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, Command, Response, Status, HEADER_SIZE,
};

// =============================================================================
// Command Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_get() {
    let cmd = Command::Get {
        key: "hello".to_string(),
    };
    let decoded = decode_command(&encode_command(&cmd)).unwrap();

    assert_eq!(decoded, cmd);
}

#[test]
fn test_encode_decode_set() {
    let cmd = Command::Set {
        key: "mykey".to_string(),
        value: "myvalue".to_string(),
    };
    let decoded = decode_command(&encode_command(&cmd)).unwrap();

    assert_eq!(decoded, cmd);
}

#[test]
fn test_encode_decode_set_empty_value() {
    let cmd = Command::Set {
        key: "k".to_string(),
        value: String::new(),
    };
    let decoded = decode_command(&encode_command(&cmd)).unwrap();

    assert_eq!(decoded, cmd);
}

#[test]
fn test_encode_decode_remove() {
    let cmd = Command::Remove {
        key: "gone".to_string(),
    };
    let decoded = decode_command(&encode_command(&cmd)).unwrap();

    assert_eq!(decoded, cmd);
}

#[test]
fn test_encode_ping() {
    let encoded = encode_command(&Command::Ping);

    assert_eq!(encoded, vec![0x04, 0, 0, 0, 0]);
    assert_eq!(decode_command(&encoded).unwrap(), Command::Ping);
}

#[test]
fn test_get_wire_layout() {
    let encoded = encode_command(&Command::Get {
        key: "ab".to_string(),
    });

    assert_eq!(encoded, vec![0x01, 0, 0, 0, 6, 0, 0, 0, 2, b'a', b'b']);
}

// =============================================================================
// Malformed Command Tests
// =============================================================================

#[test]
fn test_unknown_command_type_rejected() {
    let bytes = [0x7f, 0, 0, 0, 0];

    assert!(matches!(decode_command(&bytes), Err(CinderError::Protocol(_))));
}

#[test]
fn test_incomplete_header_rejected() {
    assert!(matches!(
        decode_command(&[0x01, 0, 0]),
        Err(CinderError::Protocol(_))
    ));
}

#[test]
fn test_incomplete_payload_rejected() {
    let mut encoded = encode_command(&Command::Get {
        key: "hello".to_string(),
    });
    encoded.truncate(encoded.len() - 2);

    assert!(matches!(decode_command(&encoded), Err(CinderError::Protocol(_))));
}

#[test]
fn test_key_length_past_payload_rejected() {
    // GET with key_len = 10 but only 2 key bytes
    let bytes = [0x01, 0, 0, 0, 6, 0, 0, 0, 10, b'a', b'b'];

    assert!(matches!(decode_command(&bytes), Err(CinderError::Protocol(_))));
}

#[test]
fn test_invalid_utf8_key_rejected() {
    let bytes = [0x01, 0, 0, 0, 5, 0, 0, 0, 1, 0xff];

    assert!(matches!(decode_command(&bytes), Err(CinderError::Protocol(_))));
}

#[test]
fn test_trailing_bytes_after_get_rejected() {
    let bytes = [0x01, 0, 0, 0, 7, 0, 0, 0, 2, b'a', b'b', b'!'];

    assert!(matches!(decode_command(&bytes), Err(CinderError::Protocol(_))));
}

#[test]
fn test_oversized_payload_rejected() {
    let bytes = [0x02, 0xff, 0xff, 0xff, 0xff];

    assert!(matches!(decode_command(&bytes), Err(CinderError::Protocol(_))));
}

// =============================================================================
// Response Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_ok_with_value() {
    let response = Response::ok(Some("value".to_string()));
    let decoded = decode_response(&encode_response(&response)).unwrap();

    assert_eq!(decoded, response);
}

#[test]
fn test_encode_decode_ok_empty() {
    let encoded = encode_response(&Response::ok(None));

    assert_eq!(encoded.len(), HEADER_SIZE);
    assert_eq!(decode_response(&encoded).unwrap(), Response::ok(None));
}

#[test]
fn test_encode_decode_ok_with_empty_value() {
    let response = Response::ok(Some(String::new()));
    let decoded = decode_response(&encode_response(&response)).unwrap();

    assert_eq!(decoded.payload, Some(String::new()));
}

#[test]
fn test_unknown_payload_marker_rejected() {
    assert!(matches!(
        decode_response(&[0x00, 0, 0, 0, 2, 0x07, b'x']),
        Err(CinderError::Protocol(_))
    ));
}

#[test]
fn test_encode_decode_not_found() {
    let decoded = decode_response(&encode_response(&Response::not_found())).unwrap();

    assert_eq!(decoded.status, Status::NotFound);
    assert_eq!(decoded.payload, None);
}

#[test]
fn test_encode_decode_error() {
    let decoded = decode_response(&encode_response(&Response::error("boom"))).unwrap();

    assert_eq!(decoded.status, Status::Error);
    assert_eq!(decoded.payload.as_deref(), Some("boom"));
}

#[test]
fn test_unknown_status_rejected() {
    assert!(matches!(
        decode_response(&[0x09, 0, 0, 0, 0]),
        Err(CinderError::Protocol(_))
    ));
}

// =============================================================================
// Stream I/O Tests
// =============================================================================

#[test]
fn test_stream_commands_back_to_back() {
    let commands = vec![
        Command::Set {
            key: "a".to_string(),
            value: "1".to_string(),
        },
        Command::Get {
            key: "a".to_string(),
        },
        Command::Ping,
    ];

    let mut buffer = Vec::new();
    for cmd in &commands {
        write_command(&mut buffer, cmd).unwrap();
    }

    let mut cursor = Cursor::new(buffer);
    for expected in &commands {
        assert_eq!(&read_command(&mut cursor).unwrap(), expected);
    }

    assert!(matches!(read_command(&mut cursor), Err(CinderError::Io(_))));
}

#[test]
fn test_stream_unknown_command_consumes_message() {
    let mut buffer = vec![0x7f, 0, 0, 0, 3, b'x', b'y', b'z'];
    write_command(&mut buffer, &Command::Ping).unwrap();

    let mut cursor = Cursor::new(buffer);
    assert!(matches!(read_command(&mut cursor), Err(CinderError::Protocol(_))));
    assert_eq!(read_command(&mut cursor).unwrap(), Command::Ping);
}

#[test]
fn test_stream_response() {
    let mut buffer = Vec::new();
    write_response(&mut buffer, &Response::ok(Some("PONG".to_string()))).unwrap();

    let response = read_response(&mut Cursor::new(buffer)).unwrap();
    assert_eq!(response.status, Status::Ok);
    assert_eq!(response.payload.as_deref(), Some("PONG"));
}
