//! JSON wire codec for [`Task`].
//!
//! Wire shape: `{"documentRoot": string, "serverName": string, "failedCount": integer?}`.
//! Unknown fields are ignored; an absent or `null` `failedCount` decodes as 0.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{CodecError, CodecResult};
use crate::task::Task;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTask {
    document_root: String,
    server_name: String,
    #[serde(default)]
    failed_count: Option<u32>,
}

/// Decode a delivery payload into a task.
///
/// Fails with [`CodecError::MalformedPayload`] when the payload is not a JSON
/// object, when `documentRoot`/`serverName` are missing or empty, or when
/// `failedCount` is not a non-negative integer.
pub fn decode(bytes: &[u8]) -> CodecResult<Task> {
    let value: JsonValue =
        serde_json::from_slice(bytes).map_err(|e| CodecError::malformed(e.to_string()))?;

    // Derived struct impls also accept JSON arrays; only objects are tasks.
    if !value.is_object() {
        return Err(CodecError::malformed("expected a JSON object"));
    }

    let wire: WireTask =
        serde_json::from_value(value).map_err(|e| CodecError::malformed(e.to_string()))?;

    if wire.document_root.is_empty() {
        return Err(CodecError::malformed("documentRoot must not be empty"));
    }
    if wire.server_name.is_empty() {
        return Err(CodecError::malformed("serverName must not be empty"));
    }

    Ok(Task {
        document_root: wire.document_root,
        server_name: wire.server_name,
        failed_count: wire.failed_count.unwrap_or(0),
    })
}

/// Best-effort decode for payloads [`decode`] rejects.
///
/// Every field that parses is kept, `failedCount` included, so a task that
/// keeps failing still walks towards its retry budget. Fields that are
/// absent or of the wrong type fall back to their zero value; a payload that
/// is not a JSON object decodes as [`Task::default`].
pub fn decode_lenient(bytes: &[u8]) -> Task {
    let Ok(JsonValue::Object(fields)) = serde_json::from_slice::<JsonValue>(bytes) else {
        return Task::default();
    };

    let text = |key: &str| {
        fields
            .get(key)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let failed_count = fields
        .get("failedCount")
        .and_then(JsonValue::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);

    Task {
        document_root: text("documentRoot"),
        server_name: text("serverName"),
        failed_count,
    }
}

/// Encode a task as compact JSON (deterministic field order).
pub fn encode(task: &Task) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(task).map_err(|e| CodecError::encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decodes_full_payload() {
        let task =
            decode(br#"{"documentRoot":"/var/www/a","serverName":"srv-a","failedCount":3}"#)
                .unwrap();

        assert_eq!(task, Task::new("/var/www/a", "srv-a").with_failed_count(3));
    }

    #[test]
    fn absent_or_null_failed_count_defaults_to_zero() {
        let absent = decode(br#"{"documentRoot":"/d","serverName":"s"}"#).unwrap();
        let null = decode(br#"{"documentRoot":"/d","serverName":"s","failedCount":null}"#).unwrap();

        assert_eq!(absent.failed_count, 0);
        assert_eq!(null.failed_count, 0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let task = decode(br#"{"documentRoot":"/d","serverName":"s","owner":"x"}"#).unwrap();
        assert_eq!(task, Task::new("/d", "s"));
    }

    #[test]
    fn rejects_malformed_payloads() {
        let cases: [&[u8]; 7] = [
            b"not json",
            b"",
            br#"["/d","s",0]"#,
            br#"{"serverName":"s"}"#,
            br#"{"documentRoot":"","serverName":"s"}"#,
            br#"{"documentRoot":"/d","serverName":"s","failedCount":-1}"#,
            br#"{"documentRoot":"/d","serverName":"s","failedCount":"2"}"#,
        ];

        for payload in cases {
            let err = decode(payload).unwrap_err();
            assert!(
                err.is_malformed(),
                "expected malformed for {:?}",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn lenient_decode_keeps_fields_that_parse() {
        let task = decode_lenient(br#"{"documentRoot":"/d","failedCount":3}"#);
        assert_eq!(task, Task::new("/d", "").with_failed_count(3));

        let task = decode_lenient(br#"{"documentRoot":"","serverName":"s","failedCount":4}"#);
        assert_eq!(task, Task::new("", "s").with_failed_count(4));
    }

    #[test]
    fn lenient_decode_zeroes_fields_of_the_wrong_type() {
        let task = decode_lenient(br#"{"documentRoot":7,"serverName":"s","failedCount":"2"}"#);
        assert_eq!(task, Task::new("", "s"));

        let task = decode_lenient(br#"{"serverName":"s","failedCount":-1}"#);
        assert_eq!(task.failed_count, 0);
    }

    #[test]
    fn lenient_decode_of_non_object_is_default() {
        for payload in [&b"{not json"[..], b"", br#"["/d","s",0]"#, b"null"] {
            assert_eq!(decode_lenient(payload), Task::default());
        }
    }

    #[test]
    fn encode_matches_wire_layout() {
        let task = Task::new("/var/www/a", "srv-a").with_failed_count(1);

        assert_eq!(
            encode(&task).unwrap(),
            br#"{"documentRoot":"/var/www/a","serverName":"srv-a","failedCount":1}"#.to_vec()
        );
    }

    #[test]
    fn encode_of_decoded_canonical_payload_is_identical() {
        let wire = br#"{"documentRoot":"/var/www/a","serverName":"srv-a","failedCount":0}"#;
        assert_eq!(encode(&decode(wire).unwrap()).unwrap(), wire.to_vec());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: decode(encode(t)) == t for every valid task.
        #[test]
        fn decode_inverts_encode(
            document_root in "[ -~]{1,64}",
            server_name in "[a-z0-9][a-z0-9.-]{0,62}",
            failed_count in any::<u32>(),
        ) {
            let task = Task::new(document_root, server_name).with_failed_count(failed_count);
            let bytes = encode(&task).unwrap();

            prop_assert_eq!(decode(&bytes).unwrap(), task);
        }
    }
}
