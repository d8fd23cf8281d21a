//! JSON codec bound to the `Database` kind.
//!
//! There is exactly one resource kind, so the kind → decoder mapping is a
//! fixed set of functions instead of a runtime type registry. Decoding
//! checks `apiVersion`/`kind` when the payload carries them and fills them
//! in when it does not (list items usually omit them).

use crate::database::{api_version, Database, DatabaseList, KIND, LIST_KIND};
use crate::error::{CodecError, CodecResult};
use crate::meta::{ObjectMeta, TypeMeta};
use crate::status::Status;
use crate::watch::{EventType, WatchEvent, WatchFrame};

/// Decodes a single object.
pub fn decode_object(bytes: &[u8]) -> CodecResult<Database> {
    let object: Database = serde_json::from_slice(bytes)?;
    validate_object(object)
}

/// Decodes a list response.
pub fn decode_list(bytes: &[u8]) -> CodecResult<DatabaseList> {
    let mut list: DatabaseList = serde_json::from_slice(bytes)?;
    check_type(&mut list.type_meta, LIST_KIND)?;
    list.items = list
        .items
        .into_iter()
        .map(validate_object)
        .collect::<CodecResult<Vec<_>>>()?;
    Ok(list)
}

/// Decodes a `Status` body.
pub fn decode_status(bytes: &[u8]) -> CodecResult<Status> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Decodes one watch frame (one line of the watch stream).
pub fn decode_event(bytes: &[u8]) -> CodecResult<WatchEvent<Database>> {
    let frame: WatchFrame = serde_json::from_slice(bytes)?;
    let event_type: EventType = frame.event_type.parse()?;

    let event = match event_type {
        EventType::Added => WatchEvent::Added(object_from_value(frame.object)?),
        EventType::Modified => WatchEvent::Modified(object_from_value(frame.object)?),
        EventType::Deleted => WatchEvent::Deleted(object_from_value(frame.object)?),
        EventType::Bookmark => {
            let object: Database = serde_json::from_value(frame.object)?;
            let version = object
                .metadata
                .resource_version
                .ok_or_else(|| CodecError::decoding_failed("bookmark without resourceVersion"))?;
            WatchEvent::Bookmark(version)
        }
        EventType::Error => WatchEvent::Error(serde_json::from_value(frame.object)?),
    };
    Ok(event)
}

/// Encodes a single object.
pub fn encode_object(object: &Database) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(object).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Encodes a list response.
pub fn encode_list(list: &DatabaseList) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(list).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Encodes a `Status` body.
pub fn encode_status(status: &Status) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(status).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Encodes one watch frame, without the trailing newline.
pub fn encode_event(event: &WatchEvent<Database>) -> CodecResult<Vec<u8>> {
    let object = match event {
        WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
            serde_json::to_value(obj)
        }
        WatchEvent::Bookmark(version) => {
            let marker = Database {
                type_meta: TypeMeta::new(api_version(), KIND),
                metadata: ObjectMeta {
                    resource_version: Some(version.clone()),
                    ..Default::default()
                },
                spec: Default::default(),
            };
            serde_json::to_value(marker)
        }
        WatchEvent::Error(status) => serde_json::to_value(status),
    }
    .map_err(|e| CodecError::encoding_failed(e.to_string()))?;

    let frame = WatchFrame {
        event_type: event.event_type().as_str().to_string(),
        object,
    };
    serde_json::to_vec(&frame).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

fn object_from_value(value: serde_json::Value) -> CodecResult<Database> {
    validate_object(serde_json::from_value(value)?)
}

fn validate_object(mut object: Database) -> CodecResult<Database> {
    check_type(&mut object.type_meta, KIND)?;
    if object.metadata.name.is_empty() {
        return Err(CodecError::MissingName);
    }
    Ok(object)
}

fn check_type(type_meta: &mut TypeMeta, kind: &str) -> CodecResult<()> {
    let expected_version = api_version();

    if type_meta.api_version.is_empty() {
        type_meta.api_version = expected_version;
    } else if type_meta.api_version != expected_version {
        return Err(CodecError::UnexpectedApiVersion {
            expected: expected_version,
            actual: type_meta.api_version.clone(),
        });
    }

    if type_meta.kind.is_empty() {
        type_meta.kind = kind.to_string();
    } else if type_meta.kind != kind {
        return Err(CodecError::UnexpectedKind {
            expected: kind.to_string(),
            actual: type_meta.kind.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseSpec;
    use crate::meta::ListMeta;

    const LIST_JSON: &str = r#"{
        "apiVersion": "resource.donald.com/v1",
        "kind": "DatabaseList",
        "metadata": { "resourceVersion": "1207" },
        "items": [
            { "metadata": { "name": "mysql", "resourceVersion": "1200" },
              "spec": { "dbName": "mysql", "total": 100, "available": 50, "dbType": "SQL" } },
            { "metadata": { "name": "mongodb", "resourceVersion": "1205" },
              "spec": { "dbName": "mongodb", "total": 100, "available": 70, "dbType": "noSQL" } }
        ]
    }"#;

    #[test]
    fn decode_list_fills_item_type_meta() {
        let list = decode_list(LIST_JSON.as_bytes()).unwrap();
        assert_eq!(list.metadata.resource_version, Some("1207".into()));
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].type_meta.kind, "Database");
        assert_eq!(list.items[1].spec.available, 70);
    }

    #[test]
    fn decode_rejects_other_kinds() {
        let err = decode_object(
            br#"{"apiVersion":"v1","kind":"Pod","metadata":{"name":"p"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedApiVersion { .. }));

        let err = decode_object(
            br#"{"apiVersion":"resource.donald.com/v1","kind":"Table","metadata":{"name":"t"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedKind { .. }));
    }

    #[test]
    fn decode_requires_name() {
        let err = decode_object(br#"{"metadata":{},"spec":{}}"#).unwrap_err();
        assert_eq!(err, CodecError::MissingName);
    }

    #[test]
    fn decode_garbage_is_decoding_error() {
        assert!(matches!(
            decode_object(b"<html>").unwrap_err(),
            CodecError::DecodingFailed { .. }
        ));
    }

    #[test]
    fn event_frames() {
        let db = Database::new(
            "mysql",
            DatabaseSpec {
                db_name: "mysql".into(),
                total: 100,
                available: 40,
                db_type: "SQL".into(),
                ..Default::default()
            },
        );
        let bytes = encode_event(&WatchEvent::Modified(db.clone())).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with(r#"{"type":"MODIFIED""#));
        assert_eq!(decode_event(&bytes).unwrap(), WatchEvent::Modified(db));

        let bytes = encode_event(&WatchEvent::Error(Status::expired("too old"))).unwrap();
        match decode_event(&bytes).unwrap() {
            WatchEvent::Error(status) => assert_eq!(status.code, 410),
            other => panic!("unexpected event {:?}", other),
        }

        let bytes = encode_event(&WatchEvent::Bookmark("99".into())).unwrap();
        assert_eq!(
            decode_event(&bytes).unwrap(),
            WatchEvent::Bookmark("99".into())
        );
    }

    #[test]
    fn unknown_event_type() {
        let err = decode_event(br#"{"type":"RENAMED","object":{}}"#).unwrap_err();
        assert_eq!(err, CodecError::UnknownEventType("RENAMED".into()));
    }

    #[test]
    fn list_roundtrip_keeps_watermark() {
        let list = DatabaseList::new(vec![], ListMeta {
            resource_version: Some("5".into()),
            continue_token: None,
        });
        let decoded = decode_list(&encode_list(&list).unwrap()).unwrap();
        assert_eq!(decoded, list);
    }
}
