// JSON document encoding for stored values.
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

/// A stored document: a JSON object keyed by column name.
pub type Document = Map<String, Value>;

pub fn encode(document: &Document) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(document).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode document")
            .with_source(err)
    })
}

/// Decode stored bytes; anything other than a top-level JSON object is `Corrupt`.
pub fn decode(bytes: &[u8]) -> Result<Document, Error> {
    let value: Value = serde_json::from_slice(bytes).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message("stored value is not valid JSON")
            .with_source(err)
    })?;
    match value {
        Value::Object(document) => Ok(document),
        other => Err(Error::new(ErrorKind::Corrupt).with_message(format!(
            "stored value is a JSON {}, expected an object",
            json_type_name(&other)
        ))),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, encode};
    use crate::core::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn nested_document_round_trips() {
        let document = json!({
            "id": 7,
            "status": 1,
            "ratio": 0.25,
            "tags": ["a", "b"],
            "owner": {"name": "ops", "active": true},
            "note": null,
        });
        let document = document.as_object().expect("object").clone();
        let bytes = encode(&document).expect("encode");
        assert_eq!(decode(&bytes).expect("decode"), document);
    }

    #[test]
    fn invalid_json_is_corrupt() {
        let err = decode(b"not-json").expect_err("decode should fail");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn non_object_json_is_corrupt() {
        for raw in [&b"[1,2]"[..], b"42", b"\"text\"", b"null"] {
            let err = decode(raw).expect_err("non-object should fail");
            assert_eq!(err.kind(), ErrorKind::Corrupt);
        }
    }
}
