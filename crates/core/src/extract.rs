use serde_json::{Map, Value};

use crate::errors::ActionError;

/// Recovers the JSON object embedded in free-form agent output.
///
/// Agent replies often wrap the object in prose, so the slice between the
/// first `{` and the last `}` is decoded when both exist in that order;
/// otherwise the whole text is decoded.
pub fn extract_action_object(text: &str) -> Result<Map<String, Value>, ActionError> {
    let candidate = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    };

    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ActionError::Unparseable(format!(
            "expected a JSON object, found {}",
            json_type_name(&other)
        ))),
        Err(error) => Err(ActionError::Unparseable(error.to_string())),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::extract_action_object;
    use crate::errors::{ActionError, ErrorKind};

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let text = "Here is the result: {\"type\":\"payment_link\",\"product\":\"Widget\",\"amount\":10} Thanks!";

        let object = extract_action_object(text).expect("embedded object");
        assert_eq!(
            serde_json::Value::Object(object),
            json!({"type": "payment_link", "product": "Widget", "amount": 10})
        );
    }

    #[test]
    fn keeps_nested_braces_between_first_and_last() {
        let text = "```json\n{\"type\":\"payment_link\",\"meta\":{\"a\":1},\"amount\":5}\n```";

        let object = extract_action_object(text).expect("nested object");
        assert_eq!(object["meta"], json!({"a": 1}));
    }

    #[test]
    fn text_without_braces_fails() {
        let error = extract_action_object("I could not find an account id in that request.")
            .expect_err("no object");
        assert_eq!(error.kind(), ErrorKind::UnparseableAction);

        let error = extract_action_object("42").expect_err("number is not an object");
        assert!(matches!(error, ActionError::Unparseable(ref message) if message.contains("a number")));
    }

    #[test]
    fn reversed_braces_fall_back_to_whole_text() {
        let error = extract_action_object("} nothing here {").expect_err("unparseable");
        assert_eq!(error.kind(), ErrorKind::UnparseableAction);
    }
}
