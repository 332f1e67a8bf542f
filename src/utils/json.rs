use serde::de::DeserializeOwned;
use serde_json::Value;

/// A PATCH field: absent, explicitly null, or carrying a value.
pub enum NullableValue<T> {
    Omitted,
    Null,
    Value(T),
}

impl<T> NullableValue<T> {
    pub fn is_omitted(&self) -> bool {
        matches!(self, NullableValue::Omitted)
    }

    /// `None` when omitted, `Some(None)` when cleared.
    pub fn into_change(self) -> Option<Option<T>> {
        match self {
            NullableValue::Omitted => None,
            NullableValue::Null => Some(None),
            NullableValue::Value(value) => Some(Some(value)),
        }
    }
}

pub fn classify_nullable<T: DeserializeOwned>(
    body: &Value,
    field: &str,
) -> Result<NullableValue<T>, String> {
    match body.get(field) {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(value) => serde_json::from_value(value.clone())
            .map(NullableValue::Value)
            .map_err(|err| format!("invalid {field}: {err}")),
    }
}

/// A field that may be omitted but never null.
pub fn optional_field<T: DeserializeOwned>(body: &Value, field: &str) -> Result<Option<T>, String> {
    match classify_nullable(body, field)? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Err(format!("{field} cannot be null")),
        NullableValue::Value(value) => Ok(Some(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn distinguishes_omitted_null_and_value() {
        let body = json!({ "endDate": null, "dayOfMonth": 15 });
        assert!(classify_nullable::<String>(&body, "notes")
            .unwrap()
            .is_omitted());
        assert!(matches!(
            classify_nullable::<String>(&body, "endDate").unwrap(),
            NullableValue::Null
        ));
        assert!(matches!(
            classify_nullable::<i16>(&body, "dayOfMonth").unwrap(),
            NullableValue::Value(15)
        ));
    }

    #[test]
    fn rejects_wrong_types_and_required_nulls() {
        let body = json!({ "name": 12, "frequency": null });
        assert!(classify_nullable::<String>(&body, "name").is_err());
        assert_eq!(
            optional_field::<String>(&body, "frequency").unwrap_err(),
            "frequency cannot be null"
        );
    }
}
