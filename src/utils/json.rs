use serde::Serializer;

/// Serialize non-finite floats as JSON null so downstream consumers never see
/// NaN or Inf in emitted rows.
pub fn nan_as_null<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_none()
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    #[derive(Serialize)]
    struct Row {
        #[serde(serialize_with = "super::nan_as_null")]
        price: f64,
    }

    #[test]
    fn test_nan_becomes_null() {
        let json = serde_json::to_string(&Row { price: f64::NAN }).unwrap();
        assert_eq!(json, r#"{"price":null}"#);

        let json = serde_json::to_string(&Row { price: 101.5 }).unwrap();
        assert_eq!(json, r#"{"price":101.5}"#);
    }
}
