//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, helpers to extract and
//! validate JSON bodies in handlers, and path parameter parsing.

use axum::extract::rejection::JsonRejection;
use axum::Json;

use depot_core::DeploymentId;

use crate::error::AppError;

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
///     // use req...
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Parse a `{id}` path segment into a [`DeploymentId`].
pub fn deployment_id(raw: &str) -> Result<DeploymentId, AppError> {
    raw.parse::<DeploymentId>().map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Named {
        name: String,
    }

    impl Validate for Named {
        fn validate(&self) -> Result<(), String> {
            if self.name.trim().is_empty() {
                return Err("name must not be empty".into());
            }
            Ok(())
        }
    }

    #[test]
    fn validated_json_passes_valid_values() {
        let named = extract_validated_json(Ok(Json(Named { name: "kit".into() }))).unwrap();
        assert_eq!(named.name, "kit");
    }

    #[test]
    fn validated_json_rejects_invalid_values() {
        let err = extract_validated_json(Ok(Json(Named { name: " ".into() }))).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("name")));
    }

    #[test]
    fn deployment_id_parses_uuid() {
        let id = DeploymentId::new();
        assert_eq!(deployment_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            deployment_id("not-a-uuid"),
            Err(AppError::Validation(_))
        ));
    }
}
