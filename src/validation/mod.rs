//! Structural parsing of untrusted input.
//!
//! A body is first decoded into a schema struct (type errors carry the serde
//! path of the offending field, and the field is dropped before decoding
//! again), then checked against the struct's `validator` rules. The caller
//! gets every issue at once as a flat list of [`FieldIssue`]s with dotted
//! paths, ready to be surfaced verbatim.

pub mod schemas;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::ApiError;

pub use schemas::{
    CreateItemInput, LoginInput, ProfileUpdateInput, SignUpInput, UserInput,
};

/// One violated constraint, addressed by its dotted field path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Parse `value` into the schema `T`, or explain every way it does not fit
pub fn parse<T>(value: Value) -> Result<T, Vec<FieldIssue>>
where
    T: DeserializeOwned + Validate,
{
    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(vec![FieldIssue::new(
                "",
                format!("Expected object, received {}", json_kind(&other)),
            )])
        }
    };

    // Drop each mistyped key and retry so later rules still get a say
    let mut issues = Vec::new();
    let parsed = loop {
        match serde_path_to_error::deserialize::<_, T>(Value::Object(object.clone())) {
            Ok(parsed) => break Some(parsed),
            Err(err) => {
                let path = err.path().to_string();
                let field = if path == "." { String::new() } else { path };
                let key = top_level(&field).to_string();
                issues.push(FieldIssue::new(field, err.into_inner().to_string()));
                if key.is_empty() || object.remove(&key).is_none() {
                    break None;
                }
            }
        }
    };

    let Some(parsed) = parsed else {
        return Err(issues);
    };

    if let Err(errors) = parsed.validate() {
        let mistyped: Vec<String> = issues.iter().map(|i| top_level(&i.field).to_string()).collect();
        issues.extend(
            flatten(&errors)
                .into_iter()
                .filter(|issue| !mistyped.iter().any(|key| key == top_level(&issue.field))),
        );
    }

    if issues.is_empty() {
        Ok(parsed)
    } else {
        issues.sort_by(|a, b| a.field.cmp(&b.field));
        Err(issues)
    }
}

/// First segment of a dotted path, `items[0].name` -> `items`
fn top_level(path: &str) -> &str {
    path.split(['.', '[']).next().unwrap_or_default()
}

/// Flatten nested `validator` errors into sorted dotted-path issues
pub fn flatten(errors: &ValidationErrors) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    collect("", errors, &mut issues);
    issues.sort_by(|a, b| a.field.cmp(&b.field));
    issues
}

fn collect(prefix: &str, errors: &ValidationErrors, out: &mut Vec<FieldIssue>) {
    for (field, kind) in errors.errors() {
        let path = join_path(prefix, &field.to_string());
        match kind {
            ValidationErrorsKind::Field(list) => {
                out.extend(list.iter().map(|e| FieldIssue::new(path.clone(), describe(e))));
            }
            ValidationErrorsKind::Struct(inner) => collect(&path, inner, out),
            ValidationErrorsKind::List(entries) => {
                for (index, inner) in entries {
                    collect(&join_path(&path, &index.to_string()), inner, out);
                }
            }
        }
    }
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

/// Human-readable message for a single rule violation
fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }

    match error.code.as_ref() {
        "required" => "Required".to_string(),
        "email" => "Invalid email".to_string(),
        "url" => "Invalid url".to_string(),
        "length" => {
            let bound = |name: &str| error.params.get(name).and_then(|v| v.as_u64());
            let len = error
                .params
                .get("value")
                .and_then(|v| v.as_str())
                .map(|s| s.chars().count() as u64);

            match (bound("min"), bound("max"), len) {
                (Some(min), _, Some(len)) if len < min => {
                    format!("String must contain at least {} character(s)", min)
                }
                (_, Some(max), Some(len)) if len > max => {
                    format!("String must contain at most {} character(s)", max)
                }
                (Some(min), None, None) => format!("String must contain at least {} character(s)", min),
                (None, Some(max), None) => format!("String must contain at most {} character(s)", max),
                _ => "Invalid length".to_string(),
            }
        }
        other => format!("Invalid value ({})", other),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JSON body extractor that rejects with itemized validation issues
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::invalid_json(rejection.body_text()))?;

        parse(value).map(ValidatedJson).map_err(ApiError::validation)
    }
}
