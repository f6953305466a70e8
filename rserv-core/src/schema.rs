//! Schema registry and document validation.
//!
//! Each entity may have a descriptor file `schema/<schema>/<entity>.json`
//! mapping field names to a field descriptor. Descriptors are modelled as a
//! tagged variant per type rather than a deep hierarchy. Entities without a
//! descriptor are schema-less: writes skip validation and reference fields
//! are detected from their value shape alone.

use crate::error::{Error, Result};
use crate::paths::{list_schema_files, Layout};
use crate::value::{parse_refs, DocId, JsonMap, NodeRef};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Which validation rules apply to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateMode {
    /// Full document on POST
    Create,
    /// Full document on PUT / save
    Replace,
    /// Partial document on PATCH: only provided fields are checked
    Patch,
}

/// A foreign-key target: referenced entity and key field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referenced entity
    pub entity: String,
    /// Key field in the referenced entity (always `id` today)
    pub field: String,
}

/// Type-specific constraints, one variant per recognized type.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// UTF-8 string with optional length and pattern bounds
    String {
        /// Maximum length in characters
        max_length: Option<usize>,
        /// Anchored pattern the value must match
        regex: Option<Regex>,
    },
    /// Integer with optional range bounds
    Integer {
        /// Inclusive lower bound
        min: Option<i64>,
        /// Inclusive upper bound
        max: Option<i64>,
    },
    /// Float (integers accepted) with optional range bounds
    Float {
        /// Inclusive lower bound
        min: Option<f64>,
        /// Inclusive upper bound
        max: Option<f64>,
    },
    /// Boolean
    Boolean,
    /// ISO-8601 datetime string
    Datetime,
    /// `YYYY-MM-DD` date string
    Date,
    /// Reference to another document; becomes a directed edge
    Ref(ForeignKey),
    /// JSON array
    List,
    /// JSON object
    Mapping,
}

impl FieldType {
    fn name(&self) -> &'static str {
        match self {
            FieldType::String { .. } => "string",
            FieldType::Integer { .. } => "integer",
            FieldType::Float { .. } => "float",
            FieldType::Boolean => "boolean",
            FieldType::Datetime => "datetime",
            FieldType::Date => "date",
            FieldType::Ref(_) => "REF",
            FieldType::List => "list",
            FieldType::Mapping => "mapping",
        }
    }
}

/// One field's descriptor.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Type and its constraints
    pub ty: FieldType,
    /// Field must be present on create/replace
    pub required: bool,
    /// Enforced by linear scan at write time
    pub unique: bool,
    /// At most one per schema; defaults to `id`
    pub primary_key: bool,
    /// Scalar foreign key on a non-REF field (the value is the target id)
    pub foreign_key: Option<ForeignKey>,
}

/// An entity's schema: field name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Field descriptors in name order
    pub fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    /// Parse a descriptor file's JSON body.
    pub fn from_json(entity: &str, value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| schema_err(entity, "descriptor must be a JSON object"))?;
        let mut fields = BTreeMap::new();
        let mut primary_keys = 0usize;

        for (name, descriptor) in obj {
            let descriptor = descriptor
                .as_object()
                .ok_or_else(|| schema_err(entity, &format!("field {name} must be an object")))?;
            let spec = parse_field(entity, name, descriptor)?;
            if spec.primary_key {
                primary_keys += 1;
            }
            fields.insert(name.clone(), spec);
        }

        if primary_keys > 1 {
            return Err(schema_err(entity, "more than one primary_key field"));
        }
        Ok(Self { fields })
    }

    /// Fields declared `REF`, with their targets.
    pub fn ref_fields(&self) -> impl Iterator<Item = (&str, &ForeignKey)> {
        self.fields.iter().filter_map(|(name, spec)| match &spec.ty {
            FieldType::Ref(fk) => Some((name.as_str(), fk)),
            _ => None,
        })
    }
}

fn parse_field(
    entity: &str,
    name: &str,
    descriptor: &JsonMap,
) -> Result<FieldSpec> {
    let type_name = descriptor
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| schema_err(entity, &format!("field {name} has no type")))?;

    let foreign_key = parse_foreign_key(descriptor)?;

    let ty = match type_name {
        "string" => FieldType::String {
            max_length: descriptor
                .get("max_length")
                .and_then(Value::as_u64)
                .map(|n| n as usize),
            regex: match descriptor.get("regex").and_then(Value::as_str) {
                Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                    schema_err(entity, &format!("field {name} has invalid regex: {e}"))
                })?),
                None => None,
            },
        },
        "integer" => FieldType::Integer {
            min: descriptor.get("min").and_then(Value::as_i64),
            max: descriptor.get("max").and_then(Value::as_i64),
        },
        "float" => FieldType::Float {
            min: descriptor.get("min").and_then(Value::as_f64),
            max: descriptor.get("max").and_then(Value::as_f64),
        },
        "boolean" => FieldType::Boolean,
        "datetime" => FieldType::Datetime,
        "date" => FieldType::Date,
        "REF" => {
            let fk = match (
                descriptor.get("entity").and_then(Value::as_str),
                foreign_key.clone(),
            ) {
                (Some(target), _) => ForeignKey {
                    entity: target.to_string(),
                    field: descriptor
                        .get("field")
                        .and_then(Value::as_str)
                        .unwrap_or("id")
                        .to_string(),
                },
                (None, Some(fk)) => fk,
                (None, None) => {
                    return Err(schema_err(
                        entity,
                        &format!("REF field {name} names no target entity"),
                    ))
                }
            };
            FieldType::Ref(fk)
        }
        "list" => FieldType::List,
        // `json` is the original descriptor spelling for structured values
        "mapping" | "json" => FieldType::Mapping,
        other => {
            return Err(schema_err(
                entity,
                &format!("field {name} has unknown type {other}"),
            ))
        }
    };

    Ok(FieldSpec {
        foreign_key: match ty {
            // REF carries its target in the type itself
            FieldType::Ref(_) => None,
            _ => foreign_key,
        },
        ty,
        required: descriptor
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        unique: descriptor
            .get("unique")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        primary_key: descriptor
            .get("primary_key")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn parse_foreign_key(descriptor: &JsonMap) -> Result<Option<ForeignKey>> {
    let Some(fk) = descriptor.get("foreign_key") else {
        return Ok(None);
    };
    let obj = fk
        .as_object()
        .ok_or_else(|| Error::validation("foreign_key must be an object"))?;
    let entity = obj
        .get("entity")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::validation("foreign_key names no entity"))?;
    Ok(Some(ForeignKey {
        entity: entity.to_string(),
        field: obj
            .get("field")
            .and_then(Value::as_str)
            .unwrap_or("id")
            .to_string(),
    }))
}

fn schema_err(entity: &str, msg: &str) -> Error {
    Error::Storage(format!("schema {entity}: {msg}"))
}

/// Store-side lookups the validator needs for foreign-key and uniqueness
/// checks. Implemented by the document store.
pub trait StoreProbe {
    /// Does the document `entity/id` exist right now?
    fn document_exists(&self, entity: &str, id: DocId) -> Result<bool>;

    /// Does any other document in `entity` already hold `value` in `field`?
    fn field_value_taken(
        &self,
        entity: &str,
        field: &str,
        value: &Value,
        excluding_id: DocId,
    ) -> Result<bool>;
}

/// All loaded schemas for the active schema name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaRegistry {
    /// Load every `schema/<schema>/<entity>.json` present.
    pub fn load(layout: &Layout) -> Result<Self> {
        let mut schemas = BTreeMap::new();
        for (entity, path) in list_schema_files(&layout.schema_dir())? {
            let value = crate::fsio::read_json(&path)?;
            schemas.insert(entity.clone(), Schema::from_json(&entity, &value)?);
        }
        Ok(Self { schemas })
    }

    /// Build a registry from in-memory schemas (tests).
    pub fn from_schemas(schemas: BTreeMap<String, Schema>) -> Self {
        Self { schemas }
    }

    /// Schema for an entity, if declared.
    pub fn get(&self, entity: &str) -> Option<&Schema> {
        self.schemas.get(entity)
    }

    /// Entities with a declared schema, in name order.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Validate a document and return its normalised form.
    ///
    /// On success every REF field declared in the schema is normalised to
    /// the short form `{"id": n}` (or a list of them). On failure the full
    /// list of field-level problems is returned, not just the first.
    pub fn validate(
        &self,
        entity: &str,
        doc: &JsonMap,
        mode: ValidateMode,
        probe: &dyn StoreProbe,
    ) -> Result<JsonMap> {
        let Some(schema) = self.schemas.get(entity) else {
            // Schema-less entity: store as-is
            return Ok(doc.clone());
        };

        let doc_id = doc.get("id").and_then(Value::as_u64).unwrap_or(0);
        let mut errors = Vec::new();
        let mut normalised = doc.clone();

        for (field, spec) in &schema.fields {
            let Some(value) = doc.get(field) else {
                if spec.required && mode != ValidateMode::Patch {
                    errors.push(format!("Missing required field: {field}"));
                }
                continue;
            };
            // A null in a patch body is a deletion/store marker, not a value
            if mode == ValidateMode::Patch && value.is_null() {
                continue;
            }

            match check_field(field, spec, value, probe) {
                Ok(Some(replacement)) => {
                    normalised.insert(field.clone(), replacement);
                }
                Ok(None) => {}
                Err(mut field_errors) => errors.append(&mut field_errors),
            }

            if spec.unique {
                match probe.field_value_taken(entity, field, value, doc_id) {
                    Ok(true) => errors.push(format!("Field {field} must be unique")),
                    Ok(false) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        if errors.is_empty() {
            Ok(normalised)
        } else {
            Err(Error::Validation { details: errors })
        }
    }

    /// `(field_name, target)` for every reference in the document.
    ///
    /// Covers REF-declared fields (short or long form) and long-form inline
    /// references in any other field, the only shape detectable without a
    /// declaration.
    pub fn references_of(&self, entity: &str, doc: &JsonMap) -> Vec<(String, NodeRef)> {
        let schema = self.schemas.get(entity);
        let mut refs = Vec::new();
        for (field, value) in doc {
            let declared = schema.and_then(|s| match &s.fields.get(field).map(|f| &f.ty) {
                Some(FieldType::Ref(fk)) => Some(fk.entity.as_str()),
                _ => None,
            });
            for r in parse_refs(value) {
                // Inline refs must carry their own entity when undeclared
                if let Some(target) = r.target(declared) {
                    refs.push((field.clone(), target));
                }
            }
        }
        refs
    }

    /// Static `(source_entity, source_field)` pairs whose schema references
    /// `target_entity`. Drives cascade deletion.
    pub fn referrers_of(&self, target_entity: &str) -> Vec<(String, String)> {
        let mut referrers = Vec::new();
        for (entity, schema) in &self.schemas {
            for (field, spec) in &schema.fields {
                let points_at_target = match &spec.ty {
                    FieldType::Ref(fk) => fk.entity == target_entity,
                    _ => spec
                        .foreign_key
                        .as_ref()
                        .is_some_and(|fk| fk.entity == target_entity),
                };
                if points_at_target {
                    referrers.push((entity.clone(), field.clone()));
                }
            }
        }
        referrers
    }
}

/// Check one field value. `Ok(Some(v))` replaces the stored value with a
/// normalised form; `Err` carries the field-level messages.
fn check_field(
    field: &str,
    spec: &FieldSpec,
    value: &Value,
    probe: &dyn StoreProbe,
) -> std::result::Result<Option<Value>, Vec<String>> {
    let mut errors = Vec::new();

    match &spec.ty {
        FieldType::String { max_length, regex } => {
            let Some(s) = value.as_str() else {
                return Err(vec![format!("Field {field} must be a string")]);
            };
            if let Some(max) = max_length {
                if s.chars().count() > *max {
                    errors.push(format!("Field {field} exceeds maximum length of {max}"));
                }
            }
            if let Some(re) = regex {
                if !re.is_match(s) {
                    errors.push(format!(
                        "Field {field} does not match the required pattern: {re}"
                    ));
                }
            }
        }
        FieldType::Integer { min, max } => {
            let Some(n) = value.as_i64() else {
                return Err(vec![format!("Field {field} must be an integer")]);
            };
            check_range(field, n as f64, min.map(|m| m as f64), max.map(|m| m as f64), &mut errors);
        }
        FieldType::Float { min, max } => {
            let Some(n) = value.as_f64() else {
                return Err(vec![format!("Field {field} must be a number")]);
            };
            check_range(field, n, *min, *max, &mut errors);
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                errors.push(format!("Field {field} must be a boolean"));
            }
        }
        FieldType::Datetime => {
            let ok = value.as_str().is_some_and(|s| {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
                    || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
            });
            if !ok {
                errors.push(format!(
                    "Field {field} must be a valid ISO format datetime string"
                ));
            }
        }
        FieldType::Date => {
            let ok = value
                .as_str()
                .is_some_and(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok());
            if !ok {
                errors.push(format!(
                    "Field {field} must be a valid date string in YYYY-MM-DD format"
                ));
            }
        }
        FieldType::Ref(fk) => {
            return check_ref_field(field, fk, value, probe);
        }
        FieldType::List => {
            if !value.is_array() {
                errors.push(format!("Field {field} must be a list"));
            }
        }
        FieldType::Mapping => {
            if !value.is_object() && !value.is_array() {
                errors.push(format!("Field {field} must be a JSON object or array"));
            }
        }
    }

    // Scalar foreign key: the raw value is the target id
    if let Some(fk) = &spec.foreign_key {
        match value.as_u64() {
            Some(id) => match probe.document_exists(&fk.entity, id) {
                Ok(true) => {}
                Ok(false) => errors.push(format!(
                    "Foreign key constraint failed: {} with {}={} does not exist",
                    fk.entity, fk.field, id
                )),
                Err(e) => errors.push(e.to_string()),
            },
            None => errors.push(format!("Field {field} must be a {} id", fk.entity)),
        }
    }

    if errors.is_empty() {
        Ok(None)
    } else {
        Err(errors)
    }
}

/// Validate one REF value (or list of them) and produce the normalised form.
fn check_ref_field(
    field: &str,
    fk: &ForeignKey,
    value: &Value,
    probe: &dyn StoreProbe,
) -> std::result::Result<Option<Value>, Vec<String>> {
    let mut errors = Vec::new();

    let normalise_one = |item: &Value, errors: &mut Vec<String>| -> Option<Value> {
        let Some(r) = crate::value::parse_ref(item) else {
            errors.push(format!(
                "Field {field} must be a reference value {{\"id\": n}}"
            ));
            return None;
        };
        if let Some(declared) = &r.entity {
            if declared != &fk.entity {
                errors.push(format!(
                    "Field {field} references entity {declared}, expected {}",
                    fk.entity
                ));
                return None;
            }
        }
        match probe.document_exists(&fk.entity, r.id) {
            Ok(true) => Some(crate::value::normalize_ref(r.id)),
            Ok(false) => {
                errors.push(format!(
                    "Foreign key constraint failed: {} with {}={} does not exist",
                    fk.entity, fk.field, r.id
                ));
                None
            }
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        }
    };

    let normalised = match value {
        Value::Array(items) => {
            let normalised: Vec<Value> = items
                .iter()
                .filter_map(|item| normalise_one(item, &mut errors))
                .collect();
            Value::Array(normalised)
        }
        other => match normalise_one(other, &mut errors) {
            Some(v) => v,
            None => Value::Null,
        },
    };

    if errors.is_empty() {
        Ok(Some(normalised))
    } else {
        Err(errors)
    }
}

fn check_range(
    field: &str,
    value: f64,
    min: Option<f64>,
    max: Option<f64>,
    errors: &mut Vec<String>,
) {
    if let Some(min) = min {
        if value < min {
            errors.push(format!(
                "Field {field} must be greater than or equal to {min}"
            ));
        }
    }
    if let Some(max) = max {
        if value > max {
            errors.push(format!("Field {field} must be less than or equal to {max}"));
        }
    }
}
