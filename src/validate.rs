//! Schema validation for bulk uploads.
//!
//! A batch is either accepted whole or rejected whole: once any item produces a
//! [`FieldError`], [`ValidationResult::valid_records`] is empty. Structural
//! problems with the payload itself surface as [`ShapeError`] instead.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::Read;
use std::ops::RangeInclusive;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

pub type NormalizedRecord = Map<String, Value>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("expected a JSON array of records, found {found}")]
    NotAnArray { found: &'static str },

    #[error("item {index} must be an object, found {found}")]
    NotAnObject { index: usize, found: &'static str },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("batch rejected with {} validation errors", .0.len())]
    Invalid(Vec<FieldError>),

    #[error("item {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A single problem with one field of one item. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub index: usize,
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts_with: Option<usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    pub valid_records: Vec<NormalizedRecord>,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldConstraint {
    /// Case-insensitive match, rewritten to the listed spelling.
    OneOf(&'static [&'static str]),
    IntRange(RangeInclusive<i64>),
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    pub lowercase: bool,
    pub constraint: Option<FieldConstraint>,
}

impl FieldSpec {
    fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            lowercase: false,
            constraint: None,
        }
    }

    fn optional(name: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name)
        }
    }

    fn lowercased(mut self) -> Self {
        self.lowercase = true;
        self
    }

    fn with(mut self, constraint: FieldConstraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
    /// Field whose normalized value must be unique within one batch.
    pub unique_key: Option<&'static str>,
}

pub const FACULTY_ROLES: &[&str] = &["faculty", "hod"];
pub const SUBJECT_TYPES: &[&str] = &["Theory", "Practical", "Tutorial"];

impl RecordSchema {
    pub fn faculty_account() -> Self {
        Self {
            name: "faculty-account",
            fields: vec![
                FieldSpec::required("name"),
                FieldSpec::required("email").lowercased(),
                FieldSpec::required("password"),
                FieldSpec::required("role").with(FieldConstraint::OneOf(FACULTY_ROLES)),
                FieldSpec::optional("designation"),
                FieldSpec::optional("specialization"),
                FieldSpec::optional("highestQualification"),
                FieldSpec::optional("experience"),
                FieldSpec::optional("phone"),
            ],
            unique_key: Some("email"),
        }
    }

    pub fn subject_allocation() -> Self {
        Self {
            name: "subject-allocation",
            fields: vec![
                FieldSpec::required("fullName"),
                FieldSpec::required("program"),
                FieldSpec::required("year"),
                FieldSpec::required("department"),
                FieldSpec::required("subjectName"),
                FieldSpec::required("subjectCode"),
                FieldSpec::required("subjectType").with(FieldConstraint::OneOf(SUBJECT_TYPES)),
                FieldSpec::optional("specialization"),
            ],
            unique_key: None,
        }
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|f| f.required).map(|f| f.name)
    }
}

enum Cell {
    Missing,
    Invalid(&'static str),
    Text(String),
}

fn read_cell(value: Option<&Value>) -> Cell {
    match value {
        None | Some(Value::Null) => Cell::Missing,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Cell::Missing
            } else {
                Cell::Text(trimmed.to_string())
            }
        }
        Some(Value::Number(n)) => Cell::Text(n.to_string()),
        Some(other) => Cell::Invalid(type_name(other)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn apply_constraint(constraint: &FieldConstraint, text: String) -> Result<String, String> {
    match constraint {
        FieldConstraint::OneOf(options) => options
            .iter()
            .find(|option| option.eq_ignore_ascii_case(&text))
            .map(|option| option.to_string())
            .ok_or_else(|| format!("must be one of: {}", options.join(", "))),
        FieldConstraint::IntRange(range) => {
            let value: i64 = text
                .parse()
                .map_err(|_| format!("must be a whole number, got '{text}'"))?;
            if range.contains(&value) {
                Ok(value.to_string())
            } else {
                Err(format!(
                    "must be between {} and {}",
                    range.start(),
                    range.end()
                ))
            }
        }
    }
}

fn field_error(index: usize, field: &str, message: impl Into<String>) -> FieldError {
    FieldError {
        index,
        field: field.to_string(),
        message: message.into(),
        conflicts_with: None,
    }
}

pub fn validate(raw: &Value, schema: &RecordSchema) -> Result<ValidationResult, ShapeError> {
    let items = raw.as_array().ok_or(ShapeError::NotAnArray {
        found: type_name(raw),
    })?;

    let mut objects = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item.as_object() {
            Some(object) => objects.push(object),
            None => {
                return Err(ShapeError::NotAnObject {
                    index: i + 1,
                    found: type_name(item),
                })
            }
        }
    }

    let mut errors = Vec::new();
    let mut records = Vec::with_capacity(objects.len());
    let mut seen_keys: HashMap<String, usize> = HashMap::new();

    for (i, object) in objects.into_iter().enumerate() {
        let index = i + 1;
        let mut record = Map::new();

        for spec in &schema.fields {
            let text = match read_cell(object.get(spec.name)) {
                Cell::Missing => {
                    if spec.required {
                        let message = format!("{} is required", spec.name);
                        errors.push(field_error(index, spec.name, message));
                    }
                    continue;
                }
                Cell::Invalid(found) => {
                    errors.push(field_error(
                        index,
                        spec.name,
                        format!("{} must be a string, found {found}", spec.name),
                    ));
                    continue;
                }
                Cell::Text(text) if spec.lowercase => text.to_lowercase(),
                Cell::Text(text) => text,
            };

            let normalized = match &spec.constraint {
                Some(constraint) => match apply_constraint(constraint, text) {
                    Ok(value) => value,
                    Err(reason) => {
                        let message = format!("{} {reason}", spec.name);
                        errors.push(field_error(index, spec.name, message));
                        continue;
                    }
                },
                None => text,
            };
            record.insert(spec.name.to_string(), Value::String(normalized));
        }

        if let Some(key_field) = schema.unique_key {
            if let Some(Value::String(key)) = record.get(key_field) {
                match seen_keys.entry(key.trim().to_lowercase()) {
                    Entry::Occupied(entry) => {
                        let first = *entry.get();
                        errors.push(FieldError {
                            conflicts_with: Some(first),
                            ..field_error(
                                index,
                                key_field,
                                format!(
                                    "duplicate {key_field} '{}', also used by item {first}",
                                    entry.key()
                                ),
                            )
                        });
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(index);
                    }
                }
            }
        }

        records.push(record);
    }

    if !errors.is_empty() {
        info!(
            schema = schema.name,
            items = records.len(),
            errors = errors.len(),
            "bulk batch rejected"
        );
        return Ok(ValidationResult {
            valid_records: Vec::new(),
            errors,
        });
    }

    debug!(schema = schema.name, items = records.len(), "bulk batch accepted");
    Ok(ValidationResult {
        valid_records: records,
        errors,
    })
}

/// Validates and decodes a batch into typed records in one step.
pub fn parse_batch<T: DeserializeOwned>(
    raw: &Value,
    schema: &RecordSchema,
) -> Result<Vec<T>, ImportError> {
    let result = validate(raw, schema)?;
    if !result.is_accepted() {
        return Err(ImportError::Invalid(result.errors));
    }

    result
        .valid_records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            serde_json::from_value(Value::Object(record)).map_err(|source| ImportError::Decode {
                index: i + 1,
                source,
            })
        })
        .collect()
}

/// Reads spreadsheet-style CSV (header row first) into the same JSON array
/// shape accepted by [`validate`]. Every cell becomes a string.
pub fn records_from_csv<R: Read>(reader: R) -> Result<Value, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let object: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| (header.clone(), Value::String(cell.to_string())))
            .collect();
        rows.push(Value::Object(object));
    }

    Ok(Value::Array(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FacultyAccount, SubjectAllocation};
    use serde_json::json;

    fn faculty(name: &str, email: &str) -> Value {
        json!({ "name": name, "email": email, "password": "secret123", "role": "faculty" })
    }

    #[test]
    fn one_bad_item_rejects_the_whole_batch() {
        let mut items: Vec<Value> = (1..=5)
            .map(|i| faculty(&format!("Prof {i}"), &format!("prof{i}@college.edu")))
            .collect();
        items[2]["role"] = json!("dean");

        let result = validate(&Value::Array(items), &RecordSchema::faculty_account()).unwrap();
        assert!(result.valid_records.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].index, 3);
        assert_eq!(result.errors[0].field, "role");
    }

    #[test]
    fn duplicate_email_ignores_case_and_whitespace() {
        let items = json!([
            faculty("Asha Rao", "asha.rao@college.edu"),
            faculty("Ben Ode", "ben@college.edu"),
            faculty("Asha R.", "  Asha.Rao@College.EDU "),
        ]);
        let result = validate(&items, &RecordSchema::faculty_account()).unwrap();
        assert!(result.valid_records.is_empty());
        assert_eq!(result.errors.len(), 1);
        let error = &result.errors[0];
        assert_eq!(error.index, 3);
        assert_eq!(error.field, "email");
        assert_eq!(error.conflicts_with, Some(1));
        assert!(error.message.contains("item 1"));
    }

    #[test]
    fn allocation_scenario_reports_each_blank_field() {
        let items = json!([
            {"fullName": "A", "program": "MBA", "year": "1", "department": "Mktg",
             "subjectName": "X", "subjectCode": "C1", "subjectType": "Theory"},
            {"fullName": "A", "program": "MBA", "year": "", "department": "Mktg",
             "subjectName": "Y", "subjectCode": "", "subjectType": "Theory"}
        ]);
        let result = validate(&items, &RecordSchema::subject_allocation()).unwrap();
        assert!(result.valid_records.is_empty());
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().all(|e| e.index == 2));
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["year", "subjectCode"]);
    }

    #[test]
    fn collects_errors_across_all_items() {
        let items = json!([
            {"name": "", "email": "a@x.edu", "password": "p", "role": "hod"},
            {"name": "B", "password": "p", "role": "dean", "experience": "3.5"},
            {"name": "C", "email": "c@x.edu", "password": true, "role": "faculty"}
        ]);
        let result = validate(&items, &RecordSchema::faculty_account()).unwrap();
        let summary: Vec<(usize, &str)> = result
            .errors
            .iter()
            .map(|e| (e.index, e.field.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![(1, "name"), (2, "email"), (2, "role"), (3, "password")]
        );
        assert!(result.errors[3].message.contains("a boolean"));
    }

    #[test]
    fn accepted_batch_is_normalized_in_order() {
        let items = json!([
            {"name": "  Asha Rao ", "email": " ASHA@College.edu", "password": "pw",
             "role": "HOD", "experience": 12, "phone": "   ", "nickname": "ash"},
            faculty("Ben Ode", "ben@college.edu"),
        ]);
        let result = validate(&items, &RecordSchema::faculty_account()).unwrap();
        assert!(result.is_accepted());
        assert_eq!(result.valid_records.len(), 2);

        let first = &result.valid_records[0];
        assert_eq!(first["name"], json!("Asha Rao"));
        assert_eq!(first["email"], json!("asha@college.edu"));
        assert_eq!(first["role"], json!("hod"));
        assert_eq!(first["experience"], json!("12"));
        assert!(!first.contains_key("phone"));
        assert!(!first.contains_key("nickname"));
        assert_eq!(result.valid_records[1]["name"], json!("Ben Ode"));
    }

    #[test]
    fn subject_type_gets_canonical_casing() {
        let items = json!([{"fullName": "A", "program": "BBA", "year": 2, "department": "Fin",
            "subjectName": "Ledgers", "subjectCode": "F2", "subjectType": "practical"}]);
        let batch: Vec<SubjectAllocation> =
            parse_batch(&items, &RecordSchema::subject_allocation()).unwrap();
        assert_eq!(batch[0].subject_type, "Practical");
        assert_eq!(batch[0].year, "2");
        assert_eq!(batch[0].specialization, None);
    }

    #[test]
    fn shape_errors_are_distinct() {
        let schema = RecordSchema::faculty_account();
        assert_eq!(
            validate(&json!({"name": "x"}), &schema).unwrap_err(),
            ShapeError::NotAnArray { found: "an object" }
        );
        assert_eq!(
            validate(&json!([faculty("A", "a@x.edu"), "oops"]), &schema).unwrap_err(),
            ShapeError::NotAnObject { index: 2, found: "a string" }
        );

        let err = parse_batch::<FacultyAccount>(&json!("nope"), &schema).unwrap_err();
        assert!(matches!(err, ImportError::Shape(_)));
    }

    #[test]
    fn parse_batch_returns_every_error() {
        let items = json!([faculty("A", "a@x.edu"), faculty("B", "")]);
        match parse_batch::<FacultyAccount>(&items, &RecordSchema::faculty_account()) {
            Err(ImportError::Invalid(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].index, 2);
            }
            other => panic!("expected invalid batch, got {other:?}"),
        }
    }

    #[test]
    fn empty_array_is_accepted_and_empty() {
        let result = validate(&json!([]), &RecordSchema::subject_allocation()).unwrap();
        assert!(result.is_accepted());
        assert!(result.valid_records.is_empty());
    }

    #[test]
    fn csv_rows_become_json_objects() {
        let data = "fullName,program,year,department,subjectName,subjectCode,subjectType\n\
                    A,MBA,1,Mktg,X,C1,Theory\n\
                    A,MBA,,Mktg,Y,C2,Tutorial\n";
        let raw = records_from_csv(data.as_bytes()).unwrap();
        assert_eq!(raw.as_array().map(Vec::len), Some(2));

        let result = validate(&raw, &RecordSchema::subject_allocation()).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "year");
    }

    #[test]
    fn year_is_free_form_text() {
        let items = json!([
            {"fullName": "A", "program": "BCom", "year": "FY", "department": "Acc",
             "subjectName": "Audit", "subjectCode": "A1", "subjectType": "Theory"},
            {"fullName": "B", "program": "BCom", "year": 2.0, "department": "Acc",
             "subjectName": "Tax", "subjectCode": "A2", "subjectType": "Tutorial"},
            {"fullName": "C", "program": "BCom", "year": " I ", "department": "Acc",
             "subjectName": "Law", "subjectCode": "A3", "subjectType": "Theory"}
        ]);
        let result = validate(&items, &RecordSchema::subject_allocation()).unwrap();
        assert!(result.is_accepted(), "unexpected errors: {:?}", result.errors);
        assert_eq!(result.valid_records[0]["year"], json!("FY"));
        assert_eq!(result.valid_records[1]["year"], json!("2.0"));
        assert_eq!(result.valid_records[2]["year"], json!("I"));
    }

    #[test]
    fn experience_keeps_spreadsheet_wording() {
        let mut fractional = faculty("Asha Rao", "asha@college.edu");
        fractional["experience"] = json!("3.5");
        let mut worded = faculty("Ben Ode", "ben@college.edu");
        worded["experience"] = json!("5 years");

        let batch: Vec<FacultyAccount> =
            parse_batch(&json!([fractional, worded]), &RecordSchema::faculty_account()).unwrap();
        assert_eq!(batch[0].experience.as_deref(), Some("3.5"));
        assert_eq!(batch[1].experience.as_deref(), Some("5 years"));
    }

    #[test]
    fn int_range_constraint_checks_bounds() {
        let range = FieldConstraint::IntRange(1..=4);
        assert_eq!(apply_constraint(&range, "3".to_string()), Ok("3".to_string()));
        assert_eq!(
            apply_constraint(&range, "9".to_string()),
            Err("must be between 1 and 4".to_string())
        );
        assert!(apply_constraint(&range, "three".to_string()).is_err());
    }

    #[test]
    fn required_fields_follow_schema() {
        let required: Vec<&str> = RecordSchema::faculty_account().required_fields().collect();
        assert_eq!(required, vec!["name", "email", "password", "role"]);
    }
}
