//! Record normalizer: one loosely typed input row in, one canonical record out.
//!
//! Cells arrive as CSV strings or as values from a flattened JSONL object.
//! A [`SchemaRules`] describes, per target field, where to read the value,
//! how to coerce it, and what to do when it is blank.

use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashSet};

use crate::error::RecordError;
use crate::record::CanonicalRecord;

/// One row of batch input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRow {
    /// 1-based line number in the source file.
    pub line: usize,
    /// Column name (CSV) or dotted path (JSONL) to raw cell value.
    pub cells: BTreeMap<String, Value>,
}

impl InputRow {
    #[must_use]
    pub fn new(line: usize) -> Self {
        Self {
            line,
            cells: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    /// Raw cell value, treating blanks as absent.
    #[must_use]
    pub fn cell(&self, column: &str) -> Option<&Value> {
        self.cells.get(column).filter(|v| !is_blank(v))
    }
}

/// How a cell value is coerced.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Trimmed string. Numbers and booleans are stringified.
    Text,
    /// `true/yes/1/y` and `false/no/0/n`; anything else falls back to
    /// `default`, or is dropped when there is none.
    Bool { default: Option<bool> },
    /// Integer if possible, float otherwise. Unparseable values are dropped.
    Number,
    /// `;`-separated string or JSON array of strings.
    List,
    /// Case-insensitive lookup; unknown values fall back to `default`.
    Mapped {
        table: BTreeMap<String, String>,
        default: Option<String>,
    },
}

/// Where one target field comes from.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    /// Input column name (CSV header).
    pub column: String,
    /// Dotted target path. Also accepted as an input key (JSONL).
    pub path: String,
    pub kind: FieldKind,
    /// A missing value fails the record.
    pub required: bool,
    /// Emitted when the value is blank.
    pub default: Option<Value>,
    /// Column consulted when this one is blank.
    pub fallback_from: Option<String>,
}

impl FieldRule {
    pub fn new(column: impl Into<String>, path: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            column: column.into(),
            path: path.into(),
            kind,
            required: false,
            default: None,
            fallback_from: None,
        }
    }

    pub fn text(column: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(column, path, FieldKind::Text)
    }

    pub fn boolean(column: impl Into<String>, path: impl Into<String>, default: bool) -> Self {
        Self::new(
            column,
            path,
            FieldKind::Bool {
                default: Some(default),
            },
        )
    }

    pub fn number(column: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(column, path, FieldKind::Number)
    }

    pub fn list(column: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(column, path, FieldKind::List)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn fallback(mut self, column: impl Into<String>) -> Self {
        self.fallback_from = Some(column.into());
        self
    }

    fn raw<'a>(&self, row: &'a InputRow) -> Option<&'a Value> {
        row.cell(&self.column).or_else(|| row.cell(&self.path))
    }
}

/// An array of objects assembled from flat columns, e.g. addresses.
///
/// One element is emitted when any of the `trigger` columns has a value. A
/// ready-made array found at `path` in the input is used as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRule {
    pub path: String,
    pub trigger: Vec<String>,
    /// Element fields; paths are relative to the element.
    pub fields: Vec<FieldRule>,
    /// Fixed values written into every element.
    pub constants: Vec<(String, Value)>,
    /// Emit `[]` when no element is built.
    pub emit_empty: bool,
}

/// Normalization rules for one resource type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaRules {
    pub fields: Vec<FieldRule>,
    pub lists: Vec<ListRule>,
    /// Copy cells no rule consumes to the record under their own key.
    pub passthrough_unknown: bool,
}

impl SchemaRules {
    /// No field rules; every non-blank cell is copied through.
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            fields: Vec::new(),
            lists: Vec::new(),
            passthrough_unknown: true,
        }
    }

    /// FOLIO `/users` shape, fed by the bulk import template columns.
    #[must_use]
    pub fn users() -> Self {
        let address_fields = vec![
            FieldRule::text("countryId", "countryId").default_value(""),
            FieldRule::text("addressLine1", "addressLine1").default_value(""),
            FieldRule::text("addressLine2", "addressLine2").default_value(""),
            FieldRule::text("city", "city").default_value(""),
            FieldRule::text("region", "region").default_value(""),
            FieldRule::text("postalCode", "postalCode").default_value(""),
            FieldRule::text("addressTypeId", "addressTypeId").default_value("Home"),
        ];

        Self {
            fields: vec![
                FieldRule::text("username", "username").required(),
                FieldRule::text("externalSystemId", "externalSystemId")
                    .fallback("username")
                    .required(),
                FieldRule::text("barcode", "barcode"),
                FieldRule::boolean("active", "active", true),
                FieldRule::text("type", "type").default_value("patron"),
                FieldRule::text("patronGroup", "patronGroup").required(),
                FieldRule::list("departments", "departments").default_value(Value::Array(vec![])),
                FieldRule::text("enrollmentDate", "enrollmentDate"),
                FieldRule::text("expirationDate", "expirationDate"),
                FieldRule::text("firstName", "personal.firstName").default_value(""),
                FieldRule::text("lastName", "personal.lastName").default_value(""),
                FieldRule::text("middleName", "personal.middleName"),
                FieldRule::text("preferredFirstName", "personal.preferredFirstName"),
                FieldRule::text("email", "personal.email"),
                FieldRule::text("phone", "personal.phone"),
                FieldRule::text("mobilePhone", "personal.mobilePhone"),
                FieldRule::text("dateOfBirth", "personal.dateOfBirth"),
                FieldRule::text("gender", "personal.gender"),
                FieldRule::new(
                    "preferredContactType",
                    "personal.preferredContactTypeId",
                    FieldKind::Mapped {
                        table: contact_type_table(),
                        default: Some("002".to_string()),
                    },
                ),
                FieldRule::list("servicePoints", "servicePointsUser.servicePointsIds"),
                FieldRule::text(
                    "defaultServicePoint",
                    "servicePointsUser.defaultServicePointId",
                ),
                FieldRule::boolean("holdShelf", "requestPreference.holdShelf", true),
                FieldRule::boolean("delivery", "requestPreference.delivery", false),
                FieldRule::text("fulfillment", "requestPreference.fulfillment")
                    .default_value("Hold Shelf"),
            ],
            lists: vec![ListRule {
                path: "personal.addresses".to_string(),
                trigger: vec!["countryId".to_string(), "addressLine1".to_string()],
                fields: address_fields,
                constants: vec![("primaryAddress".to_string(), Value::Bool(true))],
                emit_empty: true,
            }],
            passthrough_unknown: false,
        }
    }

    /// FOLIO `/departments`.
    #[must_use]
    pub fn departments() -> Self {
        Self {
            fields: vec![
                FieldRule::text("name", "name").required(),
                FieldRule::text("code", "code").required(),
            ],
            lists: Vec::new(),
            passthrough_unknown: false,
        }
    }

    /// FOLIO `/groups` (patron groups).
    #[must_use]
    pub fn patron_groups() -> Self {
        Self {
            fields: vec![
                FieldRule::text("group", "group").required(),
                FieldRule::text("desc", "desc").fallback("group"),
                FieldRule::number("expirationOffsetInDays", "expirationOffsetInDays"),
            ],
            lists: Vec::new(),
            passthrough_unknown: false,
        }
    }

    fn consumed_keys(&self) -> HashSet<&str> {
        let mut keys = HashSet::new();
        for rule in &self.fields {
            keys.insert(rule.column.as_str());
            keys.insert(rule.path.as_str());
        }
        for list in &self.lists {
            keys.insert(list.path.as_str());
            for rule in &list.fields {
                keys.insert(rule.column.as_str());
            }
        }
        keys
    }
}

/// Preferred contact type names and codes to FOLIO contact type ids.
#[must_use]
pub fn contact_type_table() -> BTreeMap<String, String> {
    [
        ("mail", "001"),
        ("email", "002"),
        ("text", "003"),
        ("phone", "004"),
        ("mobile", "005"),
    ]
    .into_iter()
    .flat_map(|(name, code)| {
        [
            (name.to_string(), code.to_string()),
            (code.to_string(), code.to_string()),
        ]
    })
    .collect()
}

/// Normalize one row.
///
/// Every string is trimmed; blank cells are dropped unless the rule carries a
/// default. A required field that ends up absent fails the row.
pub fn normalize(row: &InputRow, rules: &SchemaRules) -> Result<CanonicalRecord, RecordError> {
    let mut record = CanonicalRecord::new();

    for rule in &rules.fields {
        if let Some(value) = resolve_field(row, rule)? {
            record.insert(rule.path.clone(), value);
        }
    }

    for list in &rules.lists {
        if let Some(value) = build_list(row, list)? {
            record.insert(list.path.clone(), value);
        }
    }

    if rules.passthrough_unknown {
        let consumed = rules.consumed_keys();
        for (key, value) in &row.cells {
            if consumed.contains(key.as_str()) || record.contains(key) {
                continue;
            }
            if let Some(cleaned) = clean(value) {
                record.insert(key.clone(), cleaned);
            }
        }
    }

    Ok(record)
}

fn resolve_field(row: &InputRow, rule: &FieldRule) -> Result<Option<Value>, RecordError> {
    let mut value = rule.raw(row).and_then(|raw| coerce(&rule.kind, Some(raw)));

    if value.is_none() {
        if let Some(column) = &rule.fallback_from {
            value = row.cell(column).and_then(|raw| coerce(&rule.kind, Some(raw)));
        }
    }
    if value.is_none() {
        value = rule.default.clone();
    }
    if value.is_none() {
        // Bool and Mapped kinds carry their own blank defaults.
        value = coerce(&rule.kind, None);
    }

    if value.is_none() && rule.required {
        return Err(RecordError::Validation(format!(
            "missing required field '{}' (column '{}')",
            rule.path, rule.column
        )));
    }
    Ok(value)
}

fn build_list(row: &InputRow, list: &ListRule) -> Result<Option<Value>, RecordError> {
    if let Some(Value::Array(items)) = row.cell(&list.path) {
        let cleaned: Vec<Value> = items.iter().filter_map(clean).collect();
        return Ok(Some(Value::Array(cleaned)));
    }

    let triggered = list.trigger.iter().any(|column| row.cell(column).is_some());
    if !triggered {
        return Ok(list.emit_empty.then(|| Value::Array(Vec::new())));
    }

    let mut element = CanonicalRecord::new();
    for rule in &list.fields {
        if let Some(value) = resolve_field(row, rule)? {
            element.insert(rule.path.clone(), value);
        }
    }
    for (path, value) in &list.constants {
        element.insert(path.clone(), value.clone());
    }
    Ok(Some(Value::Array(vec![element.to_json()])))
}

/// Coerce a raw cell according to `kind`. `None` means blank input.
fn coerce(kind: &FieldKind, raw: Option<&Value>) -> Option<Value> {
    match kind {
        FieldKind::Text => raw.and_then(as_text).map(Value::String),
        FieldKind::Bool { default } => raw
            .and_then(as_bool)
            .or(*default)
            .map(Value::Bool),
        FieldKind::Number => raw.and_then(as_number).map(Value::Number),
        FieldKind::List => raw.and_then(as_list).map(Value::Array),
        FieldKind::Mapped { table, default } => raw
            .and_then(as_text)
            .and_then(|s| table.get(&s.to_lowercase()).cloned())
            .or_else(|| default.clone())
            .map(Value::String),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s.eq_ignore_ascii_case("nan")
        }
        _ => false,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && !s.eq_ignore_ascii_case("nan")).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "y" => Some(true),
            "false" | "no" | "0" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(Number::from(i));
            }
            s.parse::<f64>().ok().and_then(Number::from_f64)
        }
        _ => None,
    }
}

fn as_list(value: &Value) -> Option<Vec<Value>> {
    let items: Vec<Value> = match value {
        Value::String(s) => s
            .split(';')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(item.to_string()))
            .collect(),
        Value::Array(items) => items.iter().filter_map(clean).collect(),
        other => vec![other.clone()],
    };
    Some(items)
}

/// Trim strings and drop blanks, recursively.
fn clean(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(_) => as_text(value).map(Value::String),
        Value::Array(items) => Some(Value::Array(items.iter().filter_map(clean).collect())),
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| clean(v).map(|v| (k.clone(), v)))
                .collect();
            Some(Value::Object(cleaned))
        }
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_row() -> InputRow {
        InputRow::new(2)
            .with("username", " jdoe ")
            .with("barcode", "12345")
            .with("active", "yes")
            .with("patronGroup", "staff")
            .with("firstName", "John")
            .with("lastName", "Doe")
            .with("email", "jdoe@example.com")
            .with("preferredContactType", "Mobile")
            .with("servicePoints", "cd1; cd2;;")
            .with("holdShelf", "N")
    }

    #[test]
    fn test_users_row_is_coerced() {
        let record = normalize(&user_row(), &SchemaRules::users()).unwrap();

        assert_eq!(record.get("username"), Some(&json!("jdoe")));
        assert_eq!(record.get("externalSystemId"), Some(&json!("jdoe")));
        assert_eq!(record.get("active"), Some(&json!(true)));
        assert_eq!(record.get("type"), Some(&json!("patron")));
        assert_eq!(record.get("departments"), Some(&json!([])));
        assert_eq!(record.get("personal.preferredContactTypeId"), Some(&json!("005")));
        assert_eq!(
            record.get("servicePointsUser.servicePointsIds"),
            Some(&json!(["cd1", "cd2"]))
        );
        assert_eq!(record.get("requestPreference.holdShelf"), Some(&json!(false)));
        assert_eq!(record.get("requestPreference.delivery"), Some(&json!(false)));
        assert_eq!(
            record.get("requestPreference.fulfillment"),
            Some(&json!("Hold Shelf"))
        );
        assert_eq!(record.get("personal.addresses"), Some(&json!([])));
        assert!(!record.contains("personal.phone"));
        assert!(!record.contains("servicePointsUser.defaultServicePointId"));
    }

    #[test]
    fn test_missing_required_field_is_validation_error() {
        let mut row = user_row();
        row.cells.insert("username".into(), json!("   "));

        let err = normalize(&row, &SchemaRules::users()).unwrap_err();
        assert!(matches!(err, RecordError::Validation(ref m) if m.contains("username")));
    }

    #[test]
    fn test_external_system_id_kept_when_present() {
        let row = user_row().with("externalSystemId", "E-77");
        let record = normalize(&row, &SchemaRules::users()).unwrap();
        assert_eq!(record.get("externalSystemId"), Some(&json!("E-77")));
    }

    #[test]
    fn test_address_built_from_flat_columns() {
        let row = user_row()
            .with("addressLine1", "123 Main St")
            .with("city", "Springfield")
            .with("countryId", "nan");
        let record = normalize(&row, &SchemaRules::users()).unwrap();

        assert_eq!(
            record.get("personal.addresses"),
            Some(&json!([{
                "countryId": "",
                "addressLine1": "123 Main St",
                "addressLine2": "",
                "city": "Springfield",
                "region": "",
                "postalCode": "",
                "addressTypeId": "Home",
                "primaryAddress": true
            }]))
        );
    }

    #[test]
    fn test_jsonl_paths_are_accepted() {
        let row = InputRow::new(1)
            .with("username", "jdoe")
            .with("patronGroup", "3684a786-6671-4268-8ed0-9db82ebca60b")
            .with("personal.email", "jdoe@example.com")
            .with("departments", json!([" Math ", ""]))
            .with("personal.addresses", json!([{"city": " Rome ", "region": null}]));
        let record = normalize(&row, &SchemaRules::users()).unwrap();

        assert_eq!(record.get("personal.email"), Some(&json!("jdoe@example.com")));
        assert_eq!(record.get("departments"), Some(&json!(["Math"])));
        assert_eq!(record.get("personal.addresses"), Some(&json!([{"city": "Rome"}])));
    }

    #[test]
    fn test_number_and_bool_vocabulary() {
        let rules = SchemaRules {
            fields: vec![
                FieldRule::number("days", "days"),
                FieldRule::number("ratio", "ratio"),
                FieldRule::number("junk", "junk"),
                FieldRule::new("flag", "flag", FieldKind::Bool { default: None }),
                FieldRule::new("other", "other", FieldKind::Bool { default: None }),
            ],
            lists: Vec::new(),
            passthrough_unknown: false,
        };
        let row = InputRow::new(1)
            .with("days", "365")
            .with("ratio", "0.5")
            .with("junk", "soon")
            .with("flag", "Y")
            .with("other", "maybe");
        let record = normalize(&row, &rules).unwrap();

        assert_eq!(record.get("days"), Some(&json!(365)));
        assert_eq!(record.get("ratio"), Some(&json!(0.5)));
        assert!(!record.contains("junk"));
        assert_eq!(record.get("flag"), Some(&json!(true)));
        assert!(!record.contains("other"));
    }

    #[test]
    fn test_patron_group_desc_falls_back_to_group() {
        let row = InputRow::new(2)
            .with("group", "faculty")
            .with("expirationOffsetInDays", "730");
        let record = normalize(&row, &SchemaRules::patron_groups()).unwrap();
        assert_eq!(record.get("desc"), Some(&json!("faculty")));
        assert_eq!(record.get("expirationOffsetInDays"), Some(&json!(730)));
    }

    #[test]
    fn test_passthrough_copies_unknown_cells() {
        let row = InputRow::new(3)
            .with("externalSystemId", "u1")
            .with("email", " a@x.com ")
            .with("note", "");
        let record = normalize(&row, &SchemaRules::passthrough()).unwrap();
        assert_eq!(record.get("externalSystemId"), Some(&json!("u1")));
        assert_eq!(record.get("email"), Some(&json!("a@x.com")));
        assert!(!record.contains("note"));
    }
}
