//! Loading, validating and normalizing the JSON configuration.
//!
//! Two shapes of unit configuration exist. The legacy shape is a single rule group placed
//! directly under the unit, while the current shape maps rule group keys (`default`,
//! `crossbank`, …) to rule groups, next to an optional `template_selector`. Field mappings
//! also come in two shapes, `{"source": "target"}` and
//! `{"template column": {"source_column": …, "target_column": …, "transform": …}}`.
//! Both are resolved here, once, into [`RuleGroup`], and nothing downstream ever looks at
//! raw JSON.

use crate::column::ColumnTarget;
use crate::transform::{self, TransformKind};
use crate::validate::{self, DataType, RangeRule};
use crate::value::CellValue;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Could not read configuration file at '{}'", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration file at '{}' is not valid JSON", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Configuration is missing the required key '{key}'")]
    MissingKey { key: &'static str },
    #[error("{scope}: {message}")]
    Invalid { scope: String, message: String },
    #[error("{scope}: '{key}' is malformed")]
    Malformed {
        scope: String,
        key: String,
        source: serde_json::Error,
    },
    #[error("Unit '{unit}' is not configured")]
    UnknownUnit { unit: String },
    #[error("start_row ({start_row}) must be greater than header_row ({header_row})")]
    StartRowNotAfterHeader { header_row: usize, start_row: usize },
    #[error("The data region of rows {start_row}..={end_row} must contain start_row {data_start_row}")]
    ClearWindowMisplaced {
        start_row: usize,
        end_row: usize,
        data_start_row: usize,
    },
    #[error("{rows} rows do not fit into the {capacity} rows of the data region and '{format}' templates do not support inserting rows")]
    ClearWindowTooSmall {
        rows: usize,
        capacity: usize,
        format: String,
    },
}

pub const DEFAULT_RULE_GROUP: &str = "default";
/// The rule group used for the rows the template selector does not route to the default bank.
pub const SPECIAL_RULE_GROUP: &str = "crossbank";
pub const DEFAULT_BANK_COLUMN: &str = "开户银行";
pub const DEFAULT_SALARY_COLUMN: &str = "实发工资";
pub const DEFAULT_MONTH_FORMAT: &str = "{month}月收入";
pub const BONUS_MONTH: &str = "年终奖";
pub const COMPENSATION_MONTH: &str = "补偿金";

#[derive(Debug, Clone)]
pub struct Config {
    pub version: String,
    /// Units in the order of the file.
    pub units: Vec<(String, UnitConfig)>,
}

#[derive(Debug, Clone)]
pub struct UnitConfig {
    pub name: String,
    /// Rule groups in the order of the file, a legacy unit has exactly one keyed `default`.
    pub groups: Vec<(String, RuleGroup)>,
    pub selector: SelectorConfig,
    pub legacy: bool,
}

/// One template with everything needed to fill it.
#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub template_path: PathBuf,
    pub header_row: usize,
    pub start_row: usize,
    pub field_mappings: Vec<FieldBinding>,
    pub transformations: transform::Settings,
    pub validation_rules: validate::Rules,
    pub fixed_values: Vec<(ColumnTarget, CellValue)>,
    pub auto_number: Option<AutoNumber>,
    pub month_type_mapping: Option<MonthTypeMapping>,
    pub bank_branch_mapping: Option<BankBranchMapping>,
    pub clear_rows: Option<ClearRows>,
    pub exclude_keywords: Vec<String>,
    pub reader: ReaderOptions,
    pub zero_amount_filter: Option<ZeroAmountFilter>,
    pub mapping_mode: MappingMode,
}

/// Where a source column of the input ends up in the template, and how it is transformed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    /// The key of the mapping in the configuration.
    pub key: String,
    pub source_column: String,
    pub target: ColumnTarget,
    pub transform: TransformKind,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct AutoNumber {
    #[serde(default = "default_auto_number_column")]
    pub column: ColumnTarget,
    #[serde(default = "default_start_from")]
    pub start_from: i64,
}

fn default_auto_number_column() -> ColumnTarget {
    ColumnTarget::Label("A".into())
}

fn default_start_from() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct MonthTypeMapping {
    #[serde(default = "default_month_column")]
    pub target_column: ColumnTarget,
    #[serde(default = "default_month_format")]
    pub month_format: String,
    #[serde(default = "default_bonus_value")]
    pub bonus_value: String,
    #[serde(default = "default_compensation_value")]
    pub compensation_value: String,
}

impl Default for MonthTypeMapping {
    fn default() -> Self {
        MonthTypeMapping {
            target_column: default_month_column(),
            month_format: default_month_format(),
            bonus_value: default_bonus_value(),
            compensation_value: default_compensation_value(),
        }
    }
}

fn default_month_column() -> ColumnTarget {
    ColumnTarget::Label("C".into())
}

fn default_month_format() -> String {
    DEFAULT_MONTH_FORMAT.into()
}

fn default_bonus_value() -> String {
    BONUS_MONTH.into()
}

fn default_compensation_value() -> String {
    COMPENSATION_MONTH.into()
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct BankBranchMapping {
    pub source_column: String,
    #[serde(default = "default_branch_column")]
    pub target_column: ColumnTarget,
}

fn default_branch_column() -> ColumnTarget {
    ColumnTarget::Label("B".into())
}

/// An explicit data region of the template. Everything below it is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearRows {
    pub start_row: Option<usize>,
    pub end_row: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Read cached formula results instead of formula text.
    pub data_only: bool,
    pub header_row: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            data_only: true,
            header_row: 1,
        }
    }
}

/// Drop rows whose salary is zero before anything else happens to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZeroAmountFilter {
    pub column: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    /// Header names first, unresolvable field targets are skipped.
    #[default]
    ColumnName,
    /// Column letters and numbers only.
    ColumnIndex,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectorConfig {
    pub enabled: bool,
    pub default_bank: String,
    pub bank_column: String,
    pub default_template: Option<PathBuf>,
    pub special_template: Option<PathBuf>,
    pub default_group_name: Option<String>,
    pub special_group_name: Option<String>,
}

#[derive(serde::Deserialize)]
struct RawSelector {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    default_bank: String,
    #[serde(default)]
    bank_column: Option<String>,
    #[serde(default)]
    default_template: Option<String>,
    #[serde(default)]
    special_template: Option<String>,
    #[serde(default)]
    default_group_name: Option<String>,
    #[serde(default)]
    special_group_name: Option<String>,
}

#[derive(serde::Deserialize)]
struct RawMapping {
    source_column: Option<Value>,
    target_column: Option<ColumnTarget>,
    #[serde(default)]
    transform: TransformKind,
    #[serde(default)]
    required: bool,
}

#[derive(serde::Deserialize)]
struct Toggle {
    #[serde(default)]
    enabled: bool,
}

impl Config {
    /// Read and validate the configuration at `path`. Relative template paths are resolved
    /// against the directory containing the file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        tracing::info!(path = %path.display(), "loading configuration");
        let data = std::fs::read(path).map_err(|source| Error::Read {
            path: path.to_owned(),
            source,
        })?;
        let value: Value = serde_json::from_slice(&data).map_err(|source| Error::Parse {
            path: path.to_owned(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let config = Self::from_value(&value, base_dir)?;
        tracing::info!(version = %config.version, units = config.units.len(), "configuration is valid");
        Ok(config)
    }

    pub fn from_value(value: &Value, base_dir: &Path) -> Result<Self, Error> {
        let root = value.as_object().ok_or_else(|| Error::Invalid {
            scope: "configuration".into(),
            message: "the top level must be an object".into(),
        })?;
        let version = match root.get("version") {
            None => return Err(Error::MissingKey { key: "version" }),
            Some(Value::String(version)) => version.clone(),
            Some(other) => other.to_string(),
        };
        let units = root
            .get("organization_units")
            .ok_or(Error::MissingKey {
                key: "organization_units",
            })?
            .as_object()
            .ok_or_else(|| Error::Invalid {
                scope: "configuration".into(),
                message: "organization_units must be an object".into(),
            })?;
        if units.is_empty() {
            return Err(Error::Invalid {
                scope: "configuration".into(),
                message: "organization_units must not be empty".into(),
            });
        }
        let fallback_selector = root.get("template_selection_rules");

        let units = units
            .iter()
            .map(|(name, unit)| {
                parse_unit(name, unit, fallback_selector, base_dir).map(|unit| (name.clone(), unit))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Config { version, units })
    }

    pub fn unit(&self, name: &str) -> Result<&UnitConfig, Error> {
        self.units
            .iter()
            .find_map(|(unit_name, unit)| (unit_name == name).then_some(unit))
            .ok_or_else(|| Error::UnknownUnit { unit: name.into() })
    }

    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|(name, _)| name.as_str())
    }
}

impl UnitConfig {
    pub fn default_group(&self) -> &RuleGroup {
        &self.groups[0].1
    }

    /// The rule group named `key`, or the default one with a warning if there is none.
    pub fn rule_group(&self, key: &str) -> &RuleGroup {
        if let Some((_, group)) = self.groups.iter().find(|(name, _)| name == key) {
            return group;
        }
        if self.legacy {
            tracing::debug!(unit = %self.name, %key, "legacy unit has a single rule group");
        } else {
            tracing::warn!(unit = %self.name, %key, "rule group not found, using the default rule group");
        }
        self.default_group()
    }
}

impl RuleGroup {
    /// The source column of the first binding that carries an amount.
    pub fn amount_column(&self) -> Option<&str> {
        self.field_mappings
            .iter()
            .find(|binding| binding.transform == TransformKind::AmountDecimal)
            .map(|binding| binding.source_column.as_str())
    }

    /// The file stem of the template, used as group name if nothing else is configured.
    pub fn template_stem(&self) -> String {
        file_stem(&self.template_path)
    }
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_owned()
    } else {
        base_dir.join(path)
    }
}

fn parse_unit(
    name: &str,
    unit: &Value,
    fallback_selector: Option<&Value>,
    base_dir: &Path,
) -> Result<UnitConfig, Error> {
    let scope = format!("unit '{name}'");
    let object = unit.as_object().ok_or_else(|| Error::Invalid {
        scope: scope.clone(),
        message: "the unit configuration must be an object".into(),
    })?;

    let legacy = !object.contains_key(DEFAULT_RULE_GROUP);
    let groups = if legacy {
        vec![(
            DEFAULT_RULE_GROUP.to_string(),
            parse_rule_group(&scope, object, base_dir)?,
        )]
    } else {
        let mut groups = Vec::new();
        for (key, group) in object {
            if key == "template_selector" {
                continue;
            }
            let scope = format!("unit '{name}' rule group '{key}'");
            let group = group.as_object().ok_or_else(|| Error::Invalid {
                scope: scope.clone(),
                message: "the rule group must be an object".into(),
            })?;
            groups.push((key.clone(), parse_rule_group(&scope, group, base_dir)?));
        }
        // `default` always comes first
        if let Some(pos) = groups.iter().position(|(key, _)| key == DEFAULT_RULE_GROUP) {
            let default = groups.remove(pos);
            groups.insert(0, default);
        }
        groups
    };

    let selector = match object.get("template_selector").or(fallback_selector) {
        Some(value) => {
            let raw: RawSelector = deserialize(&scope, "template_selector", value)?;
            SelectorConfig {
                enabled: raw.enabled,
                default_bank: raw.default_bank,
                bank_column: raw
                    .bank_column
                    .filter(|column| !column.is_empty())
                    .unwrap_or_else(|| DEFAULT_BANK_COLUMN.into()),
                default_template: raw
                    .default_template
                    .filter(|path| !path.is_empty())
                    .map(|path| resolve_path(base_dir, &path)),
                special_template: raw
                    .special_template
                    .filter(|path| !path.is_empty())
                    .map(|path| resolve_path(base_dir, &path)),
                default_group_name: raw.default_group_name.filter(|name| !name.is_empty()),
                special_group_name: raw.special_group_name.filter(|name| !name.is_empty()),
            }
        }
        None => SelectorConfig {
            bank_column: DEFAULT_BANK_COLUMN.into(),
            ..Default::default()
        },
    };

    Ok(UnitConfig {
        name: name.into(),
        groups,
        selector,
        legacy,
    })
}

fn invalid(scope: &str, message: impl Into<String>) -> Error {
    Error::Invalid {
        scope: scope.into(),
        message: message.into(),
    }
}

fn deserialize<T: DeserializeOwned>(scope: &str, key: &str, value: &Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|source| Error::Malformed {
        scope: scope.into(),
        key: key.into(),
        source,
    })
}

fn row_number(scope: &str, key: &str, value: &Value, min: i64) -> Result<usize, Error> {
    value
        .as_i64()
        .filter(|n| *n >= min)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid(scope, format!("{key} must be an integer >= {min}")))
}

/// Whether an optional `{"enabled": bool, …}` table is switched on.
fn enabled(scope: &str, key: &str, object: &Map<String, Value>) -> Result<Option<Value>, Error> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let toggle: Toggle = deserialize(scope, key, value)?;
            Ok(toggle.enabled.then(|| value.clone()))
        }
    }
}

fn parse_rule_group(
    scope: &str,
    object: &Map<String, Value>,
    base_dir: &Path,
) -> Result<RuleGroup, Error> {
    for key in ["template_path", "header_row", "field_mappings", "transformations"] {
        if !object.contains_key(key) {
            return Err(invalid(scope, format!("missing required key '{key}'")));
        }
    }
    let template_path = object["template_path"]
        .as_str()
        .ok_or_else(|| invalid(scope, "template_path must be a string"))?;
    let header_row = row_number(scope, "header_row", &object["header_row"], 0)?;
    let start_row = match object.get("start_row") {
        Some(value) => {
            let start_row = value
                .as_i64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| invalid(scope, "start_row must be a non-negative integer"))?;
            if start_row <= header_row {
                return Err(invalid(
                    scope,
                    format!("start_row ({start_row}) must be greater than header_row ({header_row})"),
                ));
            }
            start_row
        }
        None => (header_row + 1).max(1),
    };

    let mappings = object["field_mappings"]
        .as_object()
        .ok_or_else(|| invalid(scope, "field_mappings must be an object"))?;
    let mut field_mappings = Vec::with_capacity(mappings.len());
    let mut required_by_mapping = Vec::new();
    for (key, mapping) in mappings {
        let binding = match mapping {
            Value::Object(_) => {
                let raw: RawMapping = deserialize(scope, &format!("field_mappings.{key}"), mapping)?;
                let source_column = match raw.source_column {
                    Some(Value::String(source)) if !source.is_empty() => source,
                    Some(Value::Number(source)) => source.to_string(),
                    _ => {
                        return Err(invalid(
                            scope,
                            format!("field mapping '{key}' is missing source_column"),
                        ))
                    }
                };
                if raw.required {
                    required_by_mapping.push(source_column.clone());
                }
                FieldBinding {
                    key: key.clone(),
                    source_column,
                    target: raw
                        .target_column
                        .unwrap_or_else(|| ColumnTarget::Label(key.clone())),
                    transform: raw.transform,
                }
            }
            Value::String(target) => {
                tracing::warn!(%scope, %key, "field mapping uses the legacy shape, consider migrating it to an object");
                FieldBinding {
                    key: key.clone(),
                    source_column: key.clone(),
                    target: ColumnTarget::Label(target.clone()),
                    transform: TransformKind::None,
                }
            }
            Value::Number(target) => {
                tracing::warn!(%scope, %key, "field mapping uses the legacy shape, consider migrating it to an object");
                FieldBinding {
                    key: key.clone(),
                    source_column: key.clone(),
                    target: target
                        .as_i64()
                        .map(ColumnTarget::Index)
                        .ok_or_else(|| invalid(scope, format!("field mapping '{key}' has an invalid column number")))?,
                    transform: TransformKind::None,
                }
            }
            _ => {
                return Err(invalid(
                    scope,
                    format!("field mapping '{key}' must be an object or a string"),
                ))
            }
        };
        field_mappings.push(binding);
    }

    if !object["transformations"].is_object() {
        return Err(invalid(scope, "transformations must be an object"));
    }
    let transformations: transform::Settings =
        deserialize(scope, "transformations", &object["transformations"])?;

    let mut validation_rules = match object.get("validation_rules") {
        Some(rules) => parse_validation_rules(scope, rules)?,
        None => validate::Rules::default(),
    };
    for field in required_by_mapping {
        if !validation_rules.required_fields.contains(&field) {
            validation_rules.required_fields.push(field);
        }
    }

    let fixed_values = match object.get("fixed_values") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(values)) => values
            .iter()
            .map(|(column, value)| (ColumnTarget::Label(column.clone()), CellValue::from_json(value)))
            .collect(),
        Some(_) => return Err(invalid(scope, "fixed_values must be an object")),
    };

    let auto_number = enabled(scope, "auto_number", object)?
        .map(|value| deserialize::<AutoNumber>(scope, "auto_number", &value))
        .transpose()?;
    let month_type_mapping = enabled(scope, "month_type_mapping", object)?
        .map(|value| deserialize::<MonthTypeMapping>(scope, "month_type_mapping", &value))
        .transpose()?;
    if let Some(mapping) = &month_type_mapping {
        if !mapping.month_format.contains("{month}") {
            return Err(invalid(scope, "month_type_mapping.month_format must contain '{month}'"));
        }
    }
    let bank_branch_mapping = enabled(scope, "bank_branch_mapping", object)?
        .map(|value| deserialize::<BankBranchMapping>(scope, "bank_branch_mapping", &value))
        .transpose()?;

    let clear_rows = object
        .get("clear_rows")
        .map(|value| parse_clear_rows(scope, value))
        .transpose()?;

    let exclude_keywords = match object.get("row_filter") {
        None | Some(Value::Null) => Vec::new(),
        Some(filter) => {
            #[derive(serde::Deserialize)]
            struct RowFilter {
                #[serde(default)]
                exclude_keywords: Vec<String>,
            }
            deserialize::<RowFilter>(scope, "row_filter", filter)?.exclude_keywords
        }
    };

    let reader = match object.get("reader_options") {
        None | Some(Value::Null) => ReaderOptions::default(),
        Some(Value::Object(options)) => {
            let mut reader = ReaderOptions::default();
            if let Some(data_only) = options.get("data_only") {
                reader.data_only = data_only
                    .as_bool()
                    .ok_or_else(|| invalid(scope, "reader_options.data_only must be a boolean"))?;
            }
            if let Some(header_row) = options.get("header_row") {
                reader.header_row = row_number(scope, "reader_options.header_row", header_row, 1)?;
            }
            reader
        }
        Some(_) => return Err(invalid(scope, "reader_options must be an object")),
    };

    let zero_amount_filter = match object.get("zero_amount_filter") {
        None | Some(Value::Null) => Some(ZeroAmountFilter {
            column: DEFAULT_SALARY_COLUMN.into(),
        }),
        Some(value) => {
            #[derive(serde::Deserialize)]
            struct RawFilter {
                #[serde(default = "yes")]
                enabled: bool,
                #[serde(default)]
                column: Option<String>,
            }
            fn yes() -> bool {
                true
            }
            let raw: RawFilter = deserialize(scope, "zero_amount_filter", value)?;
            raw.enabled.then(|| ZeroAmountFilter {
                column: raw.column.unwrap_or_else(|| DEFAULT_SALARY_COLUMN.into()),
            })
        }
    };

    let mapping_mode = match object.get("mapping_mode") {
        None | Some(Value::Null) => MappingMode::default(),
        Some(value) => deserialize(scope, "mapping_mode", value)?,
    };

    Ok(RuleGroup {
        template_path: resolve_path(base_dir, template_path),
        header_row,
        start_row,
        field_mappings,
        transformations,
        validation_rules,
        fixed_values,
        auto_number,
        month_type_mapping,
        bank_branch_mapping,
        clear_rows,
        exclude_keywords,
        reader,
        zero_amount_filter,
        mapping_mode,
    })
}

fn parse_clear_rows(scope: &str, value: &Value) -> Result<ClearRows, Error> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid(scope, "clear_rows must be an object"))?;
    let end_row = match (object.get("end_row"), object.get("data_end_row")) {
        (Some(_), Some(_)) => {
            return Err(invalid(
                scope,
                "clear_rows must not contain both end_row and data_end_row",
            ))
        }
        (Some(end_row), None) | (None, Some(end_row)) => {
            row_number(scope, "clear_rows.end_row", end_row, 1)?
        }
        (None, None) => {
            return Err(invalid(scope, "clear_rows needs end_row or data_end_row"))
        }
    };
    let start_row = object
        .get("start_row")
        .filter(|value| !value.is_null())
        .map(|value| row_number(scope, "clear_rows.start_row", value, 1))
        .transpose()?;
    if start_row.is_some_and(|start_row| start_row > end_row) {
        return Err(invalid(scope, "clear_rows.start_row must not be greater than end_row"));
    }
    Ok(ClearRows { start_row, end_row })
}

fn parse_validation_rules(scope: &str, value: &Value) -> Result<validate::Rules, Error> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid(scope, "validation_rules must be an object"))?;
    if object.contains_key("type_rules") || object.contains_key("range_rules") {
        return Err(invalid(
            scope,
            "validation_rules only supports data_types and value_ranges, the keys type_rules and range_rules are no longer accepted",
        ));
    }

    let mut rules = validate::Rules::default();
    if let Some(required) = object.get("required_fields") {
        rules.required_fields = required
            .as_array()
            .and_then(|fields| {
                fields
                    .iter()
                    .map(|field| field.as_str().map(ToOwned::to_owned))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| invalid(scope, "validation_rules.required_fields must be a list of strings"))?;
    }

    if let Some(data_types) = object.get("data_types") {
        let data_types = data_types
            .as_object()
            .ok_or_else(|| invalid(scope, "validation_rules.data_types must be an object"))?;
        for (field, type_name) in data_types {
            let type_name = type_name.as_str().ok_or_else(|| {
                invalid(scope, format!("validation_rules.data_types '{field}' must be a type name"))
            })?;
            let data_type: DataType = type_name.parse().map_err(|()| {
                invalid(
                    scope,
                    format!("validation_rules.data_types '{field}' has unsupported type '{type_name}'"),
                )
            })?;
            rules.data_types.push((field.clone(), data_type));
        }
    }

    if let Some(value_ranges) = object.get("value_ranges") {
        let value_ranges = value_ranges
            .as_object()
            .ok_or_else(|| invalid(scope, "validation_rules.value_ranges must be an object"))?;
        for (field, range) in value_ranges {
            let range = range.as_object().ok_or_else(|| {
                invalid(scope, format!("validation_rules.value_ranges '{field}' must be an object"))
            })?;
            let length = |key: &str| -> Result<Option<usize>, Error> {
                range
                    .get(key)
                    .map(|value| row_number(scope, &format!("value_ranges.{field}.{key}"), value, 0))
                    .transpose()
            };
            let allowed_values = match range.get("allowed_values") {
                None => None,
                Some(Value::Array(values)) => Some(values.iter().map(CellValue::from_json).collect()),
                Some(_) => {
                    return Err(invalid(
                        scope,
                        format!("validation_rules.value_ranges '{field}'.allowed_values must be a list"),
                    ))
                }
            };
            rules.value_ranges.push((
                field.clone(),
                RangeRule {
                    min: range.get("min").map(CellValue::from_json),
                    max: range.get("max").map(CellValue::from_json),
                    min_length: length("min_length")?,
                    max_length: length("max_length")?,
                    allowed_values,
                },
            ));
        }
    }
    Ok(rules)
}
