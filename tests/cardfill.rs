use cardfill::value::{CellValue, Row};

mod transform {
    use cardfill::transform::{
        luhn_check, parse_date, transform_amount, transform_card_number, transform_date, Error,
    };
    use cardfill::value::CellValue;
    use time::macros::date;

    #[test]
    fn amounts_round_half_up_on_decimals() {
        for (input, expected) in [
            (CellValue::Text("1000.455".into()), 1000.46),
            (CellValue::Text(" 1000.454 ".into()), 1000.45),
            (CellValue::Float(2.675), 2.68),
            (CellValue::Float(-2.675), -2.68),
            (CellValue::Integer(5), 5.0),
            (CellValue::Text("1e3".into()), 1000.0),
        ] {
            assert_eq!(
                transform_amount(&input, 2).unwrap(),
                expected,
                "{input:?} rounds to {expected}"
            );
        }
        assert_eq!(transform_amount(&CellValue::Float(0.5), 0).unwrap(), 1.0);
    }

    #[test]
    fn amounts_reject_empty_and_non_numeric_values() {
        assert!(matches!(
            transform_amount(&CellValue::Empty, 2),
            Err(Error::EmptyAmount)
        ));
        assert!(matches!(
            transform_amount(&CellValue::Text(String::new()), 2),
            Err(Error::EmptyAmount)
        ));
        assert!(matches!(
            transform_amount(&CellValue::Text("abc".into()), 2),
            Err(Error::InvalidAmount { value }) if value == "abc"
        ));
        assert!(matches!(
            transform_amount(&CellValue::Bool(true), 2),
            Err(Error::InvalidAmount { .. })
        ));
    }

    #[test]
    fn card_numbers_keep_digits_only() {
        for (input, expected) in [
            (CellValue::Text("4111 1111 1111 1111".into()), "4111111111111111"),
            (CellValue::Text("5555-5555-5555-4444".into()), "5555555555554444"),
            (CellValue::Text("６０１１１１１１１１１１１１１７".into()), "6011111111111117"),
            (CellValue::Integer(4012888888881881), "4012888888881881"),
            (CellValue::Float(4111111111111111.0), "4111111111111111"),
        ] {
            assert_eq!(transform_card_number(&input).unwrap(), expected);
        }
    }

    #[test]
    fn card_number_punctuation_does_not_matter() {
        let plain = transform_card_number(&CellValue::Text("6222021234567890128".into())).unwrap();
        let spaced = transform_card_number(&CellValue::Text("6222 0212 3456 7890 128".into())).unwrap();
        assert_eq!(plain, "6222021234567890128");
        assert_eq!(spaced, plain);
        assert!(matches!(
            transform_card_number(&CellValue::Text("6222 0212 3456 7890 124".into())),
            Err(Error::Luhn { .. })
        ));
    }

    #[test]
    fn card_numbers_are_stable_once_cleaned() {
        for input in [
            CellValue::Text("6222 0212 3456 7890 128".into()),
            CellValue::Text("5555-5555-5555-4444".into()),
            CellValue::Integer(4012888888881881),
            CellValue::Float(4111111111111111.0),
        ] {
            let once = transform_card_number(&input).unwrap();
            let twice = transform_card_number(&CellValue::Text(once.clone())).unwrap();
            assert_eq!(twice, once, "{input:?}");
        }
    }

    #[test]
    fn card_numbers_are_checked() {
        assert!(matches!(
            transform_card_number(&CellValue::Empty),
            Err(Error::EmptyCardNumber)
        ));
        assert!(matches!(
            transform_card_number(&CellValue::Integer(0)),
            Err(Error::EmptyCardNumber)
        ));
        assert!(matches!(
            transform_card_number(&CellValue::Text("n/a".into())),
            Err(Error::CardNumberWithoutDigits { .. })
        ));
        assert!(matches!(
            transform_card_number(&CellValue::Text("123456789012".into())),
            Err(Error::CardNumberLength { length: 12 })
        ));
        assert!(matches!(
            transform_card_number(&CellValue::Text("12345678901234567890".into())),
            Err(Error::CardNumberLength { length: 20 })
        ));
        assert!(matches!(
            transform_card_number(&CellValue::Text("4111111111111112".into())),
            Err(Error::Luhn { digits }) if digits == "4111111111111112"
        ));
    }

    #[test]
    fn luhn() {
        assert!(luhn_check("79927398713"));
        assert!(!luhn_check("79927398710"));
        assert!(luhn_check("0"));
    }

    #[test]
    fn dates_are_parsed_in_order() {
        for (input, expected) in [
            ("2024-01-15", date!(2024 - 01 - 15)),
            ("2024-1-5", date!(2024 - 01 - 05)),
            ("15/01/2024", date!(2024 - 01 - 15)),
            ("05/01/2024", date!(2024 - 01 - 05)),
            ("01/15/2024", date!(2024 - 01 - 15)),
            ("2024年01月15日", date!(2024 - 01 - 15)),
            ("2024年1月5日", date!(2024 - 01 - 05)),
        ] {
            assert_eq!(parse_date(input), Some(expected), "{input}");
        }
        for input in ["2024/01/15", "24-01-15", "2024-02-30", "yesterday", ""] {
            assert_eq!(parse_date(input), None, "{input}");
        }
    }

    #[test]
    fn dates_are_normalized() {
        assert_eq!(
            transform_date(&CellValue::Text("15/01/2024".into()), "YYYY-MM-DD").unwrap(),
            "2024-01-15"
        );
        assert_eq!(
            transform_date(&CellValue::Date(date!(2024 - 03 - 01)), "YYYY-MM-DD").unwrap(),
            "2024-03-01"
        );
        assert!(matches!(
            transform_date(&CellValue::Text("15/01/2024".into()), "DD.MM.YYYY"),
            Err(Error::UnsupportedDateFormat { .. })
        ));
        assert!(matches!(
            transform_date(&CellValue::Text("soon".into()), "YYYY-MM-DD"),
            Err(Error::UnparsableDate { .. })
        ));
        assert!(matches!(
            transform_date(&CellValue::Empty, "YYYY-MM-DD"),
            Err(Error::EmptyDate)
        ));
    }
}

mod validate {
    use super::row;
    use cardfill::validate::{validate_rows, DataType, Error, RangeRule, Rules};
    use cardfill::value::{CellValue, Row};

    #[test]
    fn required_fields() {
        let rules = Rules {
            required_fields: vec!["姓名".into()],
            ..Default::default()
        };
        assert!(validate_rows(&[row(&[("姓名", "张三".into())])], &rules).is_ok());

        for (input, expected) in [
            (row(&[("卡号", "1".into())]), "missing"),
            (row(&[("姓名", CellValue::Empty)]), "empty"),
            (row(&[("姓名", "  ".into())]), "blank"),
        ] {
            let err = validate_rows(&[input], &rules).unwrap_err();
            let Error::Row { row: 1, source } = err else {
                panic!("errors name their row")
            };
            let kind = match *source {
                Error::RequiredFieldMissing { .. } => "missing",
                Error::RequiredFieldEmpty { .. } => "empty",
                Error::RequiredFieldBlank { .. } => "blank",
                other => panic!("unexpected {other:?}"),
            };
            assert_eq!(kind, expected);
        }
    }

    #[test]
    fn data_types_skip_blank_values() {
        let rules = Rules {
            data_types: vec![
                ("金额".into(), DataType::Numeric),
                ("人数".into(), DataType::Int),
                ("日期".into(), DataType::Date),
            ],
            ..Default::default()
        };
        let valid = [
            row(&[("金额", "12.5".into()), ("人数", "3.0".into()), ("日期", "2024-01-15".into())]),
            row(&[("金额", CellValue::Float(1.5)), ("人数", CellValue::Integer(3))]),
            row(&[("金额", CellValue::Empty), ("日期", "".into())]),
        ];
        assert!(validate_rows(&valid, &rules).is_ok());

        let err = validate_rows(&[valid[0].clone(), row(&[("金额", "abc".into())])], &rules)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Row { row: 2, source } if matches!(*source, Error::NotNumeric { .. })
        ));
        assert!(matches!(
            validate_rows(&[row(&[("人数", "2.5".into())])], &rules),
            Err(Error::Row { source, .. }) if matches!(*source, Error::NotInteger { .. })
        ));
        assert!(matches!(
            validate_rows(&[row(&[("日期", "someday".into())])], &rules),
            Err(Error::Row { source, .. }) if matches!(*source, Error::NotDate { .. })
        ));
        assert!(matches!(
            validate_rows(&[row(&[("人数", CellValue::Bool(true))])], &rules),
            Err(Error::Row { source, .. }) if matches!(*source, Error::NotInteger { .. })
        ));
    }

    #[test]
    fn value_ranges() {
        let rules = Rules {
            value_ranges: vec![
                (
                    "金额".into(),
                    RangeRule {
                        min: Some(CellValue::Integer(0)),
                        max: Some(CellValue::Integer(50000)),
                        ..Default::default()
                    },
                ),
                (
                    "姓名".into(),
                    RangeRule {
                        min_length: Some(2),
                        max_length: Some(4),
                        ..Default::default()
                    },
                ),
                (
                    "类型".into(),
                    RangeRule {
                        allowed_values: Some(vec!["工资".into(), CellValue::Integer(1)]),
                        ..Default::default()
                    },
                ),
            ],
            ..Default::default()
        };
        let ok = row(&[
            ("金额", "100.5".into()),
            ("姓名", "张三".into()),
            ("类型", "1".into()),
        ]);
        assert!(validate_rows(&[ok], &rules).is_ok());

        let failing = |input: Row| match validate_rows(&[input], &rules) {
            Err(Error::Row { source, .. }) => *source,
            other => panic!("expected a row error, got {other:?}"),
        };
        assert!(matches!(
            failing(row(&[("金额", CellValue::Integer(-1))])),
            Error::BelowMinimum { .. }
        ));
        assert!(matches!(
            failing(row(&[("金额", "50000.01".into())])),
            Error::AboveMaximum { .. }
        ));
        assert!(matches!(
            failing(row(&[("姓名", "张".into())])),
            Error::TooShort { length: 1, .. }
        ));
        assert!(matches!(
            failing(row(&[("姓名", "欧阳大小姐".into())])),
            Error::TooLong { length: 5, .. }
        ));
        assert!(matches!(
            failing(row(&[("类型", "奖金".into())])),
            Error::NotAllowed { .. }
        ));
    }

    #[test]
    fn incomparable_values_are_not_rejected() {
        let rules = Rules {
            value_ranges: vec![(
                "金额".into(),
                RangeRule {
                    min: Some(CellValue::Integer(0)),
                    ..Default::default()
                },
            )],
            ..Default::default()
        };
        assert!(validate_rows(&[row(&[("金额", "n/a".into())])], &rules).is_ok());
    }

    #[test]
    fn dates_compare_as_dates() {
        let rules = Rules {
            value_ranges: vec![(
                "日期".into(),
                RangeRule {
                    min: Some("2024-01-01".into()),
                    ..Default::default()
                },
            )],
            ..Default::default()
        };
        assert!(validate_rows(&[row(&[("日期", "2024年02月01日".into())])], &rules).is_ok());
        assert!(validate_rows(&[row(&[("日期", "31/12/2023".into())])], &rules).is_err());
    }
}

mod column {
    use cardfill::column::{
        index_to_letters, letters_to_index, resolve_column_index, ColumnTarget, Error, Headers,
    };

    fn headers() -> Headers {
        [("序号".to_string(), 1), ("姓名".into(), 2), ("AB".into(), 5)]
            .into_iter()
            .collect()
    }

    #[test]
    fn header_names_win_over_letters() {
        let headers = headers();
        for (target, expected) in [
            (ColumnTarget::from("姓名"), 2),
            (ColumnTarget::from("AB"), 5),
            (ColumnTarget::from("c"), 3),
            (ColumnTarget::from("AA"), 27),
            (ColumnTarget::from("4"), 4),
            (ColumnTarget::from(7), 7),
        ] {
            assert_eq!(
                resolve_column_index(&target, Some(&headers), None).unwrap(),
                expected,
                "{target}"
            );
        }
        assert_eq!(
            resolve_column_index(&ColumnTarget::from("AB"), None, None).unwrap(),
            28,
            "without headers it's a column label"
        );
    }

    #[test]
    fn unknown_names_are_not_column_labels() {
        for target in [
            ColumnTarget::from("卡号"),
            ColumnTarget::from("A1"),
            ColumnTarget::from(0),
            ColumnTarget::from(-3),
            ColumnTarget::from(20_000),
            ColumnTarget::from("Remark"),
            ColumnTarget::from(""),
        ] {
            assert!(
                matches!(
                    resolve_column_index(&target, Some(&headers()), None),
                    Err(Error::Unresolvable { .. })
                ),
                "{target:?}"
            );
        }
    }

    #[test]
    fn bounds() {
        assert!(matches!(
            resolve_column_index(&ColumnTarget::from("F"), None, Some(5)),
            Err(Error::OutOfBounds {
                index: 6,
                max_columns: 5,
                ..
            })
        ));
        assert_eq!(
            resolve_column_index(&ColumnTarget::from("E"), None, Some(5)).unwrap(),
            5
        );
    }

    #[test]
    fn letters() {
        for (letters, index) in [("A", 1), ("Z", 26), ("AA", 27), ("AZ", 52), ("ZZ", 702), ("AAA", 703)] {
            assert_eq!(letters_to_index(letters), Some(index));
            assert_eq!(index_to_letters(index), letters);
        }
        assert_eq!(letters_to_index("ab"), Some(28));
        assert_eq!(letters_to_index("A1"), None);
        assert_eq!(letters_to_index(""), None);
        assert_eq!(letters_to_index("XFD"), Some(16_384));
        for word in ["XFE", "Memo", "Remark"] {
            assert_eq!(letters_to_index(word), None, "{word} is past the last column");
        }
    }
}

mod config {
    use cardfill::column::ColumnTarget;
    use cardfill::config::{Config, Error, MappingMode};
    use cardfill::transform::TransformKind;
    use cardfill::value::CellValue;
    use serde_json::json;
    use std::path::Path;

    fn load(units: serde_json::Value) -> Result<Config, Error> {
        Config::from_value(
            &json!({ "version": "2.0", "organization_units": units }),
            Path::new("/configs"),
        )
    }

    fn group(extra: serde_json::Value) -> serde_json::Value {
        let mut group = json!({
            "template_path": "templates/工资.xlsx",
            "header_row": 1,
            "field_mappings": {
                "姓名": {"source_column": "姓名"},
                "金额": {"source_column": "实发工资", "transform": "amount_decimal", "required": true},
            },
            "transformations": {},
        });
        if let (Some(group), Some(extra)) = (group.as_object_mut(), extra.as_object()) {
            group.extend(extra.clone());
        }
        group
    }

    #[test]
    fn legacy_units_have_a_single_default_group() {
        let config = load(json!({ "单位": group(json!({})) })).unwrap();
        assert_eq!(config.version, "2.0");
        let unit = config.unit("单位").unwrap();
        assert!(unit.legacy);
        assert_eq!(unit.groups.len(), 1);
        assert!(!unit.selector.enabled);

        let default = unit.default_group();
        assert_eq!(default.template_path, Path::new("/configs/templates/工资.xlsx"));
        assert_eq!(default.template_stem(), "工资");
        assert_eq!(default.start_row, 2, "start_row follows the header");
        assert_eq!(default.amount_column(), Some("实发工资"));
        assert_eq!(default.validation_rules.required_fields, vec!["实发工资".to_string()]);
        assert_eq!(default.mapping_mode, MappingMode::ColumnName);
        assert!(default.reader.data_only);
        assert_eq!(
            default.zero_amount_filter.as_ref().map(|filter| filter.column.as_str()),
            Some("实发工资")
        );
        assert!(std::ptr::eq(unit.rule_group("crossbank"), default));
    }

    #[test]
    fn field_mappings_in_both_shapes() {
        let config = load(json!({ "单位": group(json!({
            "field_mappings": {
                "姓名": "B",
                "序号": 1,
                "卡号": {"source_column": "银行卡号", "target_column": "C", "transform": "card_number"},
                "日期": {"source_column": "发放日期", "target_column": 4, "transform": "date_format"},
            }
        })) }))
        .unwrap();
        let bindings = &config.unit("单位").unwrap().default_group().field_mappings;
        let summary: Vec<_> = bindings
            .iter()
            .map(|b| (b.source_column.as_str(), b.target.clone(), b.transform))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("姓名", ColumnTarget::from("B"), TransformKind::None),
                ("序号", ColumnTarget::from(1), TransformKind::None),
                ("银行卡号", ColumnTarget::from("C"), TransformKind::CardNumber),
                ("发放日期", ColumnTarget::from(4), TransformKind::DateFormat),
            ],
            "the order of the configuration file is kept"
        );
    }

    #[test]
    fn rule_groups_and_selector() {
        let config = Config::from_value(
            &json!({
                "version": "2.0",
                "organization_units": {
                    "单位": {
                        "crossbank": group(json!({"template_path": "跨行.xlsx"})),
                        "default": group(json!({
                            "fixed_values": {"E": "工资", "F": 1},
                            "auto_number": {"enabled": true, "start_from": 10},
                            "month_type_mapping": {"enabled": true, "target_column": "G"},
                            "bank_branch_mapping": {"enabled": false, "source_column": "支行"},
                            "clear_rows": {"data_end_row": 20},
                            "zero_amount_filter": {"enabled": false},
                            "mapping_mode": "column_index",
                        })),
                    }
                },
                "template_selection_rules": {
                    "enabled": true,
                    "default_bank": "中国银行",
                    "special_template": "special.xlsx",
                },
            }),
            Path::new("cfg"),
        )
        .unwrap();
        let unit = config.unit("单位").unwrap();
        assert!(!unit.legacy);
        assert_eq!(unit.groups[0].0, "default", "default always comes first");
        assert_eq!(unit.rule_group("crossbank").template_stem(), "跨行");

        let selector = &unit.selector;
        assert!(selector.enabled);
        assert_eq!(selector.default_bank, "中国银行");
        assert_eq!(selector.bank_column, "开户银行");
        assert_eq!(selector.special_template.as_deref(), Some(Path::new("cfg/special.xlsx")));
        assert_eq!(selector.default_template, None);

        let default = unit.default_group();
        assert_eq!(
            default.fixed_values,
            vec![
                (ColumnTarget::from("E"), CellValue::Text("工资".into())),
                (ColumnTarget::from("F"), CellValue::Integer(1)),
            ]
        );
        let auto_number = default.auto_number.as_ref().unwrap();
        assert_eq!((auto_number.column.clone(), auto_number.start_from), (ColumnTarget::from("A"), 10));
        let month = default.month_type_mapping.as_ref().unwrap();
        assert_eq!(month.target_column, ColumnTarget::from("G"));
        assert_eq!(month.month_format, "{month}月收入");
        assert_eq!(month.bonus_value, "年终奖");
        assert!(default.bank_branch_mapping.is_none(), "disabled tables are dropped");
        let clear_rows = default.clear_rows.unwrap();
        assert_eq!((clear_rows.start_row, clear_rows.end_row), (None, 20));
        assert!(default.zero_amount_filter.is_none());
        assert_eq!(default.mapping_mode, MappingMode::ColumnIndex);
    }

    #[test]
    fn invalid_configurations() {
        assert!(matches!(
            Config::from_value(&json!({ "organization_units": {} }), Path::new("")),
            Err(Error::MissingKey { key: "version" })
        ));
        assert!(matches!(
            Config::from_value(&json!({ "version": "1" }), Path::new("")),
            Err(Error::MissingKey { key: "organization_units" })
        ));
        assert!(matches!(load(json!({})), Err(Error::Invalid { .. })));

        for (extra, needle) in [
            (json!({"start_row": 1}), "start_row"),
            (json!({"header_row": -1}), "header_row"),
            (json!({"month_type_mapping": {"enabled": true, "month_format": "月收入"}}), "{month}"),
            (json!({"clear_rows": {"end_row": 5, "data_end_row": 6}}), "both"),
            (json!({"clear_rows": {"start_row": 9, "end_row": 5}}), "greater"),
            (json!({"validation_rules": {"type_rules": {}}}), "type_rules"),
            (json!({"validation_rules": {"data_types": {"金额": "money"}}}), "money"),
            (json!({"transformations": []}), "transformations"),
        ] {
            let err = load(json!({ "单位": group(extra.clone()) })).unwrap_err();
            assert!(err.to_string().contains(needle), "{extra}: {err}");
        }

        let mut missing = group(json!({}));
        missing.as_object_mut().unwrap().remove("field_mappings");
        assert!(load(json!({ "单位": missing }))
            .unwrap_err()
            .to_string()
            .contains("field_mappings"));
    }

    #[test]
    fn unknown_units() {
        let config = load(json!({ "单位": group(json!({})) })).unwrap();
        assert!(matches!(config.unit("其他"), Err(Error::UnknownUnit { unit }) if unit == "其他"));
        assert_eq!(config.unit_names().collect::<Vec<_>>(), vec!["单位"]);
    }

    #[test]
    fn load_resolves_templates_next_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&json!({ "version": "1", "organization_units": { "单位": group(json!({})) } }))
                .unwrap(),
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.unit("单位").unwrap().default_group().template_path,
            dir.path().join("templates/工资.xlsx")
        );

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Parse { .. })));
        assert!(matches!(
            Config::load(&dir.path().join("missing.json")),
            Err(Error::Read { .. })
        ));
    }
}

mod naming {
    use cardfill::naming::{format, output_filename, parse, Error, Fields, DEFAULT_TEMPLATE};
    use std::path::Path;

    fn fields(amount: f64) -> Fields<'static> {
        Fields {
            unit_name: "单位_A",
            template_name: "工资",
            month: "03",
            count: 3,
            amount,
            ext: ".xlsx",
        }
    }

    #[test]
    fn default_template_is_the_wire_format() {
        let name = format(DEFAULT_TEMPLATE, &fields(350.0)).unwrap();
        assert_eq!(name, "单位_A_工资_3人_金额350.00元.xlsx");
        assert_eq!(name, output_filename(&fields(350.0)));
    }

    #[test]
    fn placeholders() {
        for (template, expected) in [
            ("{month}_{unit_name}{ext}", "03_单位_A.xlsx"),
            ("{amount}", "350.0"),
            ("{count}-{{literal}}", "3-{literal}"),
            ("plain", "plain"),
        ] {
            assert_eq!(format(template, &fields(350.0)).unwrap(), expected);
        }
        assert_eq!(format("{amount}", &fields(0.5)).unwrap(), "0.5");
        assert!(matches!(
            format("{unknown}", &fields(1.0)),
            Err(Error::UnknownPlaceholder { name }) if name == "unknown"
        ));
        for template in ["{unit_name", "unit}", "{a{b}"] {
            assert!(matches!(
                format(template, &fields(1.0)),
                Err(Error::UnbalancedBraces { .. })
            ));
        }
    }

    #[test]
    fn parse_prefers_the_longest_unit_name() {
        let units = ["单位", "单位_A"];
        let parsed = parse(Path::new("out/单位_A_工资_表_3人_金额350.00元.xlsx"), units).unwrap();
        assert_eq!(parsed.unit_name, "单位_A");
        assert_eq!(parsed.template_name, "工资_表");
        assert_eq!(parsed.count, 3);
        assert_eq!(parsed.amount, 350.0);

        let parsed = parse(Path::new("单位_本行_0人_金额-12.5元.CSV"), units).unwrap();
        assert_eq!((parsed.unit_name.as_str(), parsed.template_name.as_str()), ("单位", "本行"));
        assert_eq!((parsed.count, parsed.amount), (0, -12.5));
    }

    #[test]
    fn parse_failures() {
        let units = ["单位"];
        assert!(matches!(
            parse(Path::new("单位_工资_1人_金额1.00元.txt"), units),
            Err(Error::UnsupportedExtension { .. })
        ));
        assert!(matches!(
            parse(Path::new("单位_工资_1人_1.00元.xlsx"), units),
            Err(Error::Pattern { .. })
        ));
        assert!(matches!(
            parse(Path::new("其他_工资_1人_金额1.00元.xlsx"), units),
            Err(Error::UnknownUnit { prefix }) if prefix == "其他_工资"
        ));
        assert!(matches!(
            parse(Path::new("单位__1人_金额1.00元.xlsx"), units),
            Err(Error::MissingTemplateName { .. })
        ));
    }
}

mod select {
    use super::row;
    use cardfill::config::Config;
    use cardfill::validate::Error;
    use cardfill::{group_data, partition};
    use serde_json::json;
    use std::path::Path;

    fn rows() -> Vec<cardfill::value::Row> {
        vec![
            row(&[("姓名", "张三".into()), ("开户银行", "中国银行".into())]),
            row(&[("姓名", "李四".into()), ("开户银行", "中国银行股份有限公司".into())]),
            row(&[("姓名", "王五".into()), ("开户银行", "中国银行".into())]),
        ]
    }

    #[test]
    fn only_exact_matches_go_to_the_default_bank() {
        let (default, special) = partition(rows(), "中国银行", "开户银行").unwrap();
        let names = |rows: &[cardfill::value::Row]| {
            rows.iter()
                .map(|row| row["姓名"].to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&default), ["张三", "王五"], "order is kept");
        assert_eq!(names(&special), ["李四"]);
    }

    #[test]
    fn every_row_needs_a_bank() {
        let mut input = rows();
        input[1].insert("开户银行".into(), " ".into());
        assert!(matches!(
            partition(input, "中国银行", "开户银行"),
            Err(Error::BlankValue { row: 2, column }) if column == "开户银行"
        ));
        assert!(matches!(
            partition(rows(), "中国银行", "银行"),
            Err(Error::MissingColumn { column }) if column == "银行"
        ));
    }

    #[test]
    fn groups_carry_their_template_and_name() {
        let group = |template: &str| {
            json!({
                "template_path": template,
                "header_row": 1,
                "field_mappings": {"姓名": "姓名"},
                "transformations": {},
            })
        };
        let config = Config::from_value(
            &json!({
                "version": "1",
                "organization_units": {
                    "单位": {
                        "default": group("本行模板.xlsx"),
                        "crossbank": group("跨行模板.xlsx"),
                        "template_selector": {
                            "enabled": true,
                            "default_bank": "中国银行",
                            "special_group_name": "跨行",
                        },
                    }
                }
            }),
            Path::new("t"),
        )
        .unwrap();
        let groups = group_data(rows(), config.unit("单位").unwrap()).unwrap();
        assert_eq!(groups.default.rule_group, "default");
        assert_eq!(groups.default.name, "本行模板");
        assert_eq!(groups.default.template, Path::new("t/本行模板.xlsx"));
        assert_eq!(groups.default.rows.len(), 2);
        assert_eq!(groups.special.rule_group, "crossbank");
        assert_eq!(groups.special.name, "跨行");
        assert_eq!(groups.special.template, Path::new("t/跨行模板.xlsx"));
        assert_eq!(groups.special.rows.len(), 1);
    }
}

mod stats {
    use super::row;
    use cardfill::stats::{filter_zero_amounts, is_zero_amount};
    use cardfill::value::CellValue;

    #[test]
    fn zero_amounts() {
        for value in [
            CellValue::Integer(0),
            CellValue::Float(0.0),
            CellValue::Text("0".into()),
            CellValue::Text(" 0.00 ".into()),
            CellValue::Text("0,000.00".into()),
            CellValue::Text("0，000".into()),
        ] {
            assert!(is_zero_amount(&value), "{value:?}");
        }
        for value in [
            CellValue::Empty,
            CellValue::Bool(false),
            CellValue::Text("".into()),
            CellValue::Text("1,000".into()),
            CellValue::Text("zero".into()),
            CellValue::Float(0.001),
        ] {
            assert!(!is_zero_amount(&value), "{value:?}");
        }
    }

    #[test]
    fn filtering_keeps_everything_but_zero() {
        let rows = vec![
            row(&[("姓名", "张三".into()), ("实发工资", CellValue::Integer(0))]),
            row(&[("姓名", "李四".into()), ("实发工资", "1000.456".into())]),
            row(&[("姓名", "王五".into())]),
            row(&[("姓名", "赵六".into()), ("实发工资", CellValue::Empty)]),
        ];
        let kept = filter_zero_amounts(rows, "实发工资").unwrap();
        let names: Vec<_> = kept.iter().map(|row| row["姓名"].to_string()).collect();
        assert_eq!(names, ["李四", "王五", "赵六"]);

        assert!(filter_zero_amounts(vec![row(&[("姓名", "张三".into())])], "实发工资").is_err());
        assert!(filter_zero_amounts(Vec::new(), "实发工资").unwrap().is_empty());
    }
}

mod month {
    use cardfill::config::MonthTypeMapping;
    use cardfill::merge::{infer_month, Error};
    use cardfill::run::validate_month;
    use cardfill::write::month_value;

    #[test]
    fn valid_month_parameters() {
        for month in ["1", "01", "9", "09", "10", "12", "年终奖", "补偿金"] {
            assert_eq!(validate_month(month).unwrap(), month);
        }
        for month in ["0", "00", "13", "001", "", " 1", "一月", "+1"] {
            assert!(validate_month(month).is_err(), "{month:?}");
        }
    }

    #[test]
    fn labels_and_back() {
        let mapping = MonthTypeMapping::default();
        for (param, label, inferred) in [
            ("3", "03月收入", "03"),
            ("03", "03月收入", "03"),
            ("12", "12月收入", "12"),
            ("年终奖", "年终奖", "年终奖"),
            ("补偿金", "补偿金", "补偿金"),
        ] {
            assert_eq!(month_value(param, &mapping).as_deref(), Some(label));
            assert_eq!(infer_month(label, &mapping).unwrap(), inferred);
        }
        assert_eq!(month_value("13", &mapping), None);
        assert!(matches!(
            infer_month("奖金", &mapping),
            Err(Error::UnknownMonthLabel { .. })
        ));
    }

    #[test]
    fn labels_that_ignore_the_month_are_ambiguous() {
        let mapping = MonthTypeMapping {
            month_format: "工资{month}".into(),
            bonus_value: "奖金".into(),
            ..Default::default()
        };
        assert_eq!(infer_month("工资07", &mapping).unwrap(), "07");
        assert_eq!(infer_month("奖金", &mapping).unwrap(), "年终奖");

        let constant = MonthTypeMapping {
            month_format: "月薪".into(),
            ..Default::default()
        };
        assert!(matches!(
            infer_month("月薪", &constant),
            Err(Error::AmbiguousMonthLabel { .. })
        ));
    }
}

fn row(pairs: &[(&str, CellValue)]) -> Row {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}
