use basemodel::prelude::*;
use basemodel::{ErrorDetail, validate_model};

fn person(extra: Extra) -> ModelType {
    ModelDef::new("Person")
        .annotate("name", FieldType::Str)
        .field("age", 0)
        .config(ConfigOverrides::new().extra(extra))
        .build()
        .unwrap()
}

fn details(err: &Error) -> Vec<ErrorDetail> {
    err.as_validation()
        .map(ValidationError::errors)
        .unwrap_or_default()
}

fn locs_and_kinds(err: &Error) -> Vec<(String, String)> {
    details(err)
        .into_iter()
        .map(|d| (d.loc.to_string(), d.kind))
        .collect()
}

#[test]
fn forbid_reports_missing_and_extra_together() {
    let err = Instance::new(&person(Extra::Forbid), value_map! { "extra" => 1 }).unwrap_err();
    assert_eq!(
        locs_and_kinds(&err),
        vec![
            ("name".to_string(), "value_error.missing".to_string()),
            ("extra".to_string(), "value_error.extra".to_string()),
        ]
    );
    assert_eq!(
        err.to_string(),
        "2 validation errors\nname\n  field required (type=value_error.missing)\n\
         extra\n  extra fields not permitted (type=value_error.extra)"
    );
}

#[test]
fn defaults_fill_in_without_errors() {
    let (values, err) = validate_model(
        &person(Extra::Forbid),
        &value_map! { "name" => "Ann" },
        false,
    )
    .unwrap();
    assert!(err.is_none());
    assert_eq!(values, value_map! { "name" => "Ann", "age" => 0 });
}

#[test]
fn non_raising_validation_returns_partial_values() {
    let (values, err) = validate_model(
        &person(Extra::Ignore),
        &value_map! { "name" => "Ann", "age" => "old" },
        false,
    )
    .unwrap();
    assert_eq!(values, value_map! { "name" => "Ann" });
    let err = err.unwrap();
    assert_eq!(err.errors()[0].kind, "type_error.integer");
}

#[test]
fn every_field_error_is_collected_in_order() {
    let model = ModelDef::new("Order")
        .annotate("id", FieldType::Int)
        .annotate("tags", FieldType::list(FieldType::Int))
        .annotate(
            "qty",
            FieldType::ConInt(NumberBounds::new().gt(0.0)),
        )
        .annotate("code", FieldType::ConStr(StrConstraints::new().regex("^[A-Z]{3}$")))
        .build()
        .unwrap();

    let err = Instance::new(
        &model,
        value_map! {
            "id" => "x",
            "tags" => vec![Value::Int(1), Value::from("two"), Value::from("three")],
            "qty" => 0,
            "code" => "abc",
        },
    )
    .unwrap_err();

    assert_eq!(
        locs_and_kinds(&err),
        vec![
            ("id".to_string(), "type_error.integer".to_string()),
            ("tags -> 1".to_string(), "type_error.integer".to_string()),
            ("tags -> 2".to_string(), "type_error.integer".to_string()),
            ("qty".to_string(), "value_error.number.not_gt".to_string()),
            ("code".to_string(), "value_error.str.regex".to_string()),
        ]
    );
    let msgs: Vec<String> = details(&err).into_iter().map(|d| d.msg).collect();
    assert_eq!(msgs[3], "ensure this value is greater than 0");
    assert_eq!(msgs[4], "string does not match regex \"^[A-Z]{3}$\"");
}

#[test]
fn nested_model_errors_keep_their_path() {
    let address = ModelDef::new("Address")
        .annotate("street", FieldType::Str)
        .annotate("zip", FieldType::Int)
        .build()
        .unwrap();
    let customer = ModelDef::new("Customer")
        .annotate("name", FieldType::Str)
        .annotate("address", FieldType::Model(address.clone()))
        .annotate("previous", FieldType::list(FieldType::Model(address)))
        .build()
        .unwrap();

    let err = Instance::new(
        &customer,
        value_map! {
            "name" => "Ann",
            "address" => value_map! { "zip" => "abc" },
            "previous" => vec![Value::Map(value_map! { "street" => "Elm", "zip" => 1 }), Value::Int(3)],
        },
    )
    .unwrap_err();

    assert_eq!(
        locs_and_kinds(&err),
        vec![
            ("address -> street".to_string(), "value_error.missing".to_string()),
            ("address -> zip".to_string(), "type_error.integer".to_string()),
            ("previous -> 1".to_string(), "type_error.dict".to_string()),
        ]
    );

    let json: serde_json::Value =
        serde_json::from_str(&err.as_validation().unwrap().json().unwrap()).unwrap();
    assert_eq!(json[2]["loc"], serde_json::json!(["previous", 1]));
}

#[test]
fn none_handling_follows_optional_and_defaults() {
    let model = ModelDef::new("M")
        .annotate("required", FieldType::Str)
        .annotate("maybe", "Optional[int]")
        .build()
        .unwrap();

    let m = Instance::new(&model, value_map! { "required" => "x" }).unwrap();
    assert_eq!(m.get("maybe").unwrap(), &Value::Null);
    assert!(!model.field("maybe").unwrap().required());

    let err = Instance::new(&model, value_map! { "required" => Value::Null }).unwrap_err();
    assert_eq!(
        locs_and_kinds(&err),
        vec![("required".to_string(), "type_error.none.not_allowed".to_string())]
    );
}

#[test]
fn validators_run_pre_and_post_coercion() {
    let model = ModelDef::new("Signup")
        .annotate("password", FieldType::Str)
        .annotate("confirm", FieldType::Str)
        .annotate("age", FieldType::Int)
        .validator(
            ["age"],
            Validator::new("strip_units", |value, _| match value {
                Value::Str(s) => Ok(Value::Str(s.trim_end_matches(" years").to_string())),
                other => Ok(other),
            })
            .pre(),
        )
        .validator(
            ["confirm"],
            Validator::new("passwords_match", |value, args| {
                if args.values.get("password") == Some(&value) {
                    Ok(value)
                } else {
                    Err(ErrorCause::value("passwords do not match"))
                }
            }),
        )
        .build()
        .unwrap();

    let ok = Instance::new(
        &model,
        value_map! { "password" => "pw", "confirm" => "pw", "age" => "30 years" },
    )
    .unwrap();
    assert_eq!(ok.get("age").unwrap(), &Value::Int(30));

    let err = Instance::new(
        &model,
        value_map! { "password" => "pw", "confirm" => "other", "age" => 1 },
    )
    .unwrap_err();
    assert_eq!(details(&err)[0].msg, "passwords do not match");
}

#[test]
fn message_templates_override_by_code() {
    let model = ModelDef::new("M")
        .annotate("a", FieldType::Int)
        .annotate("b", FieldType::ConStr(StrConstraints::new().min_length(3)))
        .config(
            ConfigOverrides::new()
                .error_msg_template("value_error.missing", "please provide a value")
                .error_msg_template(
                    "value_error.any_str.min_length",
                    "at least {limit_value} chars please",
                ),
        )
        .build()
        .unwrap();
    let err = Instance::new(&model, value_map! { "b" => "x" }).unwrap_err();
    let msgs: Vec<String> = details(&err).into_iter().map(|d| d.msg).collect();
    assert_eq!(msgs, vec!["please provide a value", "at least 3 chars please"]);
}

#[test]
fn arbitrary_types_need_opt_in() {
    #[derive(Debug, Clone, PartialEq)]
    struct Color(u8, u8, u8);

    let err = ModelDef::new("Paint")
        .annotate("color", FieldType::arbitrary::<Color>())
        .build()
        .unwrap_err();
    assert!(err.message().contains("arbitrary_types_allowed"));

    let paint = ModelDef::new("Paint")
        .annotate("color", FieldType::arbitrary::<Color>())
        .config(ConfigOverrides::new().arbitrary_types_allowed(true))
        .build()
        .unwrap();
    let ok = Instance::new(&paint, value_map! { "color" => Value::custom(Color(1, 2, 3)) }).unwrap();
    assert_eq!(
        ok.get("color").unwrap().downcast_custom::<Color>(),
        Some(&Color(1, 2, 3))
    );

    let err = Instance::new(&paint, value_map! { "color" => "red" }).unwrap_err();
    assert_eq!(details(&err)[0].kind, "type_error.arbitrary_type");
}
