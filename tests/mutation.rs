#[cfg(test)]
mod tests {
    use indoc::indoc;
    use quarry::{
        ColumnRef, CompileOptions, Compiled, Comparison, ConflictAction, GenericSqlWriter,
        InsertDescriptor, InsertValue, OnConflict, Operand, Predicate, QueryDescriptor,
        Returning, SetValue, Shape, ShapeEntry, TableRef, UpdateDescriptor, Value,
        compile_insert, compile_or_create, compile_update, compile_upsert,
        is_protocol_limit_error,
    };

    const WRITER: GenericSqlWriter = GenericSqlWriter::new();

    fn users_shape() -> Shape {
        Shape::new([
            ShapeEntry::new("id", "id"),
            ShapeEntry::new("email", "email"),
            ShapeEntry::new("userName", "user_name"),
            ShapeEntry::new("age", "age"),
            ShapeEntry::new("companyId", "company_id"),
        ])
    }

    fn options(max_params: usize) -> CompileOptions {
        CompileOptions {
            max_params,
            ..CompileOptions::default()
        }
    }

    #[test]
    fn multi_row_insert_with_defaults() {
        let insert = InsertDescriptor::new(TableRef::new("users"), users_shape(), [
            "userName", "age",
        ])
        .row([
            InsertValue::Value("Ada".into()),
            InsertValue::Value(30.into()),
        ])
        .row([InsertValue::Value("Grace".into()), InsertValue::Default])
        .returning(Returning::All);
        let compiled = compile_insert(&WRITER, &insert, CompileOptions::default()).unwrap();
        let Compiled::Single(sql) = compiled else {
            panic!("expected a single statement");
        };
        assert_eq!(
            sql.text,
            indoc! {r#"
                INSERT INTO "users" ("user_name", "age") VALUES
                ($1, $2),
                ($3, DEFAULT)
                RETURNING *"#}
        );
        assert_eq!(sql.values.len(), 3);
    }

    #[test]
    fn oversized_insert_splits_into_renumbered_batches() {
        let mut insert =
            InsertDescriptor::new(TableRef::new("users"), users_shape(), ["userName", "age"]);
        for i in 0..12 {
            insert = insert.row([
                InsertValue::Value(format!("user_{}", i).into()),
                InsertValue::Value(i.into()),
            ]);
        }
        // Two parameters per row, ceiling sized for five rows per statement.
        let compiled = compile_insert(&WRITER, &insert, options(10)).unwrap();
        let Compiled::Batch(batch) = compiled else {
            panic!("expected a batch");
        };
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].values.len(), 10);
        assert_eq!(batch[1].values.len(), 10);
        assert_eq!(batch[2].values.len(), 4);
        for sql in &batch {
            assert!(sql.text.contains("$1"));
            assert_eq!(sql.placeholder_count(), sql.values.len());
        }
        assert!(!batch[2].text.contains("$11"));
    }

    #[test]
    fn single_row_over_the_ceiling_is_fatal() {
        let insert = InsertDescriptor::new(TableRef::new("users"), users_shape(), [
            "email", "userName", "age",
        ])
        .row([
            InsertValue::Value("a@x".into()),
            InsertValue::Value("a".into()),
            InsertValue::Value(1.into()),
        ]);
        let error = compile_insert(&WRITER, &insert, options(2)).unwrap_err();
        assert!(is_protocol_limit_error(&error));
    }

    #[test]
    fn nested_create_hoists_into_cte_chain() {
        let companies = Shape::new([
            ShapeEntry::new("id", "id"),
            ShapeEntry::new("name", "name"),
        ]);
        let company = InsertDescriptor::new(TableRef::new("companies"), companies, ["name"])
            .row([InsertValue::Value("ACME".into())]);
        let insert = InsertDescriptor::new(TableRef::new("users"), users_shape(), [
            "userName",
            "companyId",
        ])
        .row([
            InsertValue::Value("Ada".into()),
            InsertValue::Nested {
                insert: Box::new(company),
                select: "id".into(),
            },
        ]);
        let compiled = compile_insert(&WRITER, &insert, CompileOptions::default()).unwrap();
        let Compiled::Single(sql) = compiled else {
            panic!("expected a single statement");
        };
        assert_eq!(
            sql.text,
            indoc! {r#"
                WITH "ins_0" AS (INSERT INTO "companies" ("name") VALUES
                ($1) RETURNING *)
                INSERT INTO "users" ("user_name", "company_id") VALUES
                ($2, (SELECT "id" FROM "ins_0"))"#}
        );
        assert_eq!(sql.values.len(), 2);
    }

    #[test]
    fn nested_create_statement_cannot_be_split() {
        let companies = Shape::new([
            ShapeEntry::new("id", "id"),
            ShapeEntry::new("name", "name"),
        ]);
        let company = InsertDescriptor::new(TableRef::new("companies"), companies, ["name"])
            .row([InsertValue::Value("ACME".into())]);
        let insert = InsertDescriptor::new(TableRef::new("users"), users_shape(), [
            "userName",
            "companyId",
        ])
        .row([
            InsertValue::Value("Ada".into()),
            InsertValue::Nested {
                insert: Box::new(company),
                select: "id".into(),
            },
        ]);
        let error = compile_insert(&WRITER, &insert, options(1)).unwrap_err();
        assert!(is_protocol_limit_error(&error));
    }

    #[test]
    fn conflict_clauses() {
        let base = || {
            InsertDescriptor::new(TableRef::new("users"), users_shape(), ["email", "userName"])
                .row([
                    InsertValue::Value("a@x".into()),
                    InsertValue::Value("Ada".into()),
                ])
        };
        let insert = base().on_conflict(OnConflict {
            target: vec!["email".into()],
            action: ConflictAction::DoNothing,
        });
        let Compiled::Single(sql) = compile_insert(&WRITER, &insert, CompileOptions::default()).unwrap()
        else {
            panic!("expected a single statement");
        };
        assert!(sql.text.ends_with(r#"ON CONFLICT ("email") DO NOTHING"#));

        let insert = base().on_conflict(OnConflict {
            target: vec!["email".into()],
            action: ConflictAction::Merge,
        });
        let Compiled::Single(sql) = compile_insert(&WRITER, &insert, CompileOptions::default()).unwrap()
        else {
            panic!("expected a single statement");
        };
        assert!(
            sql.text
                .ends_with(r#"ON CONFLICT ("email") DO UPDATE SET "user_name" = EXCLUDED."user_name""#)
        );
    }

    #[test]
    fn merge_with_no_remaining_column_degrades_to_noop_set() {
        let insert = InsertDescriptor::new(TableRef::new("users"), users_shape(), ["email"])
            .row([InsertValue::Value("a@x".into())])
            .on_conflict(OnConflict {
                target: vec!["email".into()],
                action: ConflictAction::Merge,
            });
        let Compiled::Single(sql) = compile_insert(&WRITER, &insert, CompileOptions::default()).unwrap()
        else {
            panic!("expected a single statement");
        };
        assert!(
            sql.text
                .ends_with(r#"ON CONFLICT ("email") DO UPDATE SET "email" = "users"."email""#)
        );
    }

    #[test]
    fn update_with_json_mutations() {
        let shape = Shape::new([
            ShapeEntry::new("id", "id"),
            ShapeEntry::new("meta", "meta"),
            ShapeEntry::new("age", "age"),
        ]);
        let update = UpdateDescriptor::new(TableRef::new("users"), shape)
            .set("age", SetValue::Value(31.into()))
            .set(
                "meta",
                SetValue::JsonSet {
                    path: vec!["settings".into(), "theme".into()],
                    value: Value::Json(Some(serde_json::json!("dark"))),
                },
            )
            .filter(Predicate::compare(
                ColumnRef::new("id"),
                Comparison::Equal(Operand::value(7)),
            ))
            .returning(Returning::Columns(vec!["id".into()]));
        let sql = compile_update(&WRITER, &update, CompileOptions::default()).unwrap();
        assert_eq!(
            sql.text,
            indoc! {r#"
                UPDATE "users" SET "age" = $1, "meta" = jsonb_set("meta", $2, $3::jsonb)
                WHERE "id" = $4
                RETURNING "id""#}
        );
        assert_eq!(sql.values.len(), 4);
    }

    #[test]
    fn or_create_compiles_find_plus_guarded_cte_insert() {
        let find = QueryDescriptor::new(TableRef::new("users"), users_shape())
            .filter(Predicate::compare(
                ColumnRef::new("email"),
                Comparison::Equal(Operand::value("a@x")),
            ))
            .limit(1);
        let create = InsertDescriptor::new(TableRef::new("users"), users_shape(), [
            "email", "userName",
        ])
        .row([
            InsertValue::Value("a@x".into()),
            InsertValue::Value("Ada".into()),
        ]);
        let plan = compile_or_create(&WRITER, &find, &create, CompileOptions::default()).unwrap();
        assert_eq!(
            plan.find.text,
            indoc! {r#"
                SELECT *
                FROM "users"
                WHERE "email" = $1
                LIMIT 1"#}
        );
        assert_eq!(
            plan.create.text,
            indoc! {r#"
                WITH found AS (SELECT *
                FROM "users"
                WHERE "email" = $1
                LIMIT 1), inserted AS (INSERT INTO "users" ("email", "user_name") SELECT $2, $3 WHERE NOT EXISTS (SELECT 1 FROM found) RETURNING *)
                SELECT * FROM found UNION ALL SELECT * FROM inserted"#}
        );
        assert_eq!(plan.create.values.len(), 3);
        assert_eq!(plan.create.placeholder_count(), 3);
    }

    #[test]
    fn upsert_feeds_update_values_into_the_create_payload() {
        let update = UpdateDescriptor::new(TableRef::new("users"), users_shape())
            .set("age", SetValue::Value(40.into()))
            .set("userName", SetValue::Value("Ada L.".into()))
            .filter(Predicate::compare(
                ColumnRef::new("email"),
                Comparison::Equal(Operand::value("a@x")),
            ));
        let create = InsertDescriptor::new(TableRef::new("users"), users_shape(), [
            "email", "userName",
        ])
        .row([
            InsertValue::Value("a@x".into()),
            InsertValue::Value("Ada".into()),
        ]);
        let plan = compile_upsert(&WRITER, &update, &create, CompileOptions::default()).unwrap();
        assert!(plan.update.text.starts_with(r#"UPDATE "users" SET"#));
        assert!(plan.update.text.ends_with("RETURNING *"));
        // The created row carries the update's values: name overwritten,
        // age appended.
        assert!(plan.create.text.contains(r#"("email", "user_name", "age")"#));
        assert!(
            plan.create
                .values
                .contains(&Value::Varchar(Some("Ada L.".into())))
        );
        assert!(plan.create.values.contains(&Value::Int32(Some(40))));
        assert!(
            !plan
                .create
                .values
                .contains(&Value::Varchar(Some("Ada".into())))
        );
    }

    #[test]
    fn upsert_without_filter_is_a_compile_error() {
        let update = UpdateDescriptor::new(TableRef::new("users"), users_shape())
            .set("age", SetValue::Value(40.into()));
        let create = InsertDescriptor::new(TableRef::new("users"), users_shape(), ["email"])
            .row([InsertValue::Value("a@x".into())]);
        let error = compile_upsert(&WRITER, &update, &create, CompileOptions::default()).unwrap_err();
        assert!(quarry::is_compile_error(&error));
    }
}
