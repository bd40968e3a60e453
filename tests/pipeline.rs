#[cfg(test)]
mod tests {
    use quarry::{
        JoinKind, JoinSpec, JoinTarget, QueryDescriptor, Result, RowLabeled, Shape, ShapeEntry,
        TableRef, Value, parse_row, response_entries,
    };

    fn upper(value: Value) -> Result<Value> {
        match value {
            Value::Varchar(Some(v)) => Ok(Value::Varchar(Some(v.to_uppercase()))),
            other => Ok(other),
        }
    }

    fn row(labels: &[&str], values: Vec<Value>) -> RowLabeled {
        RowLabeled::new(
            labels.iter().map(|l| l.to_string()).collect(),
            values.into_boxed_slice(),
        )
    }

    #[test]
    fn parse_renames_to_logical_keys_and_applies_codecs() {
        let entries = vec![
            ShapeEntry::new("userName", "user_name").with_parse(upper),
            ShapeEntry::new("id", "id"),
        ];
        let parsed = parse_row(
            &entries,
            row(
                &["id", "user_name", "extra"],
                vec![
                    Value::Int64(Some(1)),
                    Value::Varchar(Some("ada".into())),
                    Value::Boolean(Some(true)),
                ],
            ),
        )
        .unwrap();
        assert_eq!(parsed.names(), ["id", "userName", "extra"]);
        assert_eq!(
            parsed.get_column("userName"),
            Some(&Value::Varchar(Some("ADA".into())))
        );
        // Columns no shape entry claims pass through untouched.
        assert_eq!(parsed.get_column("extra"), Some(&Value::Boolean(Some(true))));
    }

    #[test]
    fn response_entries_cover_target_ctes_and_joins() {
        let users = Shape::new([ShapeEntry::new("id", "id")]);
        let orders = Shape::new([ShapeEntry::new("total", "total")]);
        let cte_shape = Shape::new([ShapeEntry::new("recent", "recent")]);
        let query = QueryDescriptor::new(TableRef::new("users"), users)
            .cte(quarry::Cte {
                name: "recent".into(),
                query: QueryDescriptor::new(TableRef::new("orders"), orders.clone()),
                shape: cte_shape,
            })
            .join(JoinSpec::new(
                JoinKind::Left,
                JoinTarget::Table(TableRef::new("orders")),
                orders,
            ));
        let entries = response_entries(&query);
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_ref()).collect();
        assert_eq!(keys, ["id", "recent", "total"]);
    }

    #[test]
    fn shapes_derive_column_names_through_the_supplied_mapper() {
        fn snake(key: &str) -> String {
            let mut out = String::new();
            for c in key.chars() {
                if c.is_uppercase() {
                    out.push('_');
                    out.extend(c.to_lowercase());
                } else {
                    out.push(c);
                }
            }
            out
        }
        let shape = Shape::from_keys(["id", "userName", "createdAt"], snake);
        assert_eq!(shape.by_key("userName").unwrap().column, "user_name");
        assert_eq!(shape.by_column("created_at").unwrap().key, "createdAt");
    }

    #[test]
    fn failing_codec_propagates() {
        fn reject(_: Value) -> Result<Value> {
            Err(quarry::Error::msg("bad column"))
        }
        let entries = vec![ShapeEntry::new("id", "id").with_parse(reject)];
        let result = parse_row(&entries, row(&["id"], vec![Value::Int64(Some(1))]));
        assert!(result.is_err());
    }
}
