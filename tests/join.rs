#[cfg(test)]
mod tests {
    use indoc::indoc;
    use quarry::{
        ColumnRef, CompileOptions, Comparison, GenericSqlWriter, JoinKind, JoinSpec, JoinTarget,
        Operand, Predicate, QueryDescriptor, SelectItem, Shape, ShapeEntry, TableRef,
        compile_select,
    };

    const WRITER: GenericSqlWriter = GenericSqlWriter::new();

    fn users_shape() -> Shape {
        Shape::new([
            ShapeEntry::new("id", "id"),
            ShapeEntry::new("userName", "user_name"),
        ])
    }

    fn orders_shape() -> Shape {
        Shape::new([
            ShapeEntry::new("id", "id"),
            ShapeEntry::new("userId", "user_id"),
            ShapeEntry::new("total", "total"),
        ])
    }

    fn static_on() -> Predicate {
        Predicate::compare(
            ColumnRef::qualified("orders", "userId"),
            Comparison::Equal(Operand::Column(ColumnRef::qualified("users", "id"))),
        )
    }

    #[test]
    fn trivial_join_compiles_with_qualified_columns() {
        let query = QueryDescriptor::new(TableRef::new("users"), users_shape())
            .columns([
                SelectItem::Column(ColumnRef::qualified("users", "id")),
                SelectItem::Column(ColumnRef::qualified("orders", "total")),
            ])
            .join(
                JoinSpec::new(
                    JoinKind::Left,
                    JoinTarget::Table(TableRef::new("orders")),
                    orders_shape(),
                )
                .on(static_on()),
            );
        let compiled = compile_select(&WRITER, &query, CompileOptions::default()).unwrap();
        assert_eq!(
            compiled.text,
            indoc! {r#"
                SELECT users."id", orders."total"
                FROM "users"
                LEFT JOIN "orders" ON orders."user_id" = users."id""#}
        );
        assert!(compiled.values.is_empty());
    }

    #[test]
    fn identical_static_joins_collapse_to_one_clause() {
        let join = || {
            JoinSpec::new(
                JoinKind::Inner,
                JoinTarget::Table(TableRef::new("orders")),
                orders_shape(),
            )
            .on(static_on())
        };
        let query = QueryDescriptor::new(TableRef::new("users"), users_shape())
            .columns([SelectItem::Column(ColumnRef::qualified("users", "id"))])
            .join(join())
            .join(join());
        let compiled = compile_select(&WRITER, &query, CompileOptions::default()).unwrap();
        assert_eq!(compiled.text.matches("INNER JOIN").count(), 1);
    }

    #[test]
    fn dynamic_on_condition_is_not_deduplicated() {
        let join = |total: i64| {
            JoinSpec::new(
                JoinKind::Inner,
                JoinTarget::Table(TableRef::new("orders")),
                orders_shape(),
            )
            .alias("o")
            .on(Predicate::and([
                Predicate::compare(
                    ColumnRef::qualified("o", "userId"),
                    Comparison::Equal(Operand::Column(ColumnRef::qualified("users", "id"))),
                ),
                Predicate::compare(
                    ColumnRef::qualified("o", "total"),
                    Comparison::Greater(Operand::value(total)),
                ),
            ]))
        };
        let query = QueryDescriptor::new(TableRef::new("users"), users_shape())
            .columns([SelectItem::Column(ColumnRef::qualified("users", "id"))])
            .join(join(0))
            .join(join(10));
        let compiled = compile_select(&WRITER, &query, CompileOptions::default()).unwrap();
        assert_eq!(compiled.text.matches("INNER JOIN").count(), 2);
        assert_eq!(compiled.values.len(), 2);
    }

    #[test]
    fn computed_join_renders_subselect() {
        let sub = QueryDescriptor::new(TableRef::new("orders"), orders_shape())
            .columns([SelectItem::Column(ColumnRef::new("userId"))])
            .filter(Predicate::compare(
                ColumnRef::new("total"),
                Comparison::Greater(Operand::value(100)),
            ));
        let query = QueryDescriptor::new(TableRef::new("users"), users_shape())
            .columns([SelectItem::Column(ColumnRef::qualified("users", "id"))])
            .join(
                JoinSpec::new(
                    JoinKind::Inner,
                    JoinTarget::Subquery(Box::new(sub)),
                    Shape::new([ShapeEntry::new("userId", "user_id")]),
                )
                .alias("big")
                .on(Predicate::compare(
                    ColumnRef::qualified("big", "userId"),
                    Comparison::Equal(Operand::Column(ColumnRef::qualified("users", "id"))),
                )),
            );
        let compiled = compile_select(&WRITER, &query, CompileOptions::default()).unwrap();
        assert_eq!(
            compiled.text,
            indoc! {r#"
                SELECT users."id"
                FROM "users"
                INNER JOIN (SELECT "user_id"
                FROM "orders"
                WHERE "total" > $1) big ON big."user_id" = users."id""#}
        );
        assert_eq!(compiled.values.len(), 1);
    }

    #[test]
    fn subquery_referencing_outer_columns_becomes_lateral() {
        let last_order = || {
            QueryDescriptor::new(TableRef::new("orders"), orders_shape())
                .columns([SelectItem::Column(ColumnRef::new("total"))])
                .filter(Predicate::compare(
                    ColumnRef::new("userId"),
                    Comparison::Equal(Operand::Column(ColumnRef::qualified("users", "id"))),
                ))
                .limit(1)
        };
        let query = QueryDescriptor::new(TableRef::new("users"), users_shape())
            .columns([
                SelectItem::Column(ColumnRef::qualified("users", "id")),
                SelectItem::Column(ColumnRef::qualified("last_order", "total")),
            ])
            .join(
                JoinSpec::new(
                    JoinKind::Left,
                    JoinTarget::Subquery(Box::new(last_order())),
                    Shape::new([ShapeEntry::new("total", "total")]),
                )
                .alias("last_order"),
            );
        let compiled = compile_select(&WRITER, &query, CompileOptions::default()).unwrap();
        assert_eq!(
            compiled.text,
            indoc! {r#"
                SELECT users."id", last_order."total"
                FROM "users"
                LEFT JOIN LATERAL (SELECT "total"
                FROM "orders"
                WHERE "user_id" = users."id"
                LIMIT 1) last_order ON true"#}
        );
    }

    #[test]
    fn identical_single_value_laterals_merge_under_one_alias() {
        let last_total = || {
            QueryDescriptor::new(TableRef::new("orders"), orders_shape())
                .columns([SelectItem::Column(ColumnRef::new("total"))])
                .filter(Predicate::compare(
                    ColumnRef::new("userId"),
                    Comparison::Equal(Operand::Column(ColumnRef::qualified("users", "id"))),
                ))
                .limit(1)
        };
        let lateral = |alias: &'static str| {
            JoinSpec::new(
                JoinKind::Left,
                JoinTarget::Subquery(Box::new(last_total())),
                Shape::new([ShapeEntry::new("total", "total")]),
            )
            .alias(alias)
        };
        let query = QueryDescriptor::new(TableRef::new("users"), users_shape())
            .columns([
                SelectItem::Column(ColumnRef::qualified("first", "total")),
                SelectItem::Column(ColumnRef::qualified("second", "total")),
            ])
            .join(lateral("first"))
            .join(lateral("second"));
        let compiled = compile_select(&WRITER, &query, CompileOptions::default()).unwrap();
        // One join clause; both requested outputs read from the merged alias.
        assert_eq!(compiled.text.matches("JOIN LATERAL").count(), 1);
        assert_eq!(compiled.text.matches(r#"first."total""#).count(), 2);
        assert!(!compiled.text.contains("second."));
    }

    #[test]
    fn cte_targets_resolve_against_their_declared_shape() {
        let active = QueryDescriptor::new(TableRef::new("users"), users_shape())
            .columns([SelectItem::Column(ColumnRef::new("id"))])
            .filter(Predicate::compare(
                ColumnRef::new("userName"),
                Comparison::NotEqual(Operand::null()),
            ));
        let query = QueryDescriptor::new(TableRef::new("active"), Shape::default())
            .cte(quarry::Cte {
                name: "active".into(),
                query: active,
                shape: Shape::new([ShapeEntry::new("id", "id")]),
            })
            .columns([SelectItem::Column(ColumnRef::new("id"))]);
        let compiled = compile_select(&WRITER, &query, CompileOptions::default()).unwrap();
        assert_eq!(
            compiled.text,
            indoc! {r#"
                WITH "active" AS (SELECT "id"
                FROM "users"
                WHERE "user_name" IS NOT NULL)
                SELECT "id"
                FROM "active""#}
        );
    }
}
