#[cfg(test)]
mod tests {
    use quarry::{
        ColumnRef, CompileOptions, Comparison, CompiledSql, Driver, Executor, GenericSqlWriter,
        InsertDescriptor, InsertValue, Operand, Predicate, QueryDescriptor, QueryResult, Result,
        RowLabeled, RowsAffected, SetValue, Shape, ShapeEntry, TableRef, UpdateDescriptor, Value,
        compile_or_create, compile_upsert, run_or_create, run_upsert,
        stream::{self, Stream},
    };
    use std::collections::VecDeque;

    struct MockDriver;

    impl Driver for MockDriver {
        type SqlWriter = GenericSqlWriter;

        const NAME: &'static str = "mock";

        fn sql_writer(&self) -> GenericSqlWriter {
            GenericSqlWriter::new()
        }
    }

    /// Records every statement put on the wire and answers from a script.
    struct MockExecutor {
        driver: MockDriver,
        executed: Vec<String>,
        responses: VecDeque<Vec<RowLabeled>>,
    }

    impl MockExecutor {
        fn new(responses: impl IntoIterator<Item = Vec<RowLabeled>>) -> Self {
            Self {
                driver: MockDriver,
                executed: Vec::new(),
                responses: responses.into_iter().collect(),
            }
        }
    }

    impl Executor for MockExecutor {
        type Driver = MockDriver;

        fn driver(&self) -> &MockDriver {
            &self.driver
        }

        fn run(&mut self, sql: CompiledSql) -> impl Stream<Item = Result<QueryResult>> + Send {
            self.executed.push(sql.text.clone());
            let rows = self.responses.pop_front().unwrap_or_default();
            let affected = RowsAffected {
                rows_affected: rows.len() as u64,
            };
            let items: Vec<Result<QueryResult>> = rows
                .into_iter()
                .map(|row| Ok(QueryResult::Row(row)))
                .chain([Ok(QueryResult::Affected(affected))])
                .collect();
            stream::iter(items)
        }
    }

    fn user_row(id: i64) -> RowLabeled {
        RowLabeled::new(
            ["id".to_string()].into_iter().collect(),
            vec![Value::Int64(Some(id))].into_boxed_slice(),
        )
    }

    fn users_shape() -> Shape {
        Shape::new([
            ShapeEntry::new("id", "id"),
            ShapeEntry::new("email", "email"),
            ShapeEntry::new("userName", "user_name"),
        ])
    }

    fn or_create_plan() -> quarry::OrCreatePlan {
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
        compile_or_create(
            &GenericSqlWriter::new(),
            &find,
            &create,
            CompileOptions::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn or_create_hits_the_wire_once_when_the_row_exists() {
        let mut executor = MockExecutor::new([vec![user_row(1)]]);
        let plan = or_create_plan();
        let row = run_or_create(&mut executor, &plan).await.unwrap();
        assert_eq!(row.get_column("id"), Some(&Value::Int64(Some(1))));
        assert_eq!(executor.executed.len(), 1);
        assert_eq!(executor.executed[0], plan.find.text);
    }

    #[tokio::test]
    async fn or_create_hits_the_wire_twice_when_it_creates() {
        let mut executor = MockExecutor::new([vec![], vec![user_row(2)]]);
        let plan = or_create_plan();
        let row = run_or_create(&mut executor, &plan).await.unwrap();
        assert_eq!(row.get_column("id"), Some(&Value::Int64(Some(2))));
        assert_eq!(executor.executed.len(), 2);
        assert_eq!(executor.executed[1], plan.create.text);
    }

    #[tokio::test]
    async fn upsert_stops_after_the_update_when_a_row_matched() {
        let update = UpdateDescriptor::new(TableRef::new("users"), users_shape())
            .set("userName", SetValue::Value("Ada L.".into()))
            .filter(Predicate::compare(
                ColumnRef::new("email"),
                Comparison::Equal(Operand::value("a@x")),
            ));
        let create = InsertDescriptor::new(TableRef::new("users"), users_shape(), ["email"])
            .row([InsertValue::Value("a@x".into())]);
        let plan = compile_upsert(
            &GenericSqlWriter::new(),
            &update,
            &create,
            CompileOptions::default(),
        )
        .unwrap();

        let mut executor = MockExecutor::new([vec![user_row(1)]]);
        let row = run_upsert(&mut executor, &plan).await.unwrap();
        assert_eq!(row.get_column("id"), Some(&Value::Int64(Some(1))));
        assert_eq!(executor.executed, vec![plan.update.text.clone()]);

        // Zero updated rows: fall back to find + guarded create.
        let mut executor = MockExecutor::new([vec![], vec![], vec![user_row(3)]]);
        let row = run_upsert(&mut executor, &plan).await.unwrap();
        assert_eq!(row.get_column("id"), Some(&Value::Int64(Some(3))));
        assert_eq!(
            executor.executed,
            vec![
                plan.update.text.clone(),
                plan.find.text.clone(),
                plan.create.text.clone()
            ]
        );
    }

    #[tokio::test]
    async fn execute_all_accumulates_batch_counts_in_order() {
        let mut insert =
            InsertDescriptor::new(TableRef::new("users"), users_shape(), ["email", "userName"]);
        for i in 0..12 {
            insert = insert.row([
                InsertValue::Value(format!("u{}@x", i).into()),
                InsertValue::Value(format!("user_{}", i).into()),
            ]);
        }
        let compiled = quarry::compile_insert(
            &GenericSqlWriter::new(),
            &insert,
            CompileOptions {
                max_params: 10,
                ..CompileOptions::default()
            },
        )
        .unwrap();
        // The mock reports one affected row per returned row; feed it five,
        // five and two rows to mirror the batch sizes.
        let mut executor = MockExecutor::new([
            (0..5i64).map(user_row).collect::<Vec<_>>(),
            (0..5i64).map(user_row).collect::<Vec<_>>(),
            (0..2i64).map(user_row).collect::<Vec<_>>(),
        ]);
        let total = executor.execute_all(compiled).await.unwrap();
        assert_eq!(total.rows_affected, 12);
        assert_eq!(executor.executed.len(), 3);
    }
}
