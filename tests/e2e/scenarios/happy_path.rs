use crate::harness::{Assertion, Build, Scenario};

#[test]
fn test_single_index_rebuilt() {
    Scenario::new("single_index_rebuilt")
        .with_index("orders", "idx_orders_status", 65536)
        .builds("idx_orders_status", &[Build::Valid { size: 16384 }])
        .indexes(&["idx_orders_status"])
        .reindex()
        .assert_succeeded(1)
        .assert_retries(0)
        .assert_index_size("idx_orders_status", 16384)
        .assert(Assertion::TotalSizes {
            before: 65536,
            after: 16384,
        })
        .assert(Assertion::StatementsInOrder(vec![
            "DROP INDEX CONCURRENTLY IF EXISTS public.idx_orders_status_new".into(),
            "CREATE INDEX CONCURRENTLY idx_orders_status_new ON public.orders USING btree (id)"
                .into(),
            "ANALYZE public.orders".into(),
            "DROP INDEX CONCURRENTLY public.idx_orders_status".into(),
            "ALTER INDEX public.idx_orders_status_new RENAME TO idx_orders_status".into(),
            "ANALYZE public.orders".into(),
        ]))
        .assert_end_message("All indexes/tables reindexed")
        .assert_consistent()
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_table_indexes_in_name_order() {
    Scenario::new("table_indexes_in_name_order")
        .with_index("orders", "orders_status_idx", 4096)
        .with_primary_key("orders", "orders_pkey", 4096)
        .with_index("orders", "orders_created_idx", 4096)
        .with_index("users", "users_email_idx", 4096)
        .tables(&["orders"])
        .reindex()
        .assert(Assertion::TablesProcessed(1))
        .assert(Assertion::Seen(3))
        .assert_succeeded(3)
        .assert(Assertion::StatementsInOrder(vec![
            "CREATE INDEX CONCURRENTLY orders_created_idx_new ON public.orders USING btree (id)"
                .into(),
            "CREATE UNIQUE INDEX CONCURRENTLY orders_pkey_new ON public.orders USING btree (id)"
                .into(),
            "CREATE INDEX CONCURRENTLY orders_status_idx_new ON public.orders USING btree (id)"
                .into(),
        ]))
        .assert_untouched("users_email_idx")
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_indexes_before_tables() {
    Scenario::new("indexes_before_tables")
        .with_index("orders", "orders_status_idx", 4096)
        .with_index("users", "users_email_idx", 4096)
        .indexes(&["users_email_idx"])
        .tables(&["orders"])
        .reindex()
        .assert(Assertion::Seen(2))
        .assert(Assertion::StatementsInOrder(vec![
            "ALTER INDEX public.users_email_idx_new RENAME TO users_email_idx".into(),
            "ALTER INDEX public.orders_status_idx_new RENAME TO orders_status_idx".into(),
        ]))
        .run()
        .unwrap();
}

#[test]
fn test_second_run_resolves_again() {
    Scenario::new("second_run_resolves_again")
        .with_index("orders", "orders_status_idx", 65536)
        .builds(
            "orders_status_idx",
            &[Build::Valid { size: 32768 }, Build::Valid { size: 16384 }],
        )
        .indexes(&["orders_status_idx"])
        .reindex()
        .assert_index_size("orders_status_idx", 32768)
        .wait_minutes(60)
        .reindex()
        .assert_succeeded(1)
        .assert_index_size("orders_status_idx", 16384)
        .assert(Assertion::TotalSizes {
            before: 32768,
            after: 16384,
        })
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_schema_qualified_and_quoted_names() {
    Scenario::new("schema_qualified_and_quoted_names")
        .with_index_in("sales", "Orders", "Orders_Status_idx", 4096)
        .with_index_in("public", "Orders", "unrelated_idx", 4096)
        .tables(&["sales.Orders"])
        .reindex()
        .assert(Assertion::Seen(1))
        .assert_succeeded(1)
        .assert(Assertion::StatementsInOrder(vec![
            "CREATE INDEX CONCURRENTLY \"Orders_Status_idx_new\" ON sales.\"Orders\" USING btree (id)"
                .into(),
            "ALTER INDEX sales.\"Orders_Status_idx_new\" RENAME TO \"Orders_Status_idx\"".into(),
        ]))
        .assert(Assertion::IndexExists {
            schema: "sales".into(),
            name: "Orders_Status_idx".into(),
        })
        .assert_untouched("unrelated_idx")
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_empty_plan() {
    Scenario::new("empty_plan")
        .with_index("orders", "orders_status_idx", 4096)
        .reindex()
        .assert(Assertion::NoStatements)
        .assert(Assertion::TimeExit(false))
        .assert_end_message("No indexes were found to reindex")
        .run()
        .unwrap();
}
