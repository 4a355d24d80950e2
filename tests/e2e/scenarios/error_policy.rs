use crate::harness::{Assertion, Scenario};

#[test]
fn test_lenient_run_continues_past_failed_analyze() {
    Scenario::new("lenient_run_continues_past_failed_analyze")
        .with_index("orders", "idx_orders_status", 65536)
        .failing_statement("ANALYZE", "permission denied for table orders")
        .indexes(&["idx_orders_status"])
        .reindex()
        .assert_succeeded(1)
        .assert_index_size("idx_orders_status", 8192)
        .assert_consistent()
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_strict_run_stops_on_failed_analyze() {
    Scenario::new("strict_run_stops_on_failed_analyze")
        .with_index("orders", "idx_orders_status", 65536)
        .with_index("users", "users_email_idx", 4096)
        .failing_statement("ANALYZE", "permission denied for table orders")
        .indexes(&["idx_orders_status", "users_email_idx"])
        .strict()
        .reindex()
        .assert(Assertion::FatalError)
        .assert_index_size("idx_orders_status", 65536)
        .assert_untouched("users_email_idx")
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_failed_drop_of_original_keeps_it() {
    Scenario::new("failed_drop_of_original_keeps_it")
        .with_index("orders", "idx_orders_status", 65536)
        .failing_statement(
            "DROP INDEX CONCURRENTLY public.idx_orders_status",
            "lock timeout",
        )
        .indexes(&["idx_orders_status"])
        .reindex()
        .assert_succeeded(0)
        .assert(Assertion::Failed(1))
        .assert_statements("ALTER INDEX", 0)
        .assert_index_size("idx_orders_status", 65536)
        .assert(Assertion::TotalSizes { before: 0, after: 0 })
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_drop_cancelled_halfway_finishes_swap() {
    Scenario::new("drop_cancelled_halfway_finishes_swap")
        .with_index("orders", "idx_orders_status", 65536)
        .drop_cancelled_halfway("idx_orders_status")
        .indexes(&["idx_orders_status"])
        .reindex()
        .assert_succeeded(1)
        .assert(Assertion::Failed(0))
        .assert_statements("ALTER INDEX", 1)
        .assert_index_size("idx_orders_status", 8192)
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_interrupt_stops_run() {
    Scenario::new("interrupt_stops_run")
        .with_index("orders", "idx_orders_status", 65536)
        .with_index("users", "users_email_idx", 4096)
        .interrupt_during("CREATE INDEX CONCURRENTLY idx_orders_status_new")
        .indexes(&["idx_orders_status", "users_email_idx"])
        .reindex()
        .assert(Assertion::Interrupted)
        .assert_end_message("Reindexing interrupted by user")
        .assert_untouched("users_email_idx")
        .assert_index_size("idx_orders_status", 65536)
        .assert_statements("ALTER INDEX", 0)
        .run()
        .unwrap();
}
