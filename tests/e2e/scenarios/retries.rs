use crate::harness::{Assertion, Build, Scenario};

#[test]
fn test_invalid_on_every_attempt() {
    Scenario::new("invalid_on_every_attempt")
        .with_index("orders", "idx_orders_status", 65536)
        .builds("idx_orders_status", &[Build::Invalid, Build::Invalid])
        .indexes(&["idx_orders_status"])
        .retries(2)
        .reindex()
        .assert_statements("CREATE INDEX CONCURRENTLY idx_orders_status_new", 2)
        .assert_statements("DROP INDEX CONCURRENTLY public.idx_orders_status_new", 2)
        .assert_statements("ALTER", 0)
        .assert_statements("ANALYZE", 0)
        .assert_statements("DROP INDEX CONCURRENTLY public.idx_orders_status", 2)
        .assert_retries(2)
        .assert_succeeded(0)
        .assert(Assertion::Failed(1))
        .assert_index_size("idx_orders_status", 65536)
        .assert(Assertion::TotalSizes { before: 0, after: 0 })
        .assert_consistent()
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_valid_on_second_attempt() {
    Scenario::new("valid_on_second_attempt")
        .with_index("orders", "idx_orders_status", 65536)
        .builds(
            "idx_orders_status",
            &[Build::Invalid, Build::Valid { size: 4096 }],
        )
        .indexes(&["idx_orders_status"])
        .retries(3)
        .reindex()
        .assert_succeeded(1)
        .assert_retries(1)
        .assert_statements("CREATE INDEX CONCURRENTLY", 2)
        .assert_statements("ALTER INDEX", 1)
        .assert_index_size("idx_orders_status", 4096)
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_failed_build_without_leftover() {
    Scenario::new("failed_build_without_leftover")
        .with_index("orders", "idx_orders_status", 65536)
        .builds(
            "idx_orders_status",
            &[Build::Error, Build::Valid { size: 4096 }],
        )
        .indexes(&["idx_orders_status"])
        .reindex()
        .assert_succeeded(1)
        .assert_retries(1)
        .assert_statements("DROP INDEX CONCURRENTLY public.idx_orders_status_new", 0)
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_leftover_from_earlier_run_is_dropped() {
    Scenario::new("leftover_from_earlier_run_is_dropped")
        .with_index("orders", "idx_orders_status", 65536)
        .with_index("orders", "idx_orders_status_new", 1024)
        .indexes(&["idx_orders_status"])
        .reindex()
        .assert_succeeded(1)
        .assert_index_size("idx_orders_status", 8192)
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_failed_cleanup_is_retried_once() {
    Scenario::new("failed_cleanup_is_retried_once")
        .with_index("orders", "idx_orders_status", 65536)
        .builds("idx_orders_status", &[Build::Invalid])
        .failing_statement(
            "DROP INDEX CONCURRENTLY public.idx_orders_status_new",
            "lock timeout",
        )
        .indexes(&["idx_orders_status"])
        .retries(1)
        .reindex()
        .assert(Assertion::Failed(1))
        .assert_statements("DROP INDEX CONCURRENTLY IF EXISTS", 2)
        .assert_consistent()
        .run()
        .unwrap();
}

#[test]
fn test_pause_after_every_attempt() {
    Scenario::new("pause_after_every_attempt")
        .with_index("orders", "idx_orders_status", 65536)
        .builds(
            "idx_orders_status",
            &[Build::Invalid, Build::Valid { size: 4096 }],
        )
        .indexes(&["idx_orders_status"])
        .pause_secs(5)
        .reindex()
        .assert(Assertion::Custom(Box::new(|state| {
            let report = state.report.ok_or_else(|| anyhow::anyhow!("no report"))?;
            // Two builds of one second each plus two pauses
            anyhow::ensure!(
                report.elapsed_secs == 12.0,
                "elapsed {}s, expected 12s",
                report.elapsed_secs
            );
            Ok(())
        })))
        .run()
        .unwrap();
}
