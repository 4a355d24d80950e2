use super::assertions::Assertion;
use super::clock::MockClock;
use super::database::{Build, FakeDatabase};
use super::runner::ScenarioRunner;
use super::steps::ScenarioStep;
use reindex_core::{CancelToken, ErrorPolicy, RunConfig, RunPlan};
use std::time::Duration;

/// Fluent DSL for building test scenarios
pub struct Scenario {
    name: String,
    clock: MockClock,
    token: CancelToken,
    database: FakeDatabase,
    plan: RunPlan,
    config: RunConfig,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    ///
    /// Pauses default to zero so scenarios only spend mock time where they
    /// ask for it.
    pub fn new(name: &str) -> Self {
        let clock = MockClock::new();
        Self {
            name: name.to_string(),
            database: FakeDatabase::new(clock.clone()),
            clock,
            token: CancelToken::new(),
            plan: RunPlan::default(),
            config: RunConfig {
                pause_secs: 0,
                ..RunConfig::default()
            },
            steps: Vec::new(),
        }
    }

    // ===== Database setup =====

    /// Add a plain index on `public.table`
    pub fn with_index(self, table: &str, name: &str, size: u64) -> Self {
        self.with_index_in("public", table, name, size)
    }

    /// Add a plain index on `schema.table`
    pub fn with_index_in(mut self, schema: &str, table: &str, name: &str, size: u64) -> Self {
        self.database.add_index(schema, table, name, size);
        self
    }

    /// Add the primary-key index of `public.table`
    pub fn with_primary_key(mut self, table: &str, name: &str, size: u64) -> Self {
        self.database.add_primary_key("public", table, name, size);
        self
    }

    /// Script the outcome of each build of `index`'s replacement
    pub fn builds(mut self, index: &str, builds: &[Build]) -> Self {
        self.database.script_builds(index, builds);
        self
    }

    /// Every build takes this long on the mock clock
    pub fn builds_take(mut self, duration: Duration) -> Self {
        self.database.set_build_duration(duration);
        self
    }

    /// The first statement containing `needle` fails with `message`
    pub fn failing_statement(mut self, needle: &str, message: &str) -> Self {
        self.database.fail_statement(needle, message);
        self
    }

    /// The concurrent drop of `public.name` is cancelled after marking the
    /// index invalid
    pub fn drop_cancelled_halfway(mut self, name: &str) -> Self {
        self.database.cancel_drop_halfway("public", name);
        self
    }

    /// The user interrupts while the statement containing `needle` runs
    pub fn interrupt_during(mut self, needle: &str) -> Self {
        self.database.interrupt_on(needle, self.token.clone());
        self
    }

    // ===== Plan =====

    /// Indexes named explicitly
    pub fn indexes(mut self, names: &[&str]) -> Self {
        self.plan.indexes = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Tables whose indexes are rebuilt
    pub fn tables(mut self, names: &[&str]) -> Self {
        self.plan.tables = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Indexes never touched
    pub fn ignore(mut self, names: &[&str]) -> Self {
        self.plan.ignore = names.iter().map(|s| s.to_string()).collect();
        self
    }

    // ===== Settings =====

    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn minutes(mut self, minutes: u64) -> Self {
        self.config.run_minutes = minutes;
        self
    }

    pub fn pause_secs(mut self, secs: u64) -> Self {
        self.config.pause_secs = secs;
        self
    }

    pub fn enforce_time(mut self) -> Self {
        self.config.enforce_time = true;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.config.dry_run = true;
        self
    }

    pub fn strict(mut self) -> Self {
        self.config.error_policy = ErrorPolicy::Strict;
        self
    }

    // ===== Actions =====

    /// Run the rebuild
    pub fn reindex(mut self) -> Self {
        self.steps.push(ScenarioStep::Reindex);
        self
    }

    /// Wait for a duration
    pub fn wait(mut self, duration: Duration) -> Self {
        self.steps.push(ScenarioStep::Wait { duration });
        self
    }

    /// Wait for N minutes
    pub fn wait_minutes(self, minutes: u64) -> Self {
        self.wait(Duration::from_secs(minutes * 60))
    }

    // ===== Assertions =====

    /// Add a general assertion
    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.steps.push(ScenarioStep::Assert { assertion });
        self
    }

    pub fn assert_succeeded(self, n: u64) -> Self {
        self.assert(Assertion::Succeeded(n))
    }

    pub fn assert_retries(self, n: u64) -> Self {
        self.assert(Assertion::Retries(n))
    }

    /// Assert how many statements start with `prefix`
    pub fn assert_statements(self, prefix: &str, count: usize) -> Self {
        self.assert(Assertion::StatementCount {
            prefix: prefix.to_string(),
            count,
        })
    }

    /// Assert no statement names `index`
    pub fn assert_untouched(self, index: &str) -> Self {
        self.assert(Assertion::NeverMentioned(index.to_string()))
    }

    pub fn assert_index_size(self, name: &str, size: u64) -> Self {
        self.assert(Assertion::IndexSize {
            schema: "public".to_string(),
            name: name.to_string(),
            size,
        })
    }

    pub fn assert_end_message(self, message: &str) -> Self {
        self.assert(Assertion::EndMessage(message.to_string()))
    }

    /// Assert the invariants every run must keep
    pub fn assert_consistent(self) -> Self {
        self.assert(Assertion::NoReplacementsLeft)
            .assert(Assertion::PrimaryKeysNeverMissing)
    }

    // ===== Execution =====

    /// Execute the scenario and return results
    pub fn run(self) -> ScenarioResult {
        let step_count = self.steps.len();
        let mut runner = ScenarioRunner::new(
            self.database,
            self.clock,
            self.token,
            self.plan,
            self.config,
        );

        match runner.execute(&self.steps) {
            Ok(()) => ScenarioResult {
                name: self.name,
                success: true,
                steps_executed: step_count,
                failure_step: None,
                error: None,
            },
            Err(e) => {
                let failure_step = runner.current_step();
                ScenarioResult {
                    name: self.name,
                    success: false,
                    steps_executed: failure_step,
                    failure_step: Some(failure_step),
                    error: Some(format!("{:?}", e)),
                }
            }
        }
    }
}

/// Result of running a scenario
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub steps_executed: usize,
    pub failure_step: Option<usize>,
    pub error: Option<String>,
}

impl ScenarioResult {
    /// Unwrap the result, panicking if it failed
    pub fn unwrap(self) {
        if !self.success {
            panic!(
                "Scenario '{}' failed at step {}: {}",
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }

    /// Expect the result to be successful
    pub fn expect(self, msg: &str) {
        if !self.success {
            panic!(
                "{}: Scenario '{}' failed at step {}: {}",
                msg,
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }
}
