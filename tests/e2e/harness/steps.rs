use std::time::Duration;

use super::assertions::Assertion;

/// All possible actions in a test scenario
#[derive(Debug)]
pub enum ScenarioStep {
    // Time control
    Wait { duration: Duration },

    // Runs the rebuild with the scenario's plan and settings
    Reindex,

    // Assertions (can be interspersed)
    Assert { assertion: Assertion },
}
