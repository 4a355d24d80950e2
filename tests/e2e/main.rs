//! End-to-end scenarios: full runs against an in-memory database.

mod harness;
