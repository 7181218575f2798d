//! Crate-level tests driving whole operations against the mock ledger

mod pipeline_scenarios;
