//! End-to-end scenarios and cross-module invariants (§8). Each module
//! below exercises one or more components together the way a real
//! caller would chain them, rather than re-testing what each crate's
//! own unit tests already cover in isolation.

mod anvil_scenarios;
mod haproxy_scenarios;
mod invariants;
mod postscreen_scenarios;
mod resolver_scenarios;
mod scheduler_scenarios;
