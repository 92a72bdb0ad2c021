// tests/integration_test.rs

//! Integration tests exercising the engine end-to-end against real
//! `Server`/`Database` instances — no RESP socket in the loop, since the
//! wire codec and TCP acceptor are out of scope (spec.md §1); these
//! drive the exact seam a real connection loop would call through
//! (`Server::exec`/`Database::exec`).

mod integration {
    pub mod hash_commands_test;
    pub mod keys_commands_test;
    pub mod list_commands_test;
    pub mod pubsub_test;
    pub mod string_commands_test;
    pub mod test_helpers;
    pub mod transaction_test;
    pub mod ttl_test;
    pub mod zset_commands_test;
}
