//! Library wrapper around the `portalws` binary.
//!
//! `cargo test -p portalws-cli --lib` typechecks the CLI without building the binary test suite,
//! so the binary crate root is compiled here as a module.

#[allow(dead_code)]
#[path = "main.rs"]
mod main_bin;
