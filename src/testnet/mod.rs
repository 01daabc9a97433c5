//! Helpers shared by unit tests: fast settings, throwaway nodes and funded wallets

pub mod test_utils;

pub use test_utils::*;
