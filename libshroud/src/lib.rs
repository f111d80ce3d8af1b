pub mod commitment;
pub mod crypto;
pub mod helpers;
pub mod keystore;
pub mod ledger;
pub mod splits;
