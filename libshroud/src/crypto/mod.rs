pub mod blind;
pub mod hashes;
pub mod keys;
pub mod messaging;
