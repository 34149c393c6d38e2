//! Station process wiring, shared by the binary and its tests

pub mod station;

pub use station::Station;
