pub mod greetings;
pub mod sweeps;
