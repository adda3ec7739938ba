/// Bounded in-flight frame gate.
pub mod slots;
