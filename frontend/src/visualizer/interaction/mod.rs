// User interaction handling

// Pointer gesture state machine (tap vs drag, wheel zoom)
pub mod gesture;
