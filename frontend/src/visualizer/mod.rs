// Visualizer Module - timeline geometry and user interaction

// Time mapping, viewport, markers, lanes and data synchronization
pub mod timeline;

// Pointer gestures
pub mod interaction;
