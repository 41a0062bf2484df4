// Dashboard module - topic monitoring
//
// Keeps the last value published on every topic and turns the registry into
// rows for a monitoring table.

mod last_values;

pub use last_values::{LastValues, TopicRow};
