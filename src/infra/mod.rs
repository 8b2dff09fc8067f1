pub mod in_memory_store;
pub mod json_output_adapter;
pub mod json_row_source;

pub use in_memory_store::InMemoryStore;
pub use json_output_adapter::{read_timetable, JsonFileSink};
pub use json_row_source::JsonRowSource;
