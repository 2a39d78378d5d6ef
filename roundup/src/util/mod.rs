mod process;

pub use process::{is_process_alive, thread_count};
