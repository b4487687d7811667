mod main_loop;
mod snapshot;

pub use main_loop::start;
