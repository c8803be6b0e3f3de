pub mod executor;
pub mod multi;
pub mod types;
pub mod unit;

pub use executor::*;
pub use multi::MultiTask;
pub use types::*;
pub use unit::{Task, TaskHandle};

/// Box a closure as a [`TaskAction`], for building lists of units
pub fn action<F>(f: F) -> TaskAction
where
    F: FnOnce(TaskHandle) + Send + 'static,
{
    Box::new(f)
}
