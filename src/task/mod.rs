//! Task orchestration core: the Executor/Step state machine, the typed task
//! environment threaded between steps, and the TaskBuilder that assembles the
//! correct step sequences for List / Apply / Undo.

pub mod builder;
pub mod env;
pub mod executor;
pub mod step;
pub mod update;

pub use builder::TaskBuilder;
pub use env::TaskEnv;
pub use executor::{Executor, TickError};
pub use step::{Step, StepOutcome};
pub use update::{StateCode, TaskStatus, UpdateEmitter};
