//! Domain types exchanged between the orchestrator and its handlers
//!
//! Tasks, handler/task type tags, priorities and messages. Everything here
//! is plain data with serde support; behavior lives in the components.

pub mod message;
pub mod task;

pub use message::{Message, MessageType};
pub use task::{
    HandlerType, Priority, Task, TaskStatus, TaskType, TEST_FLAG_KEY, TEST_ID_KEY,
};
