//! Memory records and their durable storage.

pub mod storage;
pub mod types;

pub use storage::{MemoryStore, SharedStore};
pub use types::{
    AccessLevel, AgentIdentity, Document, EntityRef, Interaction, Lesson, LessonOrigin,
    LessonStatus, MemoryId, ParseStatus, SharedRecord,
};
