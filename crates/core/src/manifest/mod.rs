//! Course manifest model and the naming rules derived from it.
//!
//! A manifest is the platform's course document: an ordered list of modules,
//! each with ordered lessons. The worker hands it verbatim to the fetch
//! executable and uses it to map marker lines back to lesson directories.

mod layout;
mod types;

pub use layout::{
    course_prefix, join_relative, lesson_dir_name, sanitize, validate_identifier, LessonLocation,
    StorageLayout,
};
pub use types::{Course, CourseManifest, JobPayload, Lesson, Module, VideoDescriptor};
