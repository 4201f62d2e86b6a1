//! Testing utilities and mock implementations.
//!
//! This module provides fakes for the external collaborators: the fetch
//! executable, the object store and the course platform, so the full
//! migration path can be exercised without real infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use coursebridge_core::testing::{MockObjectStore, ScriptedLauncher};
//!
//! let launcher = ScriptedLauncher::for_manifest(&manifest);
//! let store = MockObjectStore::new();
//!
//! store.fail_keys_containing("broken.mp4").await;
//! ```

mod mock_object_store;
mod mock_platform;
mod scripted_launcher;

pub use mock_object_store::{MockObjectStore, RecordedPut};
pub use mock_platform::{MockPlatform, RecordedPlatformCall};
pub use scripted_launcher::{RecordedLaunch, ScriptedLauncher};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::manifest::{CourseManifest, JobPayload};

    /// A course with two modules of two lessons each.
    pub fn two_by_two_course(name: &str) -> CourseManifest {
        CourseManifest::new(name)
            .with_module("Getting Started", &["Welcome", "Setup"])
            .with_module("Deep Dive", &["Ownership", "Lifetimes"])
    }

    /// Assign `<course>-l<n>` ids to every lesson in course order.
    pub fn with_lesson_ids(mut manifest: CourseManifest, course_id: &str) -> CourseManifest {
        let mut n = 0;
        for module in &mut manifest.course.modules {
            for lesson in &mut module.lessons {
                n += 1;
                lesson.id = Some(format!("{}-l{}", course_id, n));
            }
        }
        manifest
    }

    /// A workspace-mode payload.
    pub fn workspace_payload(manifest: CourseManifest, workspace_id: &str, course_id: &str) -> JobPayload {
        JobPayload::new(
            manifest,
            Some(workspace_id.to_string()),
            Some(course_id.to_string()),
        )
    }
}
