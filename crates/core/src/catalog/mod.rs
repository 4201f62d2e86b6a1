//! Course catalog decoration.
//!
//! Merges the per-lesson migration state from the ledger into the course
//! structure returned by the platform, so clients can show which lessons
//! are already playable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ledger::{LessonState, LessonStatus};
use crate::manifest::CourseManifest;

/// A course with migration state attached to every lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseView {
    pub name: String,
    pub modules: Vec<ModuleView>,
    pub lessons_total: usize,
    pub lessons_completed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleView {
    pub name: String,
    pub order: u32,
    pub lessons: Vec<LessonView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    /// Directory of the lesson relative to the course prefix.
    pub relative_dir: String,
    pub processing_status: LessonStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
}

/// Build the view of `manifest`, taking lesson state from `statuses`
/// (keyed by lesson id). Lessons without an id or without a ledger row
/// are `idle`.
pub fn decorate(manifest: &CourseManifest, statuses: &HashMap<String, LessonState>) -> CourseView {
    let mut modules: Vec<ModuleView> = manifest
        .course
        .modules
        .iter()
        .enumerate()
        .map(|(index, module)| ModuleView {
            name: module.name.clone(),
            order: module.order.unwrap_or(index as u32),
            lessons: Vec::with_capacity(module.lessons.len()),
        })
        .collect();

    let mut lessons_completed = 0;
    for location in manifest.lesson_locations() {
        let state = location
            .lesson_id
            .as_ref()
            .and_then(|id| statuses.get(id));

        let processing_status = state
            .map(|s| s.processing_status)
            .unwrap_or(LessonStatus::Idle);
        if processing_status == LessonStatus::Completed {
            lessons_completed += 1;
        }

        modules[location.module_index].lessons.push(LessonView {
            id: location.lesson_id,
            title: location.title,
            relative_dir: location.relative_dir,
            processing_status,
            stream_url: state.and_then(|s| s.stream_url.clone()),
        });
    }

    CourseView {
        name: manifest.course.name.clone(),
        modules,
        lessons_total: manifest.total_lessons(),
        lessons_completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_unknown_lessons_are_idle() {
        let manifest = fixtures::two_by_two_course("Rust");
        let view = decorate(&manifest, &HashMap::new());

        assert_eq!(view.lessons_total, 4);
        assert_eq!(view.lessons_completed, 0);
        assert_eq!(view.modules.len(), 2);
        for lesson in view.modules.iter().flat_map(|m| &m.lessons) {
            assert_eq!(lesson.processing_status, LessonStatus::Idle);
            assert!(lesson.stream_url.is_none());
        }
        assert_eq!(view.modules[1].lessons[0].relative_dir, "1_Deep_Dive/0_Ownership");
    }

    #[test]
    fn test_ledger_state_is_merged() {
        let manifest = fixtures::with_lesson_ids(fixtures::two_by_two_course("Rust"), "c1");
        let mut statuses = HashMap::new();
        statuses.insert(
            "c1-l1".to_string(),
            LessonState {
                processing_status: LessonStatus::Completed,
                stream_url: Some("https://cdn.test/a.mp4".to_string()),
            },
        );
        statuses.insert(
            "c1-l2".to_string(),
            LessonState {
                processing_status: LessonStatus::Processing,
                stream_url: None,
            },
        );

        let view = decorate(&manifest, &statuses);
        let first = &view.modules[0].lessons[0];
        assert_eq!(first.processing_status, LessonStatus::Completed);
        assert_eq!(first.stream_url.as_deref(), Some("https://cdn.test/a.mp4"));
        assert_eq!(
            view.modules[0].lessons[1].processing_status,
            LessonStatus::Processing
        );
        assert_eq!(view.lessons_completed, 1);
    }

    #[test]
    fn test_serialized_field_names() {
        let manifest = CourseManifest::new("C").with_module("M", &["L"]);
        let json = serde_json::to_value(decorate(&manifest, &HashMap::new())).unwrap();
        assert_eq!(
            json["modules"][0]["lessons"][0]["processingStatus"],
            "idle"
        );
        assert!(json["modules"][0]["lessons"][0].get("streamUrl").is_none());
    }
}
