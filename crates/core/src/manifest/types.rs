//! Course manifest and job payload types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The course document handed to the fetch executable.
///
/// Only the fields the pipeline reads are typed; everything else the
/// platform returned is kept in `extra` so the executable sees the
/// original document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseManifest {
    pub course: Course,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub name: String,
    /// Display order assigned by the platform. Falls back to the module's
    /// position when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoDescriptor>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    /// File name the executable writes the video under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CourseManifest {
    /// Creates a manifest with the given course name and no modules.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            course: Course {
                name: name.into(),
                modules: Vec::new(),
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    /// Appends a module with the given lesson titles (builder style).
    pub fn with_module(mut self, name: impl Into<String>, lessons: &[&str]) -> Self {
        let order = self.course.modules.len() as u32;
        self.course.modules.push(Module {
            name: name.into(),
            order: Some(order),
            lessons: lessons
                .iter()
                .map(|title| Lesson {
                    id: None,
                    title: title.to_string(),
                    video: None,
                    extra: Map::new(),
                })
                .collect(),
            extra: Map::new(),
        });
        self
    }

    /// Total number of lessons across all modules.
    pub fn total_lessons(&self) -> usize {
        self.course.modules.iter().map(|m| m.lessons.len()).sum()
    }
}

/// Queue payload for one migration job.
///
/// Serialized flat: the manifest's top-level keys plus `workspaceId` and
/// `courseId`, which is also the scratch file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    #[serde(flatten)]
    pub manifest: CourseManifest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
}

impl JobPayload {
    pub fn new(
        manifest: CourseManifest,
        workspace_id: Option<String>,
        course_id: Option<String>,
    ) -> Self {
        Self {
            manifest,
            workspace_id,
            course_id,
        }
    }

    pub fn course_name(&self) -> &str {
        &self.manifest.course.name
    }

    /// The ledger key, present only when both identifiers are.
    pub fn ledger_key(&self) -> Option<(&str, &str)> {
        match (self.workspace_id.as_deref(), self.course_id.as_deref()) {
            (Some(ws), Some(course)) => Some((ws, course)),
            _ => None,
        }
    }
}
