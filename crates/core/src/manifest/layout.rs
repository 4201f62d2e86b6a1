//! Naming rules shared by the local output tree and the object keys.

use std::path::{Path, PathBuf};

use super::types::{CourseManifest, JobPayload};

/// Replaces every character outside `[A-Za-z0-9]` with `_`.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Checks that an identifier is usable as a single path segment.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} cannot be empty", field));
    }
    if value == "." {
        return Err(format!("{} cannot be '.'", field));
    }
    if value.contains('/') || value.contains('\\') || value.contains("..") {
        return Err(format!("{} contains a path separator or '..': {}", field, value));
    }
    Ok(())
}

/// Relative prefix of a course, used both under the downloads directory and
/// as the object key prefix.
///
/// `workspaces/<ws>/<courseId or sanitized name>` when a workspace is known,
/// otherwise the sanitized course name (legacy layout).
pub fn course_prefix(payload: &JobPayload) -> String {
    let safe_name = sanitize(payload.course_name());
    match payload.workspace_id.as_deref() {
        Some(ws) => {
            let course = payload.course_id.clone().unwrap_or(safe_name);
            format!("workspaces/{}/{}", ws, course)
        }
        None => safe_name,
    }
}

/// Relative directory of one lesson below the course prefix.
pub fn lesson_dir_name(
    module_order: u32,
    module_name: &str,
    lesson_index: usize,
    lesson_title: &str,
) -> String {
    format!(
        "{}_{}/{}_{}",
        module_order,
        sanitize(module_name),
        lesson_index,
        sanitize(lesson_title)
    )
}

/// Position of a lesson inside a manifest, flattened in course order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonLocation {
    pub module_index: usize,
    pub lesson_index: usize,
    pub title: String,
    pub lesson_id: Option<String>,
    pub video_name: Option<String>,
    /// `<moduleOrder>_<module>/<lessonIndex>_<title>`
    pub relative_dir: String,
}

impl CourseManifest {
    /// Every lesson of the course in module order.
    pub fn lesson_locations(&self) -> Vec<LessonLocation> {
        let mut locations = Vec::with_capacity(self.total_lessons());
        for (module_index, module) in self.course.modules.iter().enumerate() {
            let module_order = module.order.unwrap_or(module_index as u32);
            for (lesson_index, lesson) in module.lessons.iter().enumerate() {
                locations.push(LessonLocation {
                    module_index,
                    lesson_index,
                    title: lesson.title.clone(),
                    lesson_id: lesson.id.clone(),
                    video_name: lesson.video.as_ref().and_then(|v| v.name.clone()),
                    relative_dir: lesson_dir_name(
                        module_order,
                        &module.name,
                        lesson_index,
                        &lesson.title,
                    ),
                });
            }
        }
        locations
    }

    /// Index of the first module with the given name.
    pub fn find_module(&self, name: &str) -> Option<usize> {
        self.course.modules.iter().position(|m| m.name == name)
    }
}

/// Filesystem roots the worker writes into.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    downloads_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(downloads_dir: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Local output directory for a course prefix.
    pub fn output_dir(&self, prefix: &str) -> PathBuf {
        join_relative(&self.downloads_dir, prefix)
    }

    /// Scratch manifest path unique to one job.
    pub fn scratch_file(&self, course_name: &str, job_id: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("{}_{}.json", sanitize(course_name), job_id))
    }
}

/// Joins a `/`-separated relative path onto a base directory.
pub fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(base.to_path_buf(), |path, segment| path.join(segment))
}
