//! Maps marker names back to manifest lessons and derives progress.

use std::collections::HashSet;

use crate::manifest::{CourseManifest, LessonLocation};

/// Share of the progress bar the download phase may fill. The rest is
/// reserved for the closing upload.
pub const DOWNLOAD_PROGRESS_CAP: u8 = 95;

/// `min(round(started / total * 95), 95)`, or `None` for an empty course.
pub fn download_progress(started: usize, total: usize) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let pct = (started as f64 / total as f64 * f64::from(DOWNLOAD_PROGRESS_CAP)).round();
    Some(pct.min(f64::from(DOWNLOAD_PROGRESS_CAP)) as u8)
}

/// What a lesson start means for the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonStep {
    /// The lesson that just finished downloading.
    pub previous: Option<LessonLocation>,
    /// The lesson that is starting, when it could be resolved.
    pub current: Option<LessonLocation>,
    pub started: usize,
    /// `None` when the count did not move (empty course or repeated marker).
    pub progress: Option<u8>,
    /// The marker named a lesson that was already started.
    pub repeated: bool,
}

enum Resolved {
    New(usize),
    Repeat(usize),
    Unknown,
}

/// Per-job view of which lessons have been announced.
#[derive(Debug)]
pub struct LessonTracker {
    module_names: Vec<String>,
    locations: Vec<LessonLocation>,
    claimed: HashSet<usize>,
    current_module: Option<usize>,
    current: Option<usize>,
    started: usize,
}

impl LessonTracker {
    pub fn new(manifest: &CourseManifest) -> Self {
        Self {
            module_names: manifest
                .course
                .modules
                .iter()
                .map(|m| m.name.clone())
                .collect(),
            locations: manifest.lesson_locations(),
            claimed: HashSet::new(),
            current_module: None,
            current: None,
            started: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.locations.len()
    }

    pub fn started(&self) -> usize {
        self.started
    }

    /// The most recently started lesson, if it was resolved.
    pub fn current(&self) -> Option<&LessonLocation> {
        self.current.map(|idx| &self.locations[idx])
    }

    pub fn module_started(&mut self, name: &str) {
        let from = self.current_module.unwrap_or(0);
        let found = self
            .module_names
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, n)| n.as_str() == name)
            .or_else(|| {
                self.module_names
                    .iter()
                    .enumerate()
                    .find(|(_, n)| n.as_str() == name)
            })
            .map(|(idx, _)| idx);

        if found.is_some() {
            self.current_module = found;
        }
    }

    pub fn lesson_started(&mut self, title: &str) -> LessonStep {
        match self.resolve(title) {
            Resolved::Repeat(idx) => {
                let previous = self
                    .current
                    .filter(|current| *current != idx)
                    .map(|current| self.locations[current].clone());
                self.select(idx);

                LessonStep {
                    previous,
                    current: Some(self.locations[idx].clone()),
                    started: self.started,
                    progress: None,
                    repeated: true,
                }
            }
            resolved => {
                self.started += 1;
                let previous = self.current.map(|idx| self.locations[idx].clone());

                let new = match resolved {
                    Resolved::New(idx) => Some(idx),
                    _ => self.ordinal(),
                };
                match new {
                    Some(idx) => {
                        self.claimed.insert(idx);
                        self.select(idx);
                    }
                    None => self.current = None,
                }

                LessonStep {
                    previous,
                    current: new.map(|idx| self.locations[idx].clone()),
                    started: self.started,
                    progress: download_progress(self.started, self.total()),
                    repeated: false,
                }
            }
        }
    }

    fn select(&mut self, idx: usize) {
        self.current = Some(idx);
        self.current_module = Some(self.locations[idx].module_index);
    }

    /// Unclaimed title in the current module, a repeat of the current
    /// lesson, an unclaimed title anywhere, then a repeat of any claimed
    /// lesson with that title.
    fn resolve(&self, title: &str) -> Resolved {
        let titled = |idx: &usize| self.locations[*idx].title == title;
        let unclaimed = |idx: &usize| !self.claimed.contains(idx) && titled(idx);
        let in_module = |idx: &usize| Some(self.locations[*idx].module_index) == self.current_module;

        if let Some(idx) = (0..self.locations.len()).filter(in_module).find(unclaimed) {
            return Resolved::New(idx);
        }
        if let Some(idx) = self.current.filter(titled) {
            return Resolved::Repeat(idx);
        }
        if let Some(idx) = (0..self.locations.len()).find(unclaimed) {
            return Resolved::New(idx);
        }
        if let Some(idx) = (0..self.locations.len())
            .filter(in_module)
            .chain(0..self.locations.len())
            .find(|idx| self.claimed.contains(idx) && titled(idx))
        {
            return Resolved::Repeat(idx);
        }
        Resolved::Unknown
    }

    /// Positional fallback for titles the manifest does not know.
    fn ordinal(&self) -> Option<usize> {
        let ordinal = self.started.checked_sub(1)?;
        (ordinal < self.locations.len() && !self.claimed.contains(&ordinal)).then_some(ordinal)
    }
}
