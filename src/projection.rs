//! Projections and the ordered registry that owns them
//!
//! Registry order is paint order: index 0 is painted first (bottom), the last
//! entry is painted last (top) and wins handle picking ties.

use image::RgbImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EditorConfig;
use crate::error::{EngineError, EngineResult};
use crate::geometry::{CanvasSize, Point, Quad};
use crate::media::{MediaLoader, MediaSource};
use crate::preset::{PresetWarning, ProjectionState};

/// Stable identity assigned when a projection is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectionId(u64);

impl fmt::Display for ProjectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One media source mapped onto one quad
pub struct Projection {
    id: ProjectionId,
    media: Box<dyn MediaSource>,
    pub quad: Quad,
    source_path: PathBuf,
}

impl Projection {
    pub fn id(&self) -> ProjectionId {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn native_size(&self) -> (u32, u32) {
        self.media.native_size()
    }

    /// Frame for this tick, `None` when the source is not ready
    pub fn next_frame(&mut self) -> Option<Arc<RgbImage>> {
        self.media.current_frame()
    }

    pub fn state(&self) -> ProjectionState {
        ProjectionState {
            source_path: self.source_path.to_string_lossy().into_owned(),
            quad: self.quad,
        }
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("id", &self.id)
            .field("quad", &self.quad)
            .field("source_path", &self.source_path)
            .finish_non_exhaustive()
    }
}

/// Outcome of adding several media paths at once
#[derive(Debug, Default)]
pub struct BatchReport {
    pub added: Vec<ProjectionId>,
    pub failures: Vec<(PathBuf, EngineError)>,
}

/// Which quads a reset applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTarget {
    Index(usize),
    All,
}

/// Ordered projections plus the selection pointer.
///
/// Invariant: `selected` is `None` or a valid index into `projections`.
pub struct Registry {
    projections: Vec<Projection>,
    selected: Option<usize>,
    canvas: CanvasSize,
    margin_ratio: f64,
    stagger_step: f64,
    stagger_batch_step: f64,
    next_id: u64,
}

impl Registry {
    pub fn new(canvas: CanvasSize, editor: &EditorConfig) -> Self {
        Self {
            projections: Vec::new(),
            selected: None,
            canvas,
            margin_ratio: editor.margin_ratio,
            stagger_step: editor.stagger_step,
            stagger_batch_step: editor.stagger_batch_step,
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.projections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Projection> {
        self.projections.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Projection> {
        self.projections.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Projection> {
        self.projections.iter_mut()
    }

    pub fn index_of(&self, id: ProjectionId) -> Option<usize> {
        self.projections.iter().position(|p| p.id == id)
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Select an index; out-of-range indices clear the selection
    pub fn select(&mut self, index: Option<usize>) {
        self.selected = index.filter(|&i| i < self.projections.len());
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    /// Update the canvas used for default quads. Existing quads are kept.
    pub fn set_canvas_size(&mut self, canvas: CanvasSize) {
        self.canvas = canvas;
    }

    /// Canvas-relative inset rectangle used for new and reset quads
    pub fn default_quad(&self) -> Quad {
        Quad::inset(self.canvas, self.margin_ratio)
    }

    /// Append a projection for already-opened media (top of z-order)
    pub fn insert(
        &mut self,
        source_path: &Path,
        media: Box<dyn MediaSource>,
        quad: Quad,
    ) -> ProjectionId {
        let id = ProjectionId(self.next_id);
        self.next_id += 1;
        self.projections.push(Projection {
            id,
            media,
            quad,
            source_path: source_path.to_path_buf(),
        });
        if self.selected.is_none() {
            self.selected = Some(0);
        }
        id
    }

    /// Open `path` and append it with a staggered default quad.
    /// On failure the registry is unchanged.
    pub fn add(&mut self, path: &Path, loader: &dyn MediaLoader) -> EngineResult<ProjectionId> {
        let offset = self.projections.len() as f64 * self.stagger_step;
        self.add_at_offset(path, loader, offset)
    }

    /// Add several paths. Failures are collected per item and never stop the batch.
    pub fn add_batch<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        loader: &dyn MediaLoader,
    ) -> BatchReport {
        let start = self.projections.len() as f64 * self.stagger_step;
        let mut report = BatchReport::default();

        for (i, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            let offset = start + i as f64 * self.stagger_batch_step;
            match self.add_at_offset(path, loader, offset) {
                Ok(id) => report.added.push(id),
                Err(e) => {
                    warn!("Failed to load {:?}: {}", path, e);
                    report.failures.push((path.to_path_buf(), e));
                }
            }
        }

        report
    }

    fn add_at_offset(
        &mut self,
        path: &Path,
        loader: &dyn MediaLoader,
        offset: f64,
    ) -> EngineResult<ProjectionId> {
        let media = loader.open(path)?;
        let quad = self.default_quad().translated(offset, offset);
        let id = self.insert(path, media, quad);
        info!("Added projection {} from {:?}", id, path);
        Ok(id)
    }

    pub fn remove(&mut self, index: usize) -> Option<Projection> {
        if index >= self.projections.len() {
            return None;
        }
        let removed = self.projections.remove(index);
        self.selected = match self.selected {
            Some(s) if s == index => None,
            Some(s) if s > index => Some(s - 1),
            other => other,
        };
        debug!("Removed projection {}", removed.id);
        Some(removed)
    }

    /// Move a projection to the end of the list (painted last, picked first).
    /// The selection follows the items it pointed at.
    pub fn reorder_to_top(&mut self, index: usize) -> bool {
        let len = self.projections.len();
        if index >= len {
            return false;
        }
        let projection = self.projections.remove(index);
        self.projections.push(projection);
        self.selected = match self.selected {
            Some(s) if s == index => Some(len - 1),
            Some(s) if s > index => Some(s - 1),
            other => other,
        };
        true
    }

    /// Cycle the selection forwards (`+1`) or backwards (`-1`)
    pub fn select_next(&mut self, direction: i32) -> Option<usize> {
        let len = self.projections.len();
        if len == 0 {
            self.selected = None;
            return None;
        }
        let next = match self.selected {
            Some(current) => (current as i64 + direction as i64).rem_euclid(len as i64) as usize,
            None if direction < 0 => len - 1,
            None => 0,
        };
        self.selected = Some(next);
        self.selected
    }

    pub fn reset_quad(&mut self, target: ResetTarget) {
        let quad = self.default_quad();
        match target {
            ResetTarget::Index(i) => {
                if let Some(p) = self.projections.get_mut(i) {
                    p.quad = quad;
                }
            }
            ResetTarget::All => {
                for p in &mut self.projections {
                    p.quad = quad;
                }
            }
        }
    }

    /// Move one handle of one projection. Returns false when the projection
    /// no longer exists or the handle index is out of range.
    pub fn set_handle(&mut self, id: ProjectionId, handle: usize, point: Point) -> bool {
        match self.projections.iter_mut().find(|p| p.id == id) {
            Some(p) if handle < 4 => {
                p.quad.points[handle] = point;
                true
            }
            _ => false,
        }
    }

    pub fn states(&self) -> Vec<ProjectionState> {
        self.projections.iter().map(Projection::state).collect()
    }

    /// Replace all projections with `entries`, opening each media path.
    /// Each entry carries its preset index for reporting; entries whose media
    /// cannot be opened are skipped and reported.
    pub fn restore<I>(&mut self, entries: I, loader: &dyn MediaLoader) -> Vec<PresetWarning>
    where
        I: IntoIterator<Item = (usize, ProjectionState)>,
    {
        self.projections.clear();
        self.selected = None;

        let warnings = entries
            .into_iter()
            .fold(Vec::new(), |mut warnings, (index, entry)| {
                let path = PathBuf::from(&entry.source_path);
                match loader.open(&path) {
                    Ok(media) => {
                        self.insert(&path, media, entry.quad);
                    }
                    Err(e) => {
                        warn!("Skipping preset entry {} ({:?}): {}", index, path, e);
                        let source = &entry.source_path;
                        warnings.push(PresetWarning::media_unavailable(index, source, &e));
                    }
                }
                warnings
            });

        self.selected = if self.projections.is_empty() { None } else { Some(0) };
        warnings
    }
}
