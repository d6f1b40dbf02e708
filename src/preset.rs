//! Preset documents: the persisted engine state
//!
//! ```json
//! {
//!   "live_warp": true,
//!   "show_mesh": true,
//!   "projections": [
//!     { "media_path": "loop.gif", "target_quad": [[120, 80], [900, 80], [900, 700], [120, 700]] }
//!   ]
//! }
//! ```
//!
//! Older single-surface presets put `media_path` and `target_quad` at the top
//! level; those are read as a one-element projection list.
//!
//! Decoding is best effort per entry. Only a document that is not a JSON
//! object fails as a whole.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{EngineError, EngineResult};
use crate::geometry::{Point, Quad};

/// Durable description of one projection
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionState {
    pub source_path: String,
    pub quad: Quad,
}

/// Durable snapshot of the whole engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub live_warp: bool,
    pub show_mesh: bool,
    pub projections: Vec<ProjectionState>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            live_warp: true,
            show_mesh: true,
            projections: Vec::new(),
        }
    }
}

/// On-disk document shape, as written by [`save`].
///
/// Reading goes through [`load`] instead, which tolerates the legacy layout and
/// damaged entries.
#[derive(Debug, Clone, Serialize)]
pub struct PresetDocument {
    pub live_warp: bool,
    pub show_mesh: bool,
    pub projections: Vec<PresetProjection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresetProjection {
    pub media_path: String,
    pub target_quad: [[f64; 2]; 4],
}

/// Why an entry was skipped or patched during load
#[derive(Debug, Clone, PartialEq)]
pub enum WarningKind {
    /// Entry has no usable `media_path`; skipped
    MissingMediaPath,
    /// `target_quad` is not four `[x, y]` pairs; the default quad was used
    MalformedQuad,
    /// The media could not be opened; skipped
    MediaUnavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresetWarning {
    /// Position of the entry in the document's projection list
    pub index: usize,
    pub media_path: Option<String>,
    pub kind: WarningKind,
}

impl PresetWarning {
    pub fn media_unavailable(index: usize, media_path: &str, error: &EngineError) -> Self {
        Self {
            index,
            media_path: Some(media_path.to_string()),
            kind: WarningKind::MediaUnavailable(error.to_string()),
        }
    }
}

impl fmt::Display for PresetWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.media_path.as_deref().unwrap_or("<none>");
        match &self.kind {
            WarningKind::MissingMediaPath => {
                write!(f, "projection {}: missing media_path, skipped", self.index)
            }
            WarningKind::MalformedQuad => write!(
                f,
                "projection {} ({}): malformed target_quad, using default",
                self.index, path
            ),
            WarningKind::MediaUnavailable(reason) => {
                write!(f, "projection {} ({}): {}, skipped", self.index, path, reason)
            }
        }
    }
}

/// A decoded preset plus everything that had to be skipped or patched
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPreset {
    pub state: EngineState,
    /// Document position of each entry in `state.projections`
    pub entry_indices: Vec<usize>,
    pub warnings: Vec<PresetWarning>,
}

impl LoadedPreset {
    /// Decoded entries paired with their position in the document
    pub fn into_entries(self) -> (EngineState, Vec<(usize, ProjectionState)>, Vec<PresetWarning>) {
        let LoadedPreset { mut state, entry_indices, warnings } = self;
        let entries = entry_indices
            .into_iter()
            .zip(std::mem::take(&mut state.projections))
            .collect();
        (state, entries, warnings)
    }
}

pub fn save(state: &EngineState) -> PresetDocument {
    PresetDocument {
        live_warp: state.live_warp,
        show_mesh: state.show_mesh,
        projections: state
            .projections
            .iter()
            .map(|p| PresetProjection {
                media_path: p.source_path.clone(),
                target_quad: p.quad.points.map(|pt| [pt.x, pt.y]),
            })
            .collect(),
    }
}

/// Serialize to pretty JSON
pub fn to_json(state: &EngineState) -> EngineResult<String> {
    serde_json::to_string_pretty(&save(state))
        .map_err(|e| EngineError::malformed(format!("cannot serialize preset: {}", e)))
}

/// Parse preset text. `default_quad` replaces missing or malformed quads.
pub fn from_json(text: &str, default_quad: Quad) -> EngineResult<LoadedPreset> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| EngineError::malformed(format!("not valid JSON: {}", e)))?;
    load(&value, default_quad)
}

/// Decode a preset document, recovering per entry
pub fn load(document: &Value, default_quad: Quad) -> EngineResult<LoadedPreset> {
    let root = document
        .as_object()
        .ok_or_else(|| EngineError::malformed("preset root must be an object"))?;

    let mut state = EngineState {
        live_warp: flag(root, "live_warp"),
        show_mesh: flag(root, "show_mesh"),
        projections: Vec::new(),
    };

    let entries: Vec<&Value> = match root.get("projections").and_then(Value::as_array) {
        Some(list) if !list.is_empty() => list.iter().collect(),
        _ => {
            // Single-surface schema
            match root.get("media_path").and_then(Value::as_str) {
                Some(path) if !path.is_empty() => vec![document],
                _ => Vec::new(),
            }
        }
    };

    let mut entry_indices = Vec::new();
    let (projections, warnings) = entries.into_iter().enumerate().fold(
        (Vec::new(), Vec::new()),
        |(mut projections, mut warnings), (index, entry)| {
            match decode_entry(index, entry, default_quad) {
                Ok((projection, warning)) => {
                    projections.push(projection);
                    entry_indices.push(index);
                    warnings.extend(warning);
                }
                Err(warning) => warnings.push(warning),
            }
            (projections, warnings)
        },
    );
    state.projections = projections;

    Ok(LoadedPreset {
        state,
        entry_indices,
        warnings,
    })
}

fn decode_entry(
    index: usize,
    entry: &Value,
    default_quad: Quad,
) -> Result<(ProjectionState, Option<PresetWarning>), PresetWarning> {
    let media_path = match entry.get("media_path").and_then(Value::as_str) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => {
            return Err(PresetWarning {
                index,
                media_path: None,
                kind: WarningKind::MissingMediaPath,
            })
        }
    };

    let (quad, warning) = match entry.get("target_quad") {
        None | Some(Value::Null) => (default_quad, None),
        Some(raw) => match parse_quad(raw) {
            Some(quad) => (quad, None),
            None => (
                default_quad,
                Some(PresetWarning {
                    index,
                    media_path: Some(media_path.clone()),
                    kind: WarningKind::MalformedQuad,
                }),
            ),
        },
    };

    Ok((
        ProjectionState {
            source_path: media_path,
            quad,
        },
        warning,
    ))
}

/// Exactly four `[x, y]` numeric pairs
fn parse_quad(raw: &Value) -> Option<Quad> {
    let list = raw.as_array()?;
    if list.len() != 4 {
        return None;
    }

    let mut points = [Point::default(); 4];
    for (slot, item) in points.iter_mut().zip(list) {
        match item.as_array().map(Vec::as_slice) {
            Some([x, y]) => *slot = Point::new(x.as_f64()?, y.as_f64()?),
            _ => return None,
        }
    }
    Some(Quad::new(points))
}

/// Missing or non-boolean flags default to on
fn flag(root: &Map<String, Value>, key: &str) -> bool {
    match root.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        _ => true,
    }
}
