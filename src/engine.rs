//! Engine facade: the host-facing API
//!
//! Everything runs on one thread. Pointer and keyboard commands mutate the
//! registry synchronously; [`Engine::tick`] composes the next output frame.

use image::RgbImage;
use std::path::Path;
use tracing::{info, warn};

use crate::compositor::{Compositor, OverlayStyle, RenderFlags, TickStats};
use crate::config::Config;
use crate::error::EngineResult;
use crate::geometry::{CanvasSize, Point};
use crate::interaction::{Interaction, PointerButton};
use crate::media::MediaLoader;
use crate::preset::{self, EngineState, PresetWarning};
use crate::projection::{BatchReport, Projection, Registry, ResetTarget};

pub struct Engine {
    registry: Registry,
    compositor: Compositor,
    interaction: Interaction,
    flags: RenderFlags,
    loader: Box<dyn MediaLoader>,
}

impl Engine {
    pub fn new(config: &Config, loader: Box<dyn MediaLoader>) -> Self {
        let canvas = config.canvas.size();
        let style = OverlayStyle::from_config(&config.render, &config.editor);
        Self {
            registry: Registry::new(canvas, &config.editor),
            compositor: Compositor::new(canvas, config.canvas.background, style),
            interaction: Interaction::new(&config.editor),
            flags: RenderFlags {
                live_warp: config.render.live_warp,
                show_mesh: config.render.show_mesh,
            },
            loader,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn flags(&self) -> RenderFlags {
        self.flags
    }

    pub fn set_live_warp(&mut self, on: bool) {
        self.flags.live_warp = on;
    }

    pub fn set_show_mesh(&mut self, on: bool) {
        self.flags.show_mesh = on;
    }

    /// Change the canvas size. Existing quads keep their coordinates.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.registry.set_canvas_size(CanvasSize::new(width, height));
    }

    /// Add each path as a new projection on top. Failures are reported per item.
    pub fn add_media<P: AsRef<Path>>(&mut self, paths: &[P]) -> BatchReport {
        let report = self.registry.add_batch(paths, self.loader.as_ref());
        if !paths.is_empty() {
            info!(
                "Added {} of {} media ({} failed)",
                report.added.len(),
                paths.len(),
                report.failures.len()
            );
        }
        report
    }

    pub fn remove(&mut self, index: usize) -> Option<Projection> {
        self.registry.remove(index)
    }

    pub fn select_next(&mut self, direction: i32) -> Option<usize> {
        self.registry.select_next(direction)
    }

    /// Reset the selected quad, or every quad when nothing is selected
    pub fn reset_quad(&mut self) {
        let target = match self.registry.selected() {
            Some(index) => ResetTarget::Index(index),
            None => ResetTarget::All,
        };
        self.registry.reset_quad(target);
    }

    pub fn reset_all(&mut self) {
        self.registry.reset_quad(ResetTarget::All);
    }

    pub fn pointer_down(&mut self, pos: Point, button: PointerButton) -> bool {
        self.interaction.press(&mut self.registry, pos, button)
    }

    pub fn pointer_move(&mut self, pos: Point) -> bool {
        self.interaction.move_to(&mut self.registry, pos)
    }

    pub fn pointer_up(&mut self, _button: PointerButton) {
        self.interaction.release();
    }

    /// Compose and return the frame for this tick
    pub fn tick(&mut self) -> &RgbImage {
        self.compositor.composite(&mut self.registry, self.flags)
    }

    pub fn last_tick_stats(&self) -> TickStats {
        self.compositor.last_stats()
    }

    pub fn state(&self) -> EngineState {
        EngineState {
            live_warp: self.flags.live_warp,
            show_mesh: self.flags.show_mesh,
            projections: self.registry.states(),
        }
    }

    /// Write the current state as a JSON preset
    pub fn save_preset(&self, path: &Path) -> EngineResult<()> {
        let json = preset::to_json(&self.state())?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        info!("Saved preset with {} projection(s) to {:?}", self.registry.len(), path);
        Ok(())
    }

    /// Replace the current state with a preset file.
    ///
    /// Fails only if the file cannot be read or is not a JSON object; bad
    /// entries are skipped and returned as warnings.
    pub fn load_preset(&mut self, path: &Path) -> EngineResult<Vec<PresetWarning>> {
        let text = std::fs::read_to_string(path)?;
        let loaded = preset::from_json(&text, self.registry.default_quad())?;

        let (state, entries, mut warnings) = loaded.into_entries();

        self.interaction.release();
        self.flags = RenderFlags {
            live_warp: state.live_warp,
            show_mesh: state.show_mesh,
        };
        warnings.extend(self.registry.restore(entries, self.loader.as_ref()));
        warnings.sort_by_key(|w| w.index);

        for w in &warnings {
            warn!("Preset {:?}: {}", path, w);
        }
        info!(
            "Loaded preset {:?}: {} projection(s), {} warning(s)",
            path,
            self.registry.len(),
            warnings.len()
        );
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::media::FileMediaLoader;
    use crate::projection::tests::FakeLoader;
    use crate::preset::WarningKind;
    use image::Rgb;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("quadmap_engine_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn fake_engine() -> Engine {
        Engine::new(&Config::default(), Box::new(FakeLoader))
    }

    #[test]
    fn test_tick_renders_added_media() {
        let mut engine = fake_engine();
        engine.add_media(&["a.png"]);
        engine.set_show_mesh(false);

        let quad = engine.registry().get(0).unwrap().quad;
        let center = (
            ((quad.points[0].x + quad.points[2].x) / 2.0) as u32,
            ((quad.points[0].y + quad.points[2].y) / 2.0) as u32,
        );
        let frame = engine.tick();
        assert_eq!(frame.dimensions(), (1200, 800));
        assert_eq!(frame.get_pixel(center.0, center.1), &Rgb([200, 0, 0]));
        assert_eq!(frame.get_pixel(2, 2), &Rgb([18, 18, 18]));
    }

    #[test]
    fn test_reset_quad_prefers_selection() {
        let mut engine = fake_engine();
        engine.add_media(&["a", "b"]);
        engine.resize(600, 400);
        engine.select_next(1);
        engine.reset_quad();

        let default = engine.registry().default_quad();
        assert_ne!(engine.registry().get(0).unwrap().quad, default);
        assert_eq!(engine.registry().get(1).unwrap().quad, default);

        while engine.remove(0).is_some() {}
        engine.add_media(&["c", "d"]);
        engine.remove(0);
        assert_eq!(engine.registry().selected(), None);
        engine.reset_quad();
        assert_eq!(engine.registry().get(0).unwrap().quad, default);
    }

    #[test]
    fn test_pointer_flow() {
        let mut engine = fake_engine();
        engine.add_media(&["a"]);
        let corner = engine.registry().get(0).unwrap().quad.points[3];

        assert!(engine.pointer_down(corner, PointerButton::Left));
        assert!(engine.pointer_move(Point::new(5.0, 795.0)));
        engine.pointer_up(PointerButton::Left);
        assert!(!engine.pointer_move(Point::new(50.0, 50.0)));

        assert_eq!(engine.registry().get(0).unwrap().quad.points[3], Point::new(5.0, 795.0));
    }

    #[test]
    fn test_preset_round_trip_through_files() {
        let dir = temp_dir("roundtrip");
        let media: Vec<PathBuf> = (0..3)
            .map(|i| {
                let p = dir.join(format!("m{}.png", i));
                RgbImage::from_pixel(8, 6, Rgb([i as u8 * 40, 0, 0])).save(&p).unwrap();
                p
            })
            .collect();

        let mut engine = Engine::new(&Config::default(), Box::new(FileMediaLoader::default()));
        engine.add_media(&media);
        let handle = engine.registry().get(2).unwrap().quad.points[1];
        assert!(engine.pointer_down(handle, PointerButton::Left));
        engine.pointer_move(Point::new(1001.125, 77.75));
        engine.pointer_up(PointerButton::Left);
        engine.set_live_warp(false);

        let preset_path = dir.join("presets").join("show.json");
        engine.save_preset(&preset_path).unwrap();
        let saved = engine.state();

        let mut restored = Engine::new(&Config::default(), Box::new(FileMediaLoader::default()));
        let warnings = restored.load_preset(&preset_path).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(restored.state(), saved);
        assert_eq!(restored.registry().selected(), Some(0));
        assert!(!restored.flags().live_warp);
    }

    #[test]
    fn test_preset_with_missing_media_loads_rest() {
        let dir = temp_dir("partial");
        let good = dir.join("good.png");
        RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])).save(&good).unwrap();
        let preset_path = dir.join("p.json");
        let quad = serde_json::json!([[0, 0], [10, 0], [10, 10], [0, 10]]);
        let doc = serde_json::json!({
            "live_warp": true,
            "show_mesh": false,
            "projections": [
                { "media_path": good.to_string_lossy(), "target_quad": quad },
                { "media_path": dir.join("gone.mp4").to_string_lossy(), "target_quad": quad }
            ]
        });
        std::fs::write(&preset_path, doc.to_string()).unwrap();

        let mut engine = Engine::new(&Config::default(), Box::new(FileMediaLoader::default()));
        let warnings = engine.load_preset(&preset_path).unwrap();
        assert_eq!(engine.registry().len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].index, 1);
        assert!(matches!(warnings[0].kind, WarningKind::MediaUnavailable(_)));
        assert!(!engine.flags().show_mesh);
    }

    #[test]
    fn test_preset_warnings_in_document_order() {
        let dir = temp_dir("order");
        let preset_path = dir.join("p.json");
        let quad = serde_json::json!([[0, 0], [9, 0], [9, 9], [0, 9]]);
        let doc = serde_json::json!({
            "projections": [
                { "media_path": "missing-first.png", "target_quad": quad },
                { "target_quad": quad },
                { "media_path": "ok.png", "target_quad": "bad" }
            ]
        });
        std::fs::write(&preset_path, doc.to_string()).unwrap();

        let mut engine = fake_engine();
        let warnings = engine.load_preset(&preset_path).unwrap();
        let order: Vec<usize> = warnings.iter().map(|w| w.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(matches!(warnings[0].kind, WarningKind::MediaUnavailable(_)));
        assert_eq!(warnings[1].kind, WarningKind::MissingMediaPath);
        assert_eq!(warnings[2].kind, WarningKind::MalformedQuad);
        assert_eq!(engine.registry().len(), 1);
    }

    #[test]
    fn test_unreadable_preset_keeps_state() {
        let dir = temp_dir("garbage");
        let preset_path = dir.join("bad.json");
        std::fs::write(&preset_path, "this is not json").unwrap();

        let mut engine = fake_engine();
        engine.add_media(&["a"]);
        let err = engine.load_preset(&preset_path).unwrap_err();
        assert!(matches!(err, EngineError::MalformedPreset(_)));
        assert_eq!(engine.registry().len(), 1);

        let missing = engine.load_preset(&dir.join("nope.json")).unwrap_err();
        assert!(matches!(missing, EngineError::Io(_)));
    }

    #[test]
    fn test_empty_state_round_trip() {
        let dir = temp_dir("empty");
        let path = dir.join("empty.json");
        let engine = fake_engine();
        engine.save_preset(&path).unwrap();

        let mut other = fake_engine();
        other.add_media(&["x"]);
        let warnings = other.load_preset(&path).unwrap();
        assert!(warnings.is_empty());
        assert!(other.registry().is_empty());
        assert_eq!(other.registry().selected(), None);
    }
}
