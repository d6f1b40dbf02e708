//! Pointer-driven handle editing
//!
//! The only state is the current drag target. Every geometry change goes
//! through [`Interaction::apply_drag`].

use tracing::debug;

use crate::config::EditorConfig;
use crate::geometry::Point;
use crate::projection::{ProjectionId, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

/// The handle currently being dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragTarget {
    pub projection: ProjectionId,
    pub handle: usize,
}

#[derive(Debug, Clone)]
pub struct Interaction {
    pick_distance: f64,
    drag: Option<DragTarget>,
}

impl Interaction {
    pub fn new(editor: &EditorConfig) -> Self {
        Self {
            pick_distance: editor.pick_distance(),
            drag: None,
        }
    }

    pub fn drag_target(&self) -> Option<DragTarget> {
        self.drag
    }

    /// Find the handle under `pos` as `(projection_index, handle_index)`.
    ///
    /// Projections are scanned top-most first so the surface the user sees on
    /// top wins; within a projection handles are scanned 0..3.
    pub fn pick_handle(&self, registry: &Registry, pos: Point) -> Option<(usize, usize)> {
        registry
            .iter()
            .enumerate()
            .rev()
            .find_map(|(pidx, projection)| {
                projection
                    .quad
                    .points
                    .iter()
                    .position(|pt| pos.manhattan_distance(*pt) <= self.pick_distance)
                    .map(|hidx| (pidx, hidx))
            })
    }

    /// Pointer pressed. Returns true when the press hit a handle and was consumed;
    /// the struck projection is then selected and raised to the top.
    pub fn press(&mut self, registry: &mut Registry, pos: Point, button: PointerButton) -> bool {
        if button != PointerButton::Left {
            return false;
        }
        let Some((pidx, hidx)) = self.pick_handle(registry, pos) else {
            return false;
        };
        let Some(id) = registry.get(pidx).map(|p| p.id()) else {
            return false;
        };

        registry.reorder_to_top(pidx);
        registry.select(registry.index_of(id));
        self.drag = Some(DragTarget {
            projection: id,
            handle: hidx,
        });
        debug!("Dragging handle {} of projection {}", hidx, id);
        true
    }

    /// Pointer moved. While dragging, the clamped position becomes the handle's
    /// new location. Returns true when consumed.
    pub fn move_to(&mut self, registry: &mut Registry, pos: Point) -> bool {
        let Some(target) = self.drag else {
            return false;
        };
        let canvas = registry.canvas();
        let clamped = pos.clamp_to(canvas.width, canvas.height);
        if !self.apply_drag(registry, target, clamped) {
            // Projection disappeared mid-drag
            self.drag = None;
        }
        true
    }

    /// Pointer released: ends any drag
    pub fn release(&mut self) {
        self.drag = None;
    }

    /// Write `point` into the target handle. Only that one coordinate changes.
    pub fn apply_drag(&self, registry: &mut Registry, target: DragTarget, point: Point) -> bool {
        registry.set_handle(target.projection, target.handle, point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Quad;
    use crate::projection::tests::{registry, SolidSource};
    use std::path::Path;

    fn quad_at(x: f64, y: f64, size: f64) -> Quad {
        Quad::new([
            Point::new(x, y),
            Point::new(x + size, y),
            Point::new(x + size, y + size),
            Point::new(x, y + size),
        ])
    }

    fn two_surfaces() -> (Registry, Interaction) {
        let mut reg = registry(800, 600);
        reg.insert(
            Path::new("bottom"),
            Box::new(SolidSource::new(4, 4, [1, 1, 1])),
            quad_at(100.0, 100.0, 200.0),
        );
        reg.insert(
            Path::new("top"),
            Box::new(SolidSource::new(4, 4, [2, 2, 2])),
            quad_at(400.0, 300.0, 100.0),
        );
        (reg, Interaction::new(&EditorConfig::default()))
    }

    fn all_points(reg: &Registry) -> Vec<Point> {
        reg.iter().flat_map(|p| p.quad.points).collect()
    }

    #[test]
    fn test_pick_uses_l1_tolerance() {
        let (reg, ctl) = two_surfaces();
        // 15px L1 reach with default radius 10 x 1.5
        assert_eq!(ctl.pick_handle(&reg, Point::new(307.0, 108.0)), Some((0, 1)));
        assert_eq!(ctl.pick_handle(&reg, Point::new(309.0, 108.0)), None);
        assert_eq!(ctl.pick_handle(&reg, Point::new(200.0, 200.0)), None);
    }

    #[test]
    fn test_press_promotes_and_selects() {
        let (mut reg, mut ctl) = two_surfaces();
        reg.select(Some(1));

        // Handle 1 of the bottom projection
        assert!(ctl.press(&mut reg, Point::new(300.0, 100.0), PointerButton::Left));
        assert_eq!(reg.get(1).unwrap().source_path(), Path::new("bottom"));
        assert_eq!(reg.selected(), Some(1));
        let target = ctl.drag_target().unwrap();
        assert_eq!(target.handle, 1);
        assert_eq!(reg.index_of(target.projection), Some(1));
    }

    #[test]
    fn test_overlapping_handles_prefer_top_most() {
        let (mut reg, mut ctl) = two_surfaces();
        // Move the top surface's handle 0 right next to the bottom's handle 1
        let top_id = reg.get(1).unwrap().id();
        reg.set_handle(top_id, 0, Point::new(304.0, 102.0));

        assert!(ctl.press(&mut reg, Point::new(300.0, 100.0), PointerButton::Left));
        let target = ctl.drag_target().unwrap();
        assert_eq!(target.projection, top_id);
        assert_eq!(target.handle, 0);
        assert_eq!(reg.index_of(top_id), Some(reg.len() - 1));
        assert_eq!(reg.selected(), Some(reg.len() - 1));
    }

    #[test]
    fn test_miss_is_not_consumed() {
        let (mut reg, mut ctl) = two_surfaces();
        let before = all_points(&reg);
        assert!(!ctl.press(&mut reg, Point::new(5.0, 5.0), PointerButton::Left));
        assert!(!ctl.move_to(&mut reg, Point::new(50.0, 50.0)));
        assert_eq!(ctl.drag_target(), None);
        assert_eq!(all_points(&reg), before);
    }

    #[test]
    fn test_non_left_button_ignored() {
        let (mut reg, mut ctl) = two_surfaces();
        assert!(!ctl.press(&mut reg, Point::new(100.0, 100.0), PointerButton::Right));
        assert_eq!(ctl.drag_target(), None);
    }

    #[test]
    fn test_drag_changes_only_one_coordinate() {
        let mut reg = registry(800, 600);
        reg.insert(
            Path::new("a"),
            Box::new(SolidSource::new(4, 4, [1, 1, 1])),
            quad_at(100.0, 100.0, 200.0),
        );
        reg.insert(
            Path::new("b"),
            Box::new(SolidSource::new(4, 4, [2, 2, 2])),
            quad_at(500.0, 100.0, 100.0),
        );
        let mut ctl = Interaction::new(&EditorConfig::default());

        let id = reg.get(0).unwrap().id();
        let before = all_points(&reg);
        let target = DragTarget { projection: id, handle: 2 };
        assert!(ctl.apply_drag(&mut reg, target, Point::new(333.5, 444.25)));

        let after = all_points(&reg);
        for (i, (b, a)) in before.iter().zip(&after).enumerate() {
            if i == 2 {
                assert_eq!(*a, Point::new(333.5, 444.25));
            } else {
                assert_eq!(a.x.to_bits(), b.x.to_bits());
                assert_eq!(a.y.to_bits(), b.y.to_bits());
            }
        }

        // Same through press/move on the pointer path
        assert!(ctl.press(&mut reg, Point::new(333.0, 444.0), PointerButton::Left));
        assert!(ctl.move_to(&mut reg, Point::new(320.0, 410.0)));
        assert_eq!(reg.get(1).unwrap().quad.points[2], Point::new(320.0, 410.0));
        assert_eq!(reg.get(0).unwrap().quad, quad_at(500.0, 100.0, 100.0));
    }

    #[test]
    fn test_move_clamps_to_canvas() {
        let (mut reg, mut ctl) = two_surfaces();
        assert!(ctl.press(&mut reg, Point::new(100.0, 100.0), PointerButton::Left));
        ctl.move_to(&mut reg, Point::new(-50.0, 9000.0));
        let top = reg.get(reg.len() - 1).unwrap();
        assert_eq!(top.quad.points[0], Point::new(0.0, 600.0));
    }

    #[test]
    fn test_release_ends_drag() {
        let (mut reg, mut ctl) = two_surfaces();
        assert!(ctl.press(&mut reg, Point::new(100.0, 100.0), PointerButton::Left));
        ctl.release();
        assert_eq!(ctl.drag_target(), None);
        let before = all_points(&reg);
        assert!(!ctl.move_to(&mut reg, Point::new(10.0, 10.0)));
        assert_eq!(all_points(&reg), before);
    }

    #[test]
    fn test_self_intersecting_drag_is_allowed() {
        let (mut reg, mut ctl) = two_surfaces();
        // Drag handle 0 of the bottom surface past handle 2
        assert!(ctl.press(&mut reg, Point::new(100.0, 100.0), PointerButton::Left));
        assert!(ctl.move_to(&mut reg, Point::new(350.0, 350.0)));
        assert_eq!(reg.get(1).unwrap().quad.points[0], Point::new(350.0, 350.0));
    }

    #[test]
    fn test_drag_target_cleared_when_projection_removed() {
        let (mut reg, mut ctl) = two_surfaces();
        assert!(ctl.press(&mut reg, Point::new(100.0, 100.0), PointerButton::Left));
        reg.remove(reg.len() - 1);
        assert!(ctl.move_to(&mut reg, Point::new(10.0, 10.0)));
        assert_eq!(ctl.drag_target(), None);
    }
}
