// Drawing surface abstraction and an in-memory scene recorder

use crate::error::Result;
use crate::scale::{Scale, Tick};

pub type GroupId = usize;

/// Presentation attributes shared by every shape kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Style {
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: Option<f64>,
    pub opacity: Option<f64>,
    pub font_size: Option<f64>,
    pub class: Option<String>,
    /// Mark is only shown while the pointer hovers its group.
    pub hover: bool,
}

impl Style {
    pub fn fill(color: impl Into<String>) -> Self {
        Style {
            fill: Some(color.into()),
            ..Default::default()
        }
    }

    pub fn stroke(color: impl Into<String>, width: f64) -> Self {
        Style {
            stroke: Some(color.into()),
            stroke_width: Some(width),
            ..Default::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAnchor {
    Start,
    #[default]
    Middle,
    End,
}

impl TextAnchor {
    pub fn as_str(self) -> &'static str {
        match self {
            TextAnchor::Start => "start",
            TextAnchor::Middle => "middle",
            TextAnchor::End => "end",
        }
    }
}

/// A primitive appended to a surface. Coordinates are pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle {
        cx: f64,
        cy: f64,
        r: f64,
        style: Style,
    },
    Path {
        points: Vec<(f64, f64)>,
        closed: bool,
        style: Style,
    },
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        style: Style,
    },
    Text {
        x: f64,
        y: f64,
        content: String,
        anchor: TextAnchor,
        /// Rotation in degrees around (x, y).
        angle: f64,
        style: Style,
    },
}

impl Shape {
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Circle { .. } => "circle",
            Shape::Path { .. } => "path",
            Shape::Rect { .. } => "rect",
            Shape::Text { .. } => "text",
        }
    }

    pub fn style(&self) -> &Style {
        match self {
            Shape::Circle { style, .. }
            | Shape::Path { style, .. }
            | Shape::Rect { style, .. }
            | Shape::Text { style, .. } => style,
        }
    }

    pub fn line(from: (f64, f64), to: (f64, f64), style: Style) -> Self {
        Shape::Path {
            points: vec![from, to],
            closed: false,
            style,
        }
    }

    pub fn text(x: f64, y: f64, content: impl Into<String>, style: Style) -> Self {
        Shape::Text {
            x,
            y,
            content: content.into(),
            anchor: TextAnchor::Middle,
            angle: 0.0,
            style,
        }
    }
}

/// Pixel rectangle a facet draws into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Region { left, top, width, height }
    }

    /// Shrink by `padding` on every side, never below zero size.
    pub fn inset(&self, padding: f64) -> Self {
        Region {
            left: self.left + padding,
            top: self.top + padding,
            width: (self.width - 2.0 * padding).max(0.0),
            height: (self.height - 2.0 * padding).max(0.0),
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Pixel interval for the x scale, left to right.
    pub fn x_range(&self) -> (f64, f64) {
        (self.left, self.right())
    }

    /// Pixel interval for the y scale; SVG y grows downwards.
    pub fn y_range(&self) -> (f64, f64) {
        (self.bottom(), self.top)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Bottom,
    Left,
}

/// An axis ready to draw: tick positions are already in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub orientation: Orientation,
    /// Tick length; negative values draw ticks into the plot as grid lines.
    pub tick_size: f64,
    /// y of a bottom axis, x of a left axis.
    pub offset: f64,
    /// Pixel extent of the axis line.
    pub extent: (f64, f64),
    pub ticks: Vec<Tick>,
}

const TICK_COUNT: usize = 10;

impl Axis {
    pub fn new(scale: &Scale, orientation: Orientation, tick_size: f64, offset: f64, region: &Region) -> Result<Self> {
        let extent = match orientation {
            Orientation::Bottom => region.x_range(),
            Orientation::Left => (region.top, region.bottom()),
        };
        Ok(Axis {
            orientation,
            tick_size,
            offset,
            extent,
            ticks: scale.ticks(TICK_COUNT)?,
        })
    }
}

/// Target of rendering. Implementations only append; nothing is read back.
pub trait Surface {
    fn create_group(&mut self, class: &str) -> GroupId;
    fn append_shape(&mut self, group: GroupId, shape: Shape);
    fn append_axis(&mut self, axis: &Axis);
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneGroup {
    pub class: String,
    pub shapes: Vec<Shape>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Group(usize),
    Axis(usize),
}

/// A group or an axis, in drawing order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneItem<'a> {
    Group(&'a SceneGroup),
    Axis(&'a Axis),
}

/// Records everything drawn, for backends and inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub width: f64,
    pub height: f64,
    groups: Vec<SceneGroup>,
    axes: Vec<Axis>,
    order: Vec<Entry>,
}

impl Scene {
    pub fn new(width: f64, height: f64) -> Self {
        Scene {
            width,
            height,
            groups: Vec::new(),
            axes: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Groups and axes in the order they were created; later items paint over
    /// earlier ones.
    pub fn items(&self) -> impl Iterator<Item = SceneItem<'_>> {
        self.order.iter().filter_map(|entry| match *entry {
            Entry::Group(i) => self.groups.get(i).map(SceneItem::Group),
            Entry::Axis(i) => self.axes.get(i).map(SceneItem::Axis),
        })
    }

    pub fn groups(&self) -> &[SceneGroup] {
        &self.groups
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.groups.iter().flat_map(|g| g.shapes.iter())
    }

    pub fn count(&self, kind: &str) -> usize {
        self.shapes().filter(|s| s.kind() == kind).count()
    }

    /// Groups whose class list contains `class`.
    pub fn groups_with_class<'a: 'b, 'b>(&'a self, class: &'b str) -> impl Iterator<Item = &'a SceneGroup> + 'b {
        self.groups
            .iter()
            .filter(move |g| g.class.split_whitespace().any(|c| c == class))
    }
}

impl Surface for Scene {
    fn create_group(&mut self, class: &str) -> GroupId {
        self.groups.push(SceneGroup {
            class: class.to_string(),
            shapes: Vec::new(),
        });
        let id = self.groups.len() - 1;
        self.order.push(Entry::Group(id));
        id
    }

    fn append_shape(&mut self, group: GroupId, shape: Shape) {
        match self.groups.get_mut(group) {
            Some(g) => g.shapes.push(shape),
            None => tracing::warn!(group, "Shape appended to unknown group; dropped"),
        }
    }

    fn append_axis(&mut self, axis: &Axis) {
        self.axes.push(axis.clone());
        self.order.push(Entry::Axis(self.axes.len() - 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_ranges() {
        let region = Region::new(0.0, 0.0, 800.0, 600.0).inset(25.0);
        assert_eq!(region.x_range(), (25.0, 775.0));
        assert_eq!(region.y_range(), (575.0, 25.0));
    }

    #[test]
    fn test_inset_never_negative() {
        let region = Region::new(0.0, 0.0, 10.0, 10.0).inset(25.0);
        assert_eq!(region.width, 0.0);
        assert_eq!(region.height, 0.0);
    }

    #[test]
    fn test_scene_records_groups() {
        let mut scene = Scene::new(100.0, 100.0);
        let g = scene.create_group("layer geometry-point");
        scene.append_shape(g, Shape::Circle { cx: 1.0, cy: 2.0, r: 3.0, style: Style::default() });
        scene.append_shape(g, Shape::line((0.0, 0.0), (1.0, 1.0), Style::stroke("black", 1.0)));
        scene.append_shape(99, Shape::text(0.0, 0.0, "lost", Style::default()));

        assert_eq!(scene.count("circle"), 1);
        assert_eq!(scene.count("path"), 1);
        assert_eq!(scene.count("text"), 0);
        assert_eq!(scene.groups_with_class("layer").count(), 1);
        assert_eq!(scene.groups_with_class("geometry").count(), 0);
    }

    #[test]
    fn test_items_keep_creation_order() {
        let mut scene = Scene::new(100.0, 100.0);
        scene.create_group("base");
        scene.append_axis(&Axis {
            orientation: Orientation::Bottom,
            tick_size: 6.0,
            offset: 90.0,
            extent: (10.0, 90.0),
            ticks: Vec::new(),
        });
        scene.create_group("layer");
        let kinds: Vec<&str> = scene
            .items()
            .map(|item| match item {
                SceneItem::Group(g) => g.class.as_str(),
                SceneItem::Axis(_) => "axis",
            })
            .collect();
        assert_eq!(kinds, vec!["base", "axis", "layer"]);
    }
}
