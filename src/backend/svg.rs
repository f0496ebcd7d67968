use crate::surface::{Axis, Orientation, Scene, SceneItem, Shape, Style};
use std::fmt::Write;

const STYLESHEET: &str = "\
.axis path,.axis line{fill:none;stroke:#ffffff;shape-rendering:crispEdges}\
.axis .domain{stroke:#333333}\
.axis text{font:10px sans-serif;fill:#333333}\
text{font-family:sans-serif;font-size:11px}\
.hover{opacity:0}\
.layer:hover .hover{opacity:1}";

/// Serialize a scene as a standalone SVG document.
pub fn to_svg(scene: &Scene) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
        scene.width, scene.height, scene.width, scene.height
    );
    let _ = writeln!(out, "<style>{}</style>", STYLESHEET);

    for item in scene.items() {
        match item {
            SceneItem::Group(group) => {
                let _ = writeln!(out, r#"<g class="{}">"#, escape_xml(&group.class));
                for shape in &group.shapes {
                    write_shape(&mut out, shape);
                }
                out.push_str("</g>\n");
            }
            SceneItem::Axis(axis) => write_axis(&mut out, axis),
        }
    }

    out.push_str("</svg>\n");
    out
}

fn write_shape(out: &mut String, shape: &Shape) {
    match shape {
        Shape::Circle { cx, cy, r, style } => {
            let _ = write!(out, r#"<circle cx="{}" cy="{}" r="{}""#, cx, cy, r);
            write_style(out, style);
            out.push_str("/>\n");
        }
        Shape::Rect { x, y, width, height, style } => {
            let _ = write!(out, r#"<rect x="{}" y="{}" width="{}" height="{}""#, x, y, width, height);
            write_style(out, style);
            out.push_str("/>\n");
        }
        Shape::Path { points, closed, style } => {
            let mut d = String::new();
            for (i, (x, y)) in points.iter().enumerate() {
                let _ = write!(d, "{}{},{}", if i == 0 { "M" } else { "L" }, x, y);
            }
            if *closed {
                d.push('Z');
            }
            let _ = write!(out, r#"<path d="{}""#, d);
            // Open paths are strokes; never fill the implied polygon
            if !closed && style.fill.is_none() {
                out.push_str(r#" fill="none""#);
            }
            write_style(out, style);
            out.push_str("/>\n");
        }
        Shape::Text { x, y, content, anchor, angle, style } => {
            let _ = write!(out, r#"<text x="{}" y="{}" text-anchor="{}""#, x, y, anchor.as_str());
            if *angle != 0.0 {
                let _ = write!(out, r#" transform="rotate({} {} {})""#, angle, x, y);
            }
            if let Some(size) = style.font_size {
                let _ = write!(out, r#" font-size="{}""#, size);
            }
            write_style(out, style);
            out.push('>');
            out.push_str(&escape_xml(content));
            out.push_str("</text>\n");
        }
    }
}

fn write_style(out: &mut String, style: &Style) {
    if let Some(fill) = &style.fill {
        let _ = write!(out, r#" fill="{}""#, escape_xml(fill));
    }
    if let Some(stroke) = &style.stroke {
        let _ = write!(out, r#" stroke="{}""#, escape_xml(stroke));
        if let Some(width) = style.stroke_width {
            let _ = write!(out, r#" stroke-width="{}""#, width);
        }
    }
    if let Some(opacity) = style.opacity {
        let _ = write!(out, r#" opacity="{}""#, opacity);
    }
    if let Some(class) = &style.class {
        let _ = write!(out, r#" class="{}""#, escape_xml(class));
    }
}

fn write_axis(out: &mut String, axis: &Axis) {
    let (e0, e1) = axis.extent;
    match axis.orientation {
        Orientation::Bottom => {
            let _ = writeln!(out, r#"<g class="x axis" transform="translate(0,{})">"#, axis.offset);
            for tick in &axis.ticks {
                let _ = writeln!(
                    out,
                    r#"<g class="tick" transform="translate({},0)"><line y2="{}"/><text y="{}" dy=".71em" text-anchor="middle">{}</text></g>"#,
                    tick.position,
                    axis.tick_size,
                    axis.tick_size.max(0.0) + 3.0,
                    escape_xml(&tick.label)
                );
            }
            let _ = writeln!(out, r#"<path class="domain" d="M{},0H{}"/>"#, e0, e1);
        }
        Orientation::Left => {
            let _ = writeln!(out, r#"<g class="y axis" transform="translate({},0)">"#, axis.offset);
            for tick in &axis.ticks {
                let _ = writeln!(
                    out,
                    r#"<g class="tick" transform="translate(0,{})"><line x2="{}"/><text x="{}" dy=".32em" text-anchor="end">{}</text></g>"#,
                    tick.position,
                    -axis.tick_size,
                    -(axis.tick_size.max(0.0) + 3.0),
                    escape_xml(&tick.label)
                );
            }
            let _ = writeln!(out, r#"<path class="domain" d="M0,{}V{}"/>"#, e0, e1);
        }
    }
    out.push_str("</g>\n");
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::Tick;
    use crate::surface::Surface;

    #[test]
    fn test_escape() {
        assert_eq!(escape_xml("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_svg_document() {
        let mut scene = Scene::new(200.0, 100.0);
        let g = scene.create_group("layer geometry-point");
        scene.append_shape(g, Shape::Circle { cx: 10.0, cy: 20.0, r: 5.0, style: Style::fill("#1f77b4") });
        scene.append_shape(g, Shape::line((0.0, 0.0), (5.0, 5.0), Style::stroke("red", 2.0)));
        scene.append_axis(&Axis {
            orientation: Orientation::Bottom,
            tick_size: -50.0,
            offset: 75.0,
            extent: (25.0, 175.0),
            ticks: vec![Tick { position: 25.0, label: "0".to_string() }],
        });

        let svg = to_svg(&scene);
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains(r##"<circle cx="10" cy="20" r="5" fill="#1f77b4"/>"##));
        assert!(svg.contains(r#"<path d="M0,0L5,5" fill="none" stroke="red" stroke-width="2"/>"#));
        assert!(svg.contains(r#"class="x axis" transform="translate(0,75)""#));
        assert!(svg.contains(r#"<line y2="-50"/>"#));
    }

    #[test]
    fn test_hover_class_passes_through() {
        let mut scene = Scene::new(10.0, 10.0);
        let g = scene.create_group("layer");
        let style = Style { hover: true, ..Style::fill("black") }.with_class("hover");
        scene.append_shape(g, Shape::text(1.0, 2.0, "a & b", style));
        let svg = to_svg(&scene);
        assert!(svg.contains(r#"class="hover">a &amp; b</text>"#));
    }
}
