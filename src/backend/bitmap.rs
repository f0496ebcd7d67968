use crate::surface::{Axis, Orientation, Scene, SceneItem, Shape, Style, TextAnchor};
use anyhow::{Context, Result};
use image::ImageEncoder;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::FontTransform;
use tracing::warn;

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

const GRID: RGBColor = RGBColor(255, 255, 255);
const INK: RGBColor = RGBColor(51, 51, 51);
const DEFAULT_FONT_SIZE: f64 = 11.0;

/// Rasterize a scene and encode it as PNG
pub fn to_png(scene: &Scene) -> Result<Vec<u8>> {
    let width = scene.width.round().max(1.0) as u32;
    let height = scene.height.round().max(1.0) as u32;
    let mut buffer = vec![0u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;

        for item in scene.items() {
            match item {
                SceneItem::Group(group) => {
                    for shape in &group.shapes {
                        // Hover-only marks are invisible in a static image
                        if shape.style().hover {
                            continue;
                        }
                        draw_shape(&root, shape)?;
                    }
                }
                SceneItem::Axis(axis) => draw_axis(&root, axis)?,
            }
        }

        root.present().context("Failed to present drawing")?;
    }

    let mut png_bytes = Vec::new();
    {
        let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
        encoder
            .write_image(&buffer, width, height, image::ColorType::Rgb8)
            .context("Failed to encode PNG")?;
    }

    Ok(png_bytes)
}

fn px(v: f64) -> i32 {
    v.round() as i32
}

fn point((x, y): (f64, f64)) -> (i32, i32) {
    (px(x), px(y))
}

fn fill_style(style: &Style) -> Option<ShapeStyle> {
    let color = parse_color(style.fill.as_deref()?)?;
    Some(color.mix(style.opacity.unwrap_or(1.0)).filled())
}

fn stroke_style(style: &Style) -> Option<ShapeStyle> {
    let color = parse_color(style.stroke.as_deref()?)?;
    let width = style.stroke_width.unwrap_or(1.0).round().max(1.0) as u32;
    Some(color.mix(style.opacity.unwrap_or(1.0)).stroke_width(width))
}

fn draw_shape(root: &Area<'_>, shape: &Shape) -> Result<()> {
    match shape {
        Shape::Circle { cx, cy, r, style } => {
            let center = point((*cx, *cy));
            let radius = px(*r).max(1);
            if let Some(fill) = fill_style(style) {
                root.draw(&Circle::new(center, radius, fill)).context("Failed to draw circle")?;
            }
            if let Some(stroke) = stroke_style(style) {
                root.draw(&Circle::new(center, radius, stroke)).context("Failed to draw circle")?;
            }
        }
        Shape::Rect { x, y, width, height, style } => {
            let corners = [point((*x, *y)), point((x + width, y + height))];
            if let Some(fill) = fill_style(style) {
                root.draw(&Rectangle::new(corners, fill)).context("Failed to draw rect")?;
            }
            if let Some(stroke) = stroke_style(style) {
                root.draw(&Rectangle::new(corners, stroke)).context("Failed to draw rect")?;
            }
        }
        Shape::Path { points, closed, style } => {
            let pixels: Vec<(i32, i32)> = points.iter().copied().map(point).collect();
            if *closed {
                if let Some(fill) = fill_style(style) {
                    root.draw(&Polygon::new(pixels.clone(), fill)).context("Failed to draw polygon")?;
                }
            }
            if let Some(stroke) = stroke_style(style) {
                let mut outline = pixels;
                if *closed {
                    if let Some(first) = outline.first().copied() {
                        outline.push(first);
                    }
                }
                root.draw(&PathElement::new(outline, stroke)).context("Failed to draw path")?;
            }
        }
        Shape::Text { x, y, content, anchor, angle, style } => {
            let color = style.fill.as_deref().and_then(parse_color).unwrap_or(INK);
            let size = style.font_size.unwrap_or(DEFAULT_FONT_SIZE);
            draw_text(root, content, point((*x, *y)), *anchor, *angle, size, color);
        }
    }
    Ok(())
}

/// Text needs system fonts; a missing font loses the label, not the image.
fn draw_text(root: &Area<'_>, content: &str, at: (i32, i32), anchor: TextAnchor, angle: f64, size: f64, color: RGBColor) {
    let hpos = match anchor {
        TextAnchor::Start => HPos::Left,
        TextAnchor::Middle => HPos::Center,
        TextAnchor::End => HPos::Right,
    };
    let mut font = ("sans-serif", size).into_font();
    if angle <= -45.0 {
        font = font.transform(FontTransform::Rotate270);
    } else if angle >= 45.0 {
        font = font.transform(FontTransform::Rotate90);
    }
    let text_style = font.color(&color).pos(Pos::new(hpos, VPos::Bottom));
    if let Err(e) = root.draw(&Text::new(content.to_string(), at, text_style)) {
        warn!(error = %e, "Failed to draw text");
    }
}

fn draw_axis(root: &Area<'_>, axis: &Axis) -> Result<()> {
    let grid = GRID.stroke_width(1);
    let domain = INK.stroke_width(1);
    let (e0, e1) = axis.extent;
    let o = axis.offset;
    match axis.orientation {
        Orientation::Bottom => {
            for tick in &axis.ticks {
                let p = tick.position;
                root.draw(&PathElement::new(vec![point((p, o)), point((p, o + axis.tick_size))], grid))
                    .context("Failed to draw tick")?;
                let label_y = o + axis.tick_size.max(0.0) + 3.0 + DEFAULT_FONT_SIZE;
                draw_text(root, &tick.label, point((p, label_y)), TextAnchor::Middle, 0.0, 10.0, INK);
            }
            root.draw(&PathElement::new(vec![point((e0, o)), point((e1, o))], domain))
                .context("Failed to draw axis")?;
        }
        Orientation::Left => {
            for tick in &axis.ticks {
                let p = tick.position;
                root.draw(&PathElement::new(vec![point((o, p)), point((o - axis.tick_size, p))], grid))
                    .context("Failed to draw tick")?;
                let label_x = o - axis.tick_size.max(0.0) - 3.0;
                draw_text(root, &tick.label, point((label_x, p + 4.0)), TextAnchor::End, 0.0, 10.0, INK);
            }
            root.draw(&PathElement::new(vec![point((o, e0)), point((o, e1))], domain))
                .context("Failed to draw axis")?;
        }
    }
    Ok(())
}

/// Parse a CSS-style color: `#rgb`, `#rrggbb` or a basic name.
/// `none` and unknown strings yield `None`.
fn parse_color(color: &str) -> Option<RGBColor> {
    let color = color.trim();
    if let Some(hex) = color.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            6 => Some(RGBColor(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
            3 => {
                let digit = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Some(RGBColor(digit(0)?, digit(1)?, digit(2)?))
            }
            _ => None,
        };
    }
    match color.to_ascii_lowercase().as_str() {
        "red" => Some(RED),
        "green" => Some(GREEN),
        "blue" => Some(BLUE),
        "black" => Some(BLACK),
        "yellow" => Some(YELLOW),
        "cyan" => Some(CYAN),
        "magenta" => Some(MAGENTA),
        "white" => Some(WHITE),
        "gray" | "grey" => Some(RGBColor(128, 128, 128)),
        "orange" => Some(RGBColor(255, 165, 0)),
        "steelblue" => Some(RGBColor(70, 130, 180)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Surface;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#1f77b4"), Some(RGBColor(0x1f, 0x77, 0xb4)));
        assert_eq!(parse_color("#fff"), Some(RGBColor(255, 255, 255)));
        assert_eq!(parse_color("Red"), Some(RED));
        assert_eq!(parse_color("none"), None);
        assert_eq!(parse_color("#12"), None);
    }

    #[test]
    fn test_png_magic_bytes() {
        let mut scene = Scene::new(40.0, 30.0);
        let g = scene.create_group("layer");
        scene.append_shape(g, Shape::Rect { x: 5.0, y: 5.0, width: 10.0, height: 10.0, style: Style::fill("#ff0000") });
        scene.append_shape(g, Shape::Circle { cx: 20.0, cy: 15.0, r: 3.0, style: Style::fill("blue") });
        scene.append_shape(
            g,
            Shape::Path { points: vec![(0.0, 0.0), (10.0, 0.0), (5.0, 8.0)], closed: true, style: Style::fill("green") },
        );
        let png = to_png(&scene).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    }
}
