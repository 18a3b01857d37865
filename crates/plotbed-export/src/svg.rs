//! SVG preview serializer.
//!
//! Draws a [`TraceResult`] in machine millimetres, seen from above with
//! the Y axis pointing up: the detected workpiece outline, the adjusted
//! corners, and the planned legs (extruding legs solid, travel legs
//! dashed). Uses the [`svg`] crate for document construction and
//! escaping.
//!
//! This is a pure function with no I/O: it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Circle, Description, Element, Group, Path, Title};
use svg::node::{Node, Text};

use plotbed_pipeline::{MachinePoint, TraceResult};

/// Empty border around the drawing (mm).
const MARGIN_MM: f64 = 10.0;

/// Metadata to embed in the SVG document.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    pub title: Option<&'a str>,
    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,
    /// Configuration JSON, emitted inside `<metadata>`.
    pub config_json: Option<&'a str>,
}

/// Axis-aligned bounds of everything drawn.
struct Bounds {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Bounds {
    fn around(points: impl IntoIterator<Item = MachinePoint>) -> Self {
        let mut b = Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for p in points {
            b.min_x = b.min_x.min(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_x = b.max_x.max(p.x);
            b.max_y = b.max_y.max(p.y);
        }
        if !b.min_x.is_finite() {
            b = Self {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 0.0,
                max_y: 0.0,
            };
        }
        b.min_x -= MARGIN_MM;
        b.min_y -= MARGIN_MM;
        b.max_x += MARGIN_MM;
        b.max_y += MARGIN_MM;
        b
    }

    fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Machine point to document coordinates (Y flipped).
    fn project(&self, p: MachinePoint) -> (f64, f64) {
        (p.x - self.min_x, self.max_y - p.y)
    }
}

fn line_path(bounds: &Bounds, points: &[MachinePoint], closed: bool) -> Option<Data> {
    let (first, rest) = points.split_first()?;
    let mut data = Data::new().move_to(bounds.project(*first));
    for p in rest {
        data = data.line_to(bounds.project(*p));
    }
    if closed {
        data = data.close();
    }
    Some(data)
}

/// Serialize a trace result into an SVG preview.
#[must_use]
pub fn plan_to_svg(result: &TraceResult, metadata: &SvgMetadata<'_>) -> String {
    let segments = &result.plan.segments;
    let bounds = Bounds::around(
        result
            .mapped_corners
            .iter()
            .chain(result.adjusted_corners.points())
            .copied()
            .chain(segments.iter().flat_map(|s| [s.start, s.end])),
    );

    let mut doc = Document::new()
        .set("width", format!("{}mm", bounds.width()))
        .set("height", format!("{}mm", bounds.height()))
        .set("viewBox", (0.0, 0.0, bounds.width(), bounds.height()));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(config_json) = metadata.config_json {
        let mut config_el = Element::new("plotbed:config");
        config_el.assign("xmlns:plotbed", "https://plotbed.invalid/ns/1");
        config_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(config_el);
        doc = doc.add(metadata_el);
    }

    if let Some(outline) = line_path(&bounds, &result.mapped_corners, true) {
        doc = doc.add(
            Path::new()
                .set("id", "outline")
                .set("d", outline)
                .set("fill", "none")
                .set("stroke", "gray")
                .set("stroke-width", 0.5),
        );
    }

    let mut legs = Group::new().set("id", "legs");
    for segment in segments {
        let Some(data) = line_path(&bounds, &[segment.start, segment.end], false) else {
            continue;
        };
        let mut path = Path::new().set("d", data).set("fill", "none");
        path = if segment.is_extruding() {
            path.set("stroke", "black").set("stroke-width", 0.8)
        } else {
            path.set("stroke", "steelblue")
                .set("stroke-width", 0.4)
                .set("stroke-dasharray", "2 1")
        };
        legs = legs.add(path);
    }
    doc = doc.add(legs);

    let mut corners = Group::new().set("id", "corners").set("fill", "red");
    for p in result.adjusted_corners.points() {
        let (cx, cy) = bounds.project(*p);
        corners = corners.add(Circle::new().set("cx", cx).set("cy", cy).set("r", 1.0));
    }
    doc = doc.add(corners);

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
