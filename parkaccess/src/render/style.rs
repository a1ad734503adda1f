use plotters::style::{RGBAColor, RGBColor};
use serde::Serialize;

/// Opaque sRGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const GREEN: Color = Color::new(0, 128, 0);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const ORANGE: Color = Color::new(255, 165, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);
    pub const LIGHT_GRAY: Color = Color::new(211, 211, 211);
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    pub fn to_rgb(&self) -> RGBColor {
        RGBColor(self.r, self.g, self.b)
    }

    pub fn to_rgba(&self, alpha: f64) -> RGBAColor {
        RGBAColor(self.r, self.g, self.b, alpha.clamp(0.0, 1.0))
    }

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Matplotlib-like styling of one layer on a static map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotStyle {
    /// Outline and line colour, `None` draws no outline
    pub edge: Option<Color>,
    /// Polygon fill, `None` leaves polygons hollow
    pub face: Option<Color>,
    /// Opacity applied to both fill and outline
    pub alpha: f64,
    pub line_width: u32,
}

impl PlotStyle {
    /// Hollow polygons, lines in `color`
    pub fn outline(color: Color, line_width: u32) -> Self {
        PlotStyle {
            edge: Some(color),
            face: None,
            alpha: 1.0,
            line_width,
        }
    }

    /// Same colour for fill and outline
    pub fn solid(color: Color) -> Self {
        PlotStyle {
            edge: Some(color),
            face: Some(color),
            alpha: 1.0,
            line_width: 1,
        }
    }

    pub fn filled(face: Color, edge: Color) -> Self {
        PlotStyle {
            edge: Some(edge),
            face: Some(face),
            alpha: 1.0,
            line_width: 1,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Colour for points and lines: the edge if set, the face otherwise
    pub fn stroke_color(&self) -> Option<Color> {
        self.edge.or(self.face)
    }
}

/// One swatch of a static map legend
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub style: PlotStyle,
}

impl LegendEntry {
    pub fn new(label: impl Into<String>, style: PlotStyle) -> Self {
        LegendEntry {
            label: label.into(),
            style,
        }
    }
}

/// Leaflet path options for one feature
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStyle {
    pub color: String,
    pub weight: f64,
    pub fill_opacity: f64,
}

impl FeatureStyle {
    pub fn new(color: Color, weight: f64, fill_opacity: f64) -> Self {
        FeatureStyle {
            color: color.to_hex(),
            weight,
            fill_opacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_colors() {
        assert_eq!(Color::GREEN.to_hex(), "#008000");
        assert_eq!(Color::LIGHT_GRAY.to_hex(), "#d3d3d3");
        assert_eq!(Color::ORANGE.to_hex(), "#ffa500");
    }

    #[test]
    fn test_stroke_falls_back_to_face() {
        let style = PlotStyle {
            edge: None,
            face: Some(Color::BLUE),
            alpha: 1.0,
            line_width: 1,
        };
        assert_eq!(style.stroke_color(), Some(Color::BLUE));
        assert_eq!(PlotStyle::outline(Color::BLACK, 1).face, None);
    }

    #[test]
    fn test_feature_style_serializes_for_leaflet() {
        let style = FeatureStyle::new(Color::RED, 1.0, 0.2);
        let json = serde_json::to_value(&style).unwrap();
        assert_eq!(json["color"], "#ff0000");
        assert_eq!(json["fillOpacity"], 0.2);
        assert_eq!(json["weight"], 1.0);
    }
}
