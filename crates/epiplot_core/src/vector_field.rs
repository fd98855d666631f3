//! Direction fields for user-supplied planar systems `dx/dt = f(x, y)`, `dy/dt = g(x, y)`.

use crate::equation_engine::EquationSystem;
use crate::error::ExpressionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_MESH_DENSITY: i64 = 5;
/// Largest accepted points-per-axis count.
pub const MAX_MESH_DENSITY: i64 = 200;
/// Added to every magnitude so stationary points normalize to a zero vector.
pub const MAGNITUDE_FLOOR: f64 = 1e-9;
/// Segment length as a fraction of the grid spacing along x.
pub const SEGMENT_SCALE: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorFieldRequest {
    pub dx_expr: String,
    pub dy_expr: String,
    pub range_x: f64,
    pub range_y: f64,
    /// Points per axis; anything below 5 is raised to 5, anything above
    /// `MAX_MESH_DENSITY` is rejected.
    pub mesh_density: i64,
}

impl Default for VectorFieldRequest {
    fn default() -> Self {
        FieldPreset::Circular.request(3.0, 3.0, 20)
    }
}

impl VectorFieldRequest {
    pub fn evaluate(&self) -> Result<VectorFieldResult, ExpressionError> {
        evaluate(
            &self.dx_expr,
            &self.dy_expr,
            self.range_x,
            self.range_y,
            self.mesh_density,
        )
    }
}

/// One glyph: a grid point, its unit direction and the segment end point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldArrow {
    pub x: f64,
    pub y: f64,
    pub u: f64,
    pub v: f64,
    pub end_x: f64,
    pub end_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorFieldResult {
    pub range_x: f64,
    pub range_y: f64,
    pub mesh_density: usize,
    pub segment_length: f64,
    /// Row-major: y varies slowest, matching `meshgrid(xs, ys)`.
    pub arrows: Vec<FieldArrow>,
    pub grid: Vec<[f64; 2]>,
}

pub fn evaluate(
    dx_expr: &str,
    dy_expr: &str,
    range_x: f64,
    range_y: f64,
    mesh_density: i64,
) -> Result<VectorFieldResult, ExpressionError> {
    for (axis, range) in [("x", range_x), ("y", range_y)] {
        if !range.is_finite() || range <= 0.0 {
            return Err(ExpressionError::InvalidMesh(format!(
                "range {axis} must be a positive finite number, got {range}"
            )));
        }
    }
    if mesh_density > MAX_MESH_DENSITY {
        return Err(ExpressionError::InvalidMesh(format!(
            "mesh density must be at most {MAX_MESH_DENSITY}, got {mesh_density}"
        )));
    }
    let density = usize::try_from(mesh_density.max(MIN_MESH_DENSITY))
        .map_err(|_| ExpressionError::InvalidMesh(format!("mesh density {mesh_density}")))?;
    let points = density
        .checked_mul(density)
        .ok_or_else(|| ExpressionError::InvalidMesh(format!("mesh density {density} overflows")))?;
    let system = EquationSystem::compile(&[dx_expr, dy_expr], &["x", "y"])?;

    let xs = axis_samples(range_x, density);
    let ys = axis_samples(range_y, density);
    let segment_length = (range_x * 2.0 / density as f64) * SEGMENT_SCALE;

    let mut arrows = Vec::with_capacity(points);
    let mut grid = Vec::with_capacity(points);
    let mut out = [0.0; 2];

    for &y in &ys {
        for &x in &xs {
            system
                .try_apply(&[x, y], &mut out)
                .map_err(|fault| ExpressionError::Domain {
                    function: fault.function.name(),
                    argument: fault.argument,
                    x,
                    y,
                })?;
            let [u, v] = out;
            if !u.is_finite() || !v.is_finite() {
                return Err(ExpressionError::NonFinite { x, y });
            }
            let magnitude = (u * u + v * v).sqrt() + MAGNITUDE_FLOOR;
            let (un, vn) = (u / magnitude, v / magnitude);
            arrows.push(FieldArrow {
                x,
                y,
                u: un,
                v: vn,
                end_x: x + un * segment_length,
                end_y: y + vn * segment_length,
            });
            grid.push([x, y]);
        }
    }

    Ok(VectorFieldResult {
        range_x,
        range_y,
        mesh_density: density,
        segment_length,
        arrows,
        grid,
    })
}

fn axis_samples(range: f64, count: usize) -> Vec<f64> {
    crate::integrator::linspace(-range, range, count)
}

/// Example systems offered next to the free-form inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPreset {
    Circular,
    Saddle,
    Logistic,
    SinCos,
    Lotka,
}

impl FieldPreset {
    pub const ALL: [FieldPreset; 5] = [
        FieldPreset::Circular,
        FieldPreset::Saddle,
        FieldPreset::Logistic,
        FieldPreset::SinCos,
        FieldPreset::Lotka,
    ];

    pub fn key(self) -> &'static str {
        match self {
            FieldPreset::Circular => "circular",
            FieldPreset::Saddle => "saddle",
            FieldPreset::Logistic => "logistic",
            FieldPreset::SinCos => "sincos",
            FieldPreset::Lotka => "lotka",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldPreset::Circular => "Flujo circular: dx=-y, dy=x",
            FieldPreset::Saddle => "Punto de silla: dx=x, dy=-y",
            FieldPreset::Logistic => "Flujo logístico: dx=x*(1-x), dy=y",
            FieldPreset::SinCos => "Sin/Cos: dx=sin(x), dy=cos(y)",
            FieldPreset::Lotka => "Lotka-Volterra",
        }
    }

    /// `(dx/dt, dy/dt)` source text.
    pub fn expressions(self) -> (&'static str, &'static str) {
        match self {
            FieldPreset::Circular => ("-y", "x"),
            FieldPreset::Saddle => ("x", "-y"),
            FieldPreset::Logistic => ("x*(1-x)", "y"),
            FieldPreset::SinCos => ("np.sin(x)", "np.cos(y)"),
            FieldPreset::Lotka => ("0.1*x - 0.2*x*y", "-0.1*y + 0.1*x*y"),
        }
    }

    pub fn request(self, range_x: f64, range_y: f64, mesh_density: i64) -> VectorFieldRequest {
        let (dx, dy) = self.expressions();
        VectorFieldRequest {
            dx_expr: dx.to_string(),
            dy_expr: dy.to_string(),
            range_x,
            range_y,
            mesh_density,
        }
    }
}

impl fmt::Display for FieldPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for FieldPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPreset::ALL
            .into_iter()
            .find(|preset| preset.key() == s)
            .ok_or_else(|| format!("unknown vector field preset '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_field_normalizes_to_unit_length_away_from_origin() {
        let field = evaluate("-y", "x", 3.0, 3.0, 5).expect("rotation field should evaluate");
        assert_eq!(field.arrows.len(), 25);
        assert_eq!(field.grid.len(), 25);
        for arrow in &field.arrows {
            let raw = (arrow.x * arrow.x + arrow.y * arrow.y).sqrt();
            let normalized = (arrow.u * arrow.u + arrow.v * arrow.v).sqrt();
            if raw > 1e-6 {
                assert!(
                    (normalized - 1.0).abs() < 1e-6,
                    "magnitude {normalized} at ({}, {})",
                    arrow.x,
                    arrow.y
                );
            } else {
                assert_eq!(normalized, 0.0, "stationary point must stay at rest");
            }
        }
    }

    #[test]
    fn segments_scale_with_grid_spacing() {
        let field = evaluate("1", "0", 2.0, 1.0, 10).expect("constant field");
        let expected = (2.0 * 2.0 / 10.0) * 0.4;
        assert!((field.segment_length - expected).abs() < 1e-12);
        let first = field.arrows[0];
        assert_eq!((first.x, first.y), (-2.0, -1.0));
        assert!((first.end_x - (first.x + expected)).abs() < 1e-6);
        assert_eq!(first.end_y, first.y);
        let last = field.arrows[field.arrows.len() - 1];
        assert_eq!((last.x, last.y), (2.0, 1.0));
    }

    #[test]
    fn mesh_density_is_clamped_to_minimum() {
        for requested in [-3, 0, 2, 5] {
            let field = evaluate("x", "-y", 1.0, 1.0, requested).expect("saddle field");
            assert_eq!(field.mesh_density, 5);
            assert_eq!(field.arrows.len(), 25);
        }
    }

    #[test]
    fn oversized_mesh_is_rejected() {
        for requested in [MAX_MESH_DENSITY + 1, i64::MAX] {
            assert!(matches!(
                evaluate("x", "y", 1.0, 1.0, requested),
                Err(ExpressionError::InvalidMesh(message)) if message.contains("at most")
            ));
        }
        let field = evaluate("x", "y", 1.0, 1.0, MAX_MESH_DENSITY).expect("largest mesh");
        assert_eq!(field.arrows.len(), 40_000);
    }

    #[test]
    fn deeply_nested_expression_is_an_error_not_a_crash() {
        let nested = format!("{}x{}", "(".repeat(50_000), ")".repeat(50_000));
        assert!(matches!(
            evaluate(&nested, "y", 1.0, 1.0, 5),
            Err(ExpressionError::Parse { .. })
        ));
        let signs = format!("{}x", "-".repeat(10_000));
        assert!(matches!(
            evaluate("y", &signs, 1.0, 1.0, 5),
            Err(ExpressionError::Parse { .. })
        ));
    }

    #[test]
    fn disallowed_identifier_yields_no_result() {
        let result = evaluate("__import__", "x", 3.0, 3.0, 5);
        assert_eq!(
            result,
            Err(ExpressionError::UnknownIdentifier("__import__".into()))
        );
    }

    #[test]
    fn domain_error_reports_the_offending_grid_point() {
        let err = evaluate("log(x)", "y", 1.0, 1.0, 5).expect_err("log(-1) is undefined");
        match err {
            ExpressionError::Domain { function, x, .. } => {
                assert_eq!(function, "log");
                assert_eq!(x, -1.0);
            }
            other => panic!("expected domain error, got {other:?}"),
        }
        assert!(matches!(
            evaluate("1/x", "y", 1.0, 1.0, 5),
            Err(ExpressionError::NonFinite { x, .. }) if x == 0.0
        ));
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(matches!(
            evaluate("x", "y", 0.0, 1.0, 5),
            Err(ExpressionError::InvalidMesh(_))
        ));
        assert!(matches!(
            evaluate("x", "y", 1.0, f64::INFINITY, 5),
            Err(ExpressionError::InvalidMesh(_))
        ));
    }

    #[test]
    fn every_preset_evaluates() {
        for preset in FieldPreset::ALL {
            let request = preset.request(3.0, 3.0, 12);
            let field = request.evaluate().expect("preset should evaluate");
            assert_eq!(field.arrows.len(), 144, "{preset}");
            assert_eq!(preset.key().parse::<FieldPreset>(), Ok(preset));
        }
    }
}
