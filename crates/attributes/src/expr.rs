//! Expressions and interpolated properties evaluated against one
//! frame's scene state, plus the atomic-apply rule for a material's
//! declared attributes.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneState {
    pub time_seconds: f64,
    pub frame_number: u64,
    pub zoom_level: f32,
    pub pixel_to_meters: f32,
    pub max_visibility: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Number(f64),
    Color([f32; 4]),
    Boolean(bool),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Constant(Value),
    Time,
    FrameNumber,
    ZoomLevel,
    PixelToMeters,
    MaxVisibility,
    Add(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    /// Linear interpolation over `(zoom, value)` stops, keyed on the
    /// scene's current zoom level. Stops must be sorted ascending by
    /// zoom; this is the spec's `InterpolatedProperty`.
    InterpolatedByZoom(Vec<(f32, f64)>),
}

/// Pure evaluation: same `Expr` + `SceneState` always yields the same
/// `Value`, independent of call order or prior evaluations.
pub fn evaluate(expr: &Expr, scene: &SceneState) -> Value {
    match expr {
        Expr::Constant(value) => *value,
        Expr::Time => Value::Number(scene.time_seconds),
        Expr::FrameNumber => Value::Number(scene.frame_number as f64),
        Expr::ZoomLevel => Value::Number(scene.zoom_level as f64),
        Expr::PixelToMeters => Value::Number(scene.pixel_to_meters as f64),
        Expr::MaxVisibility => Value::Number(scene.max_visibility as f64),
        Expr::Add(lhs, rhs) => {
            let l = evaluate(lhs, scene).as_number().unwrap_or(0.0);
            let r = evaluate(rhs, scene).as_number().unwrap_or(0.0);
            Value::Number(l + r)
        }
        Expr::Mul(lhs, rhs) => {
            let l = evaluate(lhs, scene).as_number().unwrap_or(0.0);
            let r = evaluate(rhs, scene).as_number().unwrap_or(0.0);
            Value::Number(l * r)
        }
        Expr::InterpolatedByZoom(stops) => Value::Number(interpolate_by_zoom(stops, scene.zoom_level)),
    }
}

fn interpolate_by_zoom(stops: &[(f32, f64)], zoom: f32) -> f64 {
    if stops.is_empty() {
        return 0.0;
    }
    if zoom <= stops[0].0 {
        return stops[0].1;
    }
    let last = stops.len() - 1;
    if zoom >= stops[last].0 {
        return stops[last].1;
    }
    for window in stops.windows(2) {
        let (z0, v0) = window[0];
        let (z1, v1) = window[1];
        if zoom >= z0 && zoom <= z1 {
            let ratio = if z1 > z0 { (zoom - z0) / (z1 - z0) } else { 0.0 };
            return v0 + (v1 - v0) * ratio as f64;
        }
    }
    stops[last].1
}

/// One material's declared attributes, evaluated in declaration order
/// and applied only after every attribute has a computed value — so a
/// reader of the material's fields never observes some new and some
/// stale attribute mid-update.
#[derive(Debug, Clone)]
pub struct MaterialAttributeSet {
    declarations: Vec<(String, Expr)>,
}

impl MaterialAttributeSet {
    pub fn new(declarations: Vec<(String, Expr)>) -> Self {
        Self { declarations }
    }

    pub fn evaluate_all(&self, scene: &SceneState) -> Vec<(String, Value)> {
        self.declarations
            .iter()
            .map(|(name, expr)| (name.clone(), evaluate(expr, scene)))
            .collect()
    }

    pub fn declarations(&self) -> &[(String, Expr)] {
        &self.declarations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> SceneState {
        SceneState {
            time_seconds: 10.0,
            frame_number: 100,
            zoom_level: 8.0,
            pixel_to_meters: 2.0,
            max_visibility: 1.0,
        }
    }

    #[test]
    fn constant_evaluates_to_itself() {
        let value = evaluate(&Expr::Constant(Value::Number(5.0)), &scene());
        assert_eq!(value, Value::Number(5.0));
    }

    #[test]
    fn add_and_mul_compose() {
        let expr = Expr::Add(
            Box::new(Expr::Constant(Value::Number(1.0))),
            Box::new(Expr::Mul(
                Box::new(Expr::Constant(Value::Number(2.0))),
                Box::new(Expr::Constant(Value::Number(3.0))),
            )),
        );
        assert_eq!(evaluate(&expr, &scene()), Value::Number(7.0));
    }

    #[test]
    fn interpolated_by_zoom_clamps_at_ends() {
        let stops = vec![(0.0, 1.0), (10.0, 5.0), (20.0, 5.0)];
        assert_eq!(interpolate_by_zoom(&stops, -5.0), 1.0);
        assert_eq!(interpolate_by_zoom(&stops, 100.0), 5.0);
    }

    #[test]
    fn interpolated_by_zoom_is_linear_between_stops() {
        let stops = vec![(0.0, 0.0), (10.0, 100.0)];
        assert_eq!(interpolate_by_zoom(&stops, 5.0), 50.0);
    }

    #[test]
    fn material_attribute_set_evaluates_in_declaration_order() {
        let set = MaterialAttributeSet::new(vec![
            ("opacity".into(), Expr::Constant(Value::Number(0.5))),
            ("color".into(), Expr::Constant(Value::Color([1.0, 0.0, 0.0, 1.0]))),
        ]);
        let results = set.evaluate_all(&scene());
        assert_eq!(results[0].0, "opacity");
        assert_eq!(results[1].0, "color");
    }
}
