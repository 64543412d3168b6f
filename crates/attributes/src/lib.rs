mod expr;
mod memo;

pub use expr::{evaluate, Expr, MaterialAttributeSet, SceneState, Value};
pub use memo::PerFrameMemoTable;

/// Identifies one attribute declaration for memoization: the owning
/// material plus that attribute's position in its declaration list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeKey {
    pub material_id: u64,
    pub declaration_index: u32,
}

/// Evaluates and memoizes `Expr`s across every material for one frame.
/// The memo table is cleared wholesale the instant `frame_number`
/// changes (spec.md §5: "its lifetime is exactly one frame").
#[derive(Default)]
pub struct AttributeEvaluator {
    memo: PerFrameMemoTable<AttributeKey, Value>,
}

impl AttributeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &self,
        frame_number: u64,
        key: AttributeKey,
        expr: &Expr,
        scene: &SceneState,
    ) -> Value {
        self.memo
            .get_or_insert_with(frame_number, key, || evaluate(expr, scene))
    }

    /// Evaluates every attribute in `material`'s declaration order and
    /// returns the full set to apply atomically, memoizing each one
    /// under `material_id`.
    pub fn evaluate_material(
        &self,
        frame_number: u64,
        material_id: u64,
        material: &MaterialAttributeSet,
        scene: &SceneState,
    ) -> Vec<(String, Value)> {
        material
            .declarations()
            .iter()
            .enumerate()
            .map(|(index, (name, expr))| {
                let key = AttributeKey {
                    material_id,
                    declaration_index: index as u32,
                };
                (name.clone(), self.evaluate(frame_number, key, expr, scene))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_material_is_memoized_within_a_frame() {
        let evaluator = AttributeEvaluator::new();
        let material = MaterialAttributeSet::new(vec![(
            "opacity".into(),
            Expr::ZoomLevel,
        )]);
        let scene = SceneState {
            time_seconds: 0.0,
            frame_number: 3,
            zoom_level: 12.0,
            pixel_to_meters: 1.0,
            max_visibility: 1.0,
        };

        let first = evaluator.evaluate_material(3, 1, &material, &scene);
        assert_eq!(first, vec![("opacity".to_string(), Value::Number(12.0))]);
        assert_eq!(evaluator.memo.len(), 1);

        let second = evaluator.evaluate_material(3, 1, &material, &scene);
        assert_eq!(second, first);
        assert_eq!(evaluator.memo.len(), 1);
    }

    #[test]
    fn new_frame_number_clears_memoized_attributes() {
        let evaluator = AttributeEvaluator::new();
        let material = MaterialAttributeSet::new(vec![("zoom".into(), Expr::ZoomLevel)]);
        let scene_a = SceneState {
            time_seconds: 0.0,
            frame_number: 1,
            zoom_level: 4.0,
            pixel_to_meters: 1.0,
            max_visibility: 1.0,
        };
        let scene_b = SceneState {
            zoom_level: 9.0,
            frame_number: 2,
            ..scene_a
        };

        evaluator.evaluate_material(1, 1, &material, &scene_a);
        let next = evaluator.evaluate_material(2, 1, &material, &scene_b);
        assert_eq!(next, vec![("zoom".to_string(), Value::Number(9.0))]);
    }
}
