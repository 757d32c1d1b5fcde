use std::f32::consts::TAU;

use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::types::{
    BODY_MORPH_NAMES, CORRECTIVE_MORPH_NAMES, ContainerAnalysis, FACIAL_MORPH_NAMES, MorphCategory,
    MorphTarget, OptimizedBudget,
};

/// Delta amplitude as a fraction of model height.
const DELTA_AMPLITUDE_RATIO: f32 = 0.01;
/// Absolute bound on any single delta component, in scene units.
const MAX_DELTA: f32 = 0.05;

/// Share of the morph budget spent per category, in priority order.
const FACIAL_SHARE_PERCENT: usize = 60;
const BODY_SHARE_PERCENT: usize = 25;

fn default_weight(category: MorphCategory) -> f32 {
    match category {
        MorphCategory::Facial => 1.0,
        MorphCategory::Body => 0.6,
        MorphCategory::Corrective => 0.3,
    }
}

fn category_name(category: MorphCategory, index: usize) -> String {
    let (table, overflow_prefix): (&[&str], &str) = match category {
        MorphCategory::Facial => (&FACIAL_MORPH_NAMES, "facialExtra"),
        MorphCategory::Body => (&BODY_MORPH_NAMES, "bodyExtra"),
        MorphCategory::Corrective => (&CORRECTIVE_MORPH_NAMES, "corrective"),
    };
    table
        .get(index)
        .map(|name| (*name).to_string())
        .unwrap_or_else(|| format!("{overflow_prefix}{index:02}"))
}

fn target_seed(analysis: &ContainerAnalysis, budget: &OptimizedBudget, ordinal: usize) -> u64 {
    let mut seed = analysis.vertex_count as u64;
    seed = seed
        .wrapping_mul(0xD1B5_4A32_D192_ED03)
        .wrapping_add(budget.morph_count as u64);
    seed = seed
        .wrapping_mul(0xD1B5_4A32_D192_ED03)
        .wrapping_add(budget.bone_count as u64);
    seed.wrapping_mul(0xD1B5_4A32_D192_ED03)
        .wrapping_add(ordinal as u64)
}

/// Bounded per-vertex displacement field: three low-frequency harmonics
/// with seeded amplitude, frequency and phase per axis. Deliberately tame
/// so the artifact stays plausible without an external scorer.
fn build_deltas(rng: &mut Pcg32, vertex_count: usize, amplitude: f32) -> Vec<[f32; 3]> {
    let mut axes = [(0.0f32, 0.0f32, 0.0f32); 3];
    for axis in &mut axes {
        *axis = (
            rng.random_range(0.2..=1.0) * amplitude,
            rng.random_range(0.005..=0.05),
            rng.random_range(0.0..TAU),
        );
    }

    (0..vertex_count)
        .map(|vertex| {
            let mut delta = [0.0f32; 3];
            for (component, (amp, freq, phase)) in delta.iter_mut().zip(axes.iter()) {
                *component = (amp * (freq * vertex as f32 + phase).sin()).clamp(-MAX_DELTA, MAX_DELTA);
            }
            delta
        })
        .collect()
}

/// Produce exactly `budget.morph_count` targets: facial expressions first
/// (60% of the budget), then body-correction targets (25%), then generic
/// corrective fill for the remainder. Every target's delta list length
/// equals `analysis.vertex_count` exactly.
pub fn synthesize(analysis: &ContainerAnalysis, budget: &OptimizedBudget) -> Vec<MorphTarget> {
    let total = budget.morph_count;
    let facial = total * FACIAL_SHARE_PERCENT / 100;
    let body = total * BODY_SHARE_PERCENT / 100;
    let corrective = total - facial - body;

    let amplitude = (analysis.bounding_box.height() * DELTA_AMPLITUDE_RATIO).clamp(0.0, MAX_DELTA);

    let plan = [
        (MorphCategory::Facial, facial),
        (MorphCategory::Body, body),
        (MorphCategory::Corrective, corrective),
    ];

    let mut targets = Vec::<MorphTarget>::with_capacity(total);
    let mut ordinal = 0usize;
    for (category, count) in plan {
        for index in 0..count {
            let mut rng = Pcg32::seed_from_u64(target_seed(analysis, budget, ordinal));
            targets.push(MorphTarget {
                name: category_name(category, index),
                category,
                vertex_deltas: build_deltas(&mut rng, analysis.vertex_count, amplitude),
                weight: default_weight(category),
            });
            ordinal += 1;
        }
    }

    tracing::debug!(
        facial,
        body,
        corrective,
        vertex_count = analysis.vertex_count,
        "synthesized morph targets"
    );

    targets
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::analyzer;
    use super::super::types::BoundingBox;
    use super::*;

    fn analysis_with_vertices(vertex_count: usize) -> ContainerAnalysis {
        let mut analysis = analyzer::degraded_analysis();
        analysis.vertex_count = vertex_count;
        analysis.bounding_box = BoundingBox {
            min: [-0.4, 0.0, -0.2],
            max: [0.4, 1.7, 0.2],
        };
        analysis
    }

    fn budget(morph_count: usize) -> OptimizedBudget {
        OptimizedBudget {
            bone_count: 20,
            morph_count,
            applied_adjustments: Vec::new(),
        }
    }

    #[test]
    fn given_budget_then_exactly_that_many_targets_are_produced() {
        for morph_count in [0usize, 1, 5, 20, 100] {
            let targets = synthesize(&analysis_with_vertices(100), &budget(morph_count));
            assert_eq!(targets.len(), morph_count);
        }
    }

    #[test]
    fn given_vertex_counts_then_delta_length_matches_exactly() {
        for vertex_count in [0usize, 1, 50_000] {
            let targets = synthesize(&analysis_with_vertices(vertex_count), &budget(5));
            for target in &targets {
                assert_eq!(target.vertex_deltas.len(), vertex_count);
            }
        }
    }

    #[test]
    fn given_budget_of_20_then_category_split_is_60_25_15() {
        let targets = synthesize(&analysis_with_vertices(100), &budget(20));
        let count = |category: MorphCategory| {
            targets
                .iter()
                .filter(|target| target.category == category)
                .count()
        };
        assert_eq!(count(MorphCategory::Facial), 12);
        assert_eq!(count(MorphCategory::Body), 5);
        assert_eq!(count(MorphCategory::Corrective), 3);
    }

    #[test]
    fn given_facial_priority_then_expression_names_come_first() {
        let targets = synthesize(&analysis_with_vertices(100), &budget(10));
        assert_eq!(targets[0].name, "neutral");
        assert_eq!(targets[0].category, MorphCategory::Facial);
    }

    #[test]
    fn given_budget_beyond_name_tables_then_overflow_names_are_generated() {
        let targets = synthesize(&analysis_with_vertices(10), &budget(100));
        assert!(targets.iter().any(|target| target.name.starts_with("facialExtra")));
        assert!(targets.iter().any(|target| target.name.starts_with("bodyExtra")));
    }

    #[test]
    fn given_deltas_then_magnitudes_stay_bounded() {
        let targets = synthesize(&analysis_with_vertices(5_000), &budget(8));
        for target in &targets {
            for delta in &target.vertex_deltas {
                for component in delta {
                    assert!(component.abs() <= MAX_DELTA);
                }
            }
        }
    }

    #[test]
    fn given_identical_inputs_then_targets_are_deterministic() {
        let analysis = analysis_with_vertices(2_000);
        let first = synthesize(&analysis, &budget(12));
        let second = synthesize(&analysis, &budget(12));
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.vertex_deltas, b.vertex_deltas);
        }
    }

    #[test]
    fn given_weights_then_all_are_within_unit_range() {
        let targets = synthesize(&analysis_with_vertices(100), &budget(20));
        assert!(
            targets
                .iter()
                .all(|target| (0.0..=1.0).contains(&target.weight))
        );
    }
}
