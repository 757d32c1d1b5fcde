use std::collections::HashMap;

use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::types::{
    ARM_CHAINS, AnatomyFlags, Bone, BoneHierarchy, BoneKind, BoneSpec, BoundingBox,
    ContainerAnalysis, DETAIL_BONES, DetailGate, HEAD_CHAIN, LEG_CHAINS, OptimizedBudget,
    ROOT_BONE_NAME, TORSO_CHAIN,
};

/// Positional jitter for generated twist bones, as a fraction of height.
const TWIST_JITTER_RATIO: f32 = 0.02;

fn influence_weight(kind: BoneKind) -> f32 {
    match kind {
        BoneKind::Root | BoneKind::Spine => 1.0,
        BoneKind::Head => 0.9,
        BoneKind::Arm | BoneKind::Leg => 0.85,
        BoneKind::Detail => 0.5,
    }
}

fn place(bounds: &BoundingBox, placement: [f32; 3]) -> Vector3<f32> {
    let center = bounds.center();
    Vector3::new(
        center[0] + placement[0] * bounds.width(),
        bounds.min[1] + placement[1] * bounds.height(),
        center[2] + placement[2] * bounds.depth(),
    )
}

fn gate_open(flags: &AnatomyFlags, gate: DetailGate) -> bool {
    match gate {
        DetailGate::Head => flags.head,
        DetailGate::Arms => flags.arms,
        DetailGate::Legs => flags.legs,
        DetailGate::Torso => flags.torso,
    }
}

/// Seed for filler generation, keyed on the analysis and the optimized
/// budget so identical inputs always produce the identical rig.
fn filler_seed(analysis: &ContainerAnalysis, budget: &OptimizedBudget) -> u64 {
    let mut seed = analysis.vertex_count as u64;
    seed = seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(budget.bone_count as u64);
    seed = seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(budget.morph_count as u64);
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(analysis.bounding_box.height().to_bits() as u64)
}

/// Build a rooted bone tree honoring the optimized budget and detected
/// anatomy.
///
/// The root is always emitted first, then the anatomical chains in fixed
/// priority order (torso, head, arms, legs), then detail bones, then
/// generated twist bones, up to exactly `budget.bone_count`. Truncation by
/// a tight budget therefore always drops detail before core bones. Parents
/// resolve by name against already-emitted bones; an absent parent falls
/// back to the root, so forward references and cycles cannot occur.
pub fn synthesize(analysis: &ContainerAnalysis, budget: &OptimizedBudget) -> BoneHierarchy {
    let target = budget.bone_count.max(1);
    let bounds = &analysis.bounding_box;
    let flags = &analysis.anatomy_flags;

    let mut bones = Vec::<Bone>::with_capacity(target);
    let mut id_by_name = HashMap::<&str, usize>::new();

    let center = bounds.center();
    bones.push(Bone {
        id: 0,
        name: ROOT_BONE_NAME.to_string(),
        kind: BoneKind::Root,
        position: Vector3::new(center[0], bounds.min[1], center[2]),
        rotation: UnitQuaternion::identity(),
        parent_id: None,
        weight: 1.0,
    });
    id_by_name.insert(ROOT_BONE_NAME, 0);

    let emit = |bones: &mut Vec<Bone>, id_by_name: &mut HashMap<&str, usize>, spec: &BoneSpec| {
        if bones.len() >= target {
            return;
        }
        let parent_id = id_by_name.get(spec.parent).copied().unwrap_or(0);
        let id = bones.len();
        bones.push(Bone {
            id,
            name: spec.name.to_string(),
            kind: spec.kind,
            position: place(bounds, spec.placement),
            rotation: UnitQuaternion::identity(),
            parent_id: Some(parent_id),
            weight: influence_weight(spec.kind),
        });
        id_by_name.insert(spec.name, id);
    };

    if flags.torso {
        for spec in &TORSO_CHAIN {
            emit(&mut bones, &mut id_by_name, spec);
        }
    }
    if flags.head {
        for spec in &HEAD_CHAIN {
            emit(&mut bones, &mut id_by_name, spec);
        }
    }
    if flags.arms {
        for spec in &ARM_CHAINS {
            emit(&mut bones, &mut id_by_name, spec);
        }
    }
    if flags.legs {
        for spec in &LEG_CHAINS {
            emit(&mut bones, &mut id_by_name, spec);
        }
    }

    for detail in &DETAIL_BONES {
        if bones.len() >= target {
            break;
        }
        if !gate_open(flags, detail.gate) {
            continue;
        }
        emit(
            &mut bones,
            &mut id_by_name,
            &BoneSpec {
                name: detail.name,
                parent: detail.parent,
                kind: BoneKind::Detail,
                placement: detail.placement,
            },
        );
    }

    // Whatever budget remains is spent on generated twist bones, seeded so
    // the same input yields the same rig.
    let mut rng = Pcg32::seed_from_u64(filler_seed(analysis, budget));
    let anchor_count = bones.len();
    let jitter = bounds.height().max(1.0) * TWIST_JITTER_RATIO;
    let mut serial = 0usize;
    while bones.len() < target {
        let parent_id = if anchor_count > 1 {
            1 + serial % (anchor_count - 1)
        } else {
            0
        };
        let parent_position = bones[parent_id].position;
        let offset = Vector3::new(
            rng.random_range(-jitter..=jitter),
            rng.random_range(-jitter..=jitter),
            rng.random_range(-jitter..=jitter),
        );
        let id = bones.len();
        bones.push(Bone {
            id,
            name: format!("twist{serial:02}"),
            kind: BoneKind::Detail,
            position: parent_position + offset,
            rotation: UnitQuaternion::identity(),
            parent_id: Some(parent_id),
            weight: 0.4,
        });
        serial += 1;
    }

    BoneHierarchy::from_bones(bones)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::analyzer;
    use super::*;

    fn humanoid_analysis(vertex_count: usize) -> ContainerAnalysis {
        let mut analysis = analyzer::degraded_analysis();
        analysis.vertex_count = vertex_count;
        analysis.bounding_box = BoundingBox {
            min: [-0.4, 0.0, -0.2],
            max: [0.4, 1.7, 0.2],
        };
        analysis.anatomy_flags = AnatomyFlags {
            head: true,
            torso: true,
            arms: true,
            legs: true,
        };
        analysis
    }

    fn budget(bone_count: usize) -> OptimizedBudget {
        OptimizedBudget {
            bone_count,
            morph_count: 10,
            applied_adjustments: Vec::new(),
        }
    }

    #[test]
    fn given_any_budget_then_exactly_one_root_exists() {
        for bone_count in [1usize, 5, 9, 20, 65, 120] {
            let hierarchy = synthesize(&humanoid_analysis(10_000), &budget(bone_count));
            let roots = hierarchy
                .bones()
                .iter()
                .filter(|bone| bone.parent_id.is_none())
                .count();
            assert_eq!(roots, 1, "bone_count={bone_count}");
            assert_eq!(hierarchy.len(), bone_count);
        }
    }

    #[test]
    fn given_synthesized_hierarchy_then_parent_links_terminate_at_root() {
        let hierarchy = synthesize(&humanoid_analysis(10_000), &budget(65));
        for bone in hierarchy.bones() {
            let steps = hierarchy
                .steps_to_root(bone.id)
                .expect("every bone should reach the root");
            assert!(steps <= hierarchy.len());
        }
    }

    #[test]
    fn given_synthesized_hierarchy_then_ids_are_dense_and_parents_precede_children() {
        let hierarchy = synthesize(&humanoid_analysis(10_000), &budget(40));
        for (index, bone) in hierarchy.bones().iter().enumerate() {
            assert_eq!(bone.id, index);
            if let Some(parent_id) = bone.parent_id {
                assert!(parent_id < bone.id, "forward reference on {}", bone.name);
            }
        }
    }

    #[test]
    fn given_tight_budget_then_core_bones_survive_and_detail_is_dropped() {
        let hierarchy = synthesize(&humanoid_analysis(10_000), &budget(9));
        let names: Vec<&str> = hierarchy
            .bones()
            .iter()
            .map(|bone| bone.name.as_str())
            .collect();

        // Root plus torso, head and the start of the arm chains; nothing
        // from the detail table.
        assert_eq!(
            names,
            vec![
                "root",
                "hips",
                "spine",
                "chest",
                "neck",
                "head",
                "leftShoulder",
                "leftUpperArm",
                "leftLowerArm"
            ]
        );
        assert!(
            hierarchy
                .bones()
                .iter()
                .all(|bone| bone.kind != BoneKind::Detail)
        );
    }

    #[test]
    fn given_large_budget_then_filler_fills_to_exact_count() {
        let hierarchy = synthesize(&humanoid_analysis(10_000), &budget(80));
        assert_eq!(hierarchy.len(), 80);
        assert!(
            hierarchy
                .bones()
                .iter()
                .any(|bone| bone.name.starts_with("twist"))
        );
    }

    #[test]
    fn given_no_arms_flag_then_arm_and_finger_bones_are_absent() {
        let mut analysis = humanoid_analysis(10_000);
        analysis.anatomy_flags.arms = false;
        let hierarchy = synthesize(&analysis, &budget(60));
        assert!(
            hierarchy
                .bones()
                .iter()
                .all(|bone| !bone.name.contains("Arm") && !bone.name.contains("Thumb"))
        );
    }

    #[test]
    fn given_no_anatomy_at_all_then_root_plus_twist_fill() {
        let mut analysis = humanoid_analysis(10_000);
        analysis.anatomy_flags = AnatomyFlags::default();
        let hierarchy = synthesize(&analysis, &budget(12));
        assert_eq!(hierarchy.len(), 12);
        assert_eq!(hierarchy.root().map(|bone| bone.id), Some(0));
        assert!(
            hierarchy
                .bones()
                .iter()
                .skip(1)
                .all(|bone| bone.name.starts_with("twist"))
        );
    }

    #[test]
    fn given_identical_inputs_then_hierarchy_is_deterministic() {
        let analysis = humanoid_analysis(10_000);
        let first = synthesize(&analysis, &budget(80));
        let second = synthesize(&analysis, &budget(80));
        for (a, b) in first.bones().iter().zip(second.bones().iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.parent_id, b.parent_id);
            assert!((a.position - b.position).norm() < 1e-9);
        }
    }

    #[test]
    fn given_bone_weights_then_all_are_within_unit_range() {
        let hierarchy = synthesize(&humanoid_analysis(10_000), &budget(80));
        assert!(
            hierarchy
                .bones()
                .iter()
                .all(|bone| (0.0..=1.0).contains(&bone.weight))
        );
    }
}
