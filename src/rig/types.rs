use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ─── Bone placement tables ────────────────────────────────────────────────────

/// One synthesized bone: name, parent name and a normalized placement.
///
/// Placements are bounding-box fractions: `x`/`z` relative to the box center
/// (in width/depth units), `y` from the box floor (in height units). The
/// synthesizer maps them to world space against the analyzed bounds.
#[derive(Debug, Clone, Copy)]
pub(super) struct BoneSpec {
    pub(super) name: &'static str,
    pub(super) parent: &'static str,
    pub(super) kind: BoneKind,
    pub(super) placement: [f32; 3],
}

/// Name of the single root bone every hierarchy starts with.
pub const ROOT_BONE_NAME: &str = "root";

/// Torso chain, emitted first after the root.
pub(super) const TORSO_CHAIN: [BoneSpec; 3] = [
    BoneSpec {
        name: "hips",
        parent: ROOT_BONE_NAME,
        kind: BoneKind::Spine,
        placement: [0.0, 0.55, 0.0],
    },
    BoneSpec {
        name: "spine",
        parent: "hips",
        kind: BoneKind::Spine,
        placement: [0.0, 0.65, 0.0],
    },
    BoneSpec {
        name: "chest",
        parent: "spine",
        kind: BoneKind::Spine,
        placement: [0.0, 0.75, 0.0],
    },
];

/// Neck/head chain, emitted after the torso.
pub(super) const HEAD_CHAIN: [BoneSpec; 2] = [
    BoneSpec {
        name: "neck",
        parent: "chest",
        kind: BoneKind::Head,
        placement: [0.0, 0.85, 0.0],
    },
    BoneSpec {
        name: "head",
        parent: "neck",
        kind: BoneKind::Head,
        placement: [0.0, 0.92, 0.0],
    },
];

/// Shoulder-to-hand chains, left then right.
pub(super) const ARM_CHAINS: [BoneSpec; 8] = [
    BoneSpec {
        name: "leftShoulder",
        parent: "chest",
        kind: BoneKind::Arm,
        placement: [-0.08, 0.82, 0.0],
    },
    BoneSpec {
        name: "leftUpperArm",
        parent: "leftShoulder",
        kind: BoneKind::Arm,
        placement: [-0.18, 0.80, 0.0],
    },
    BoneSpec {
        name: "leftLowerArm",
        parent: "leftUpperArm",
        kind: BoneKind::Arm,
        placement: [-0.33, 0.80, 0.0],
    },
    BoneSpec {
        name: "leftHand",
        parent: "leftLowerArm",
        kind: BoneKind::Arm,
        placement: [-0.47, 0.80, 0.0],
    },
    BoneSpec {
        name: "rightShoulder",
        parent: "chest",
        kind: BoneKind::Arm,
        placement: [0.08, 0.82, 0.0],
    },
    BoneSpec {
        name: "rightUpperArm",
        parent: "rightShoulder",
        kind: BoneKind::Arm,
        placement: [0.18, 0.80, 0.0],
    },
    BoneSpec {
        name: "rightLowerArm",
        parent: "rightUpperArm",
        kind: BoneKind::Arm,
        placement: [0.33, 0.80, 0.0],
    },
    BoneSpec {
        name: "rightHand",
        parent: "rightLowerArm",
        kind: BoneKind::Arm,
        placement: [0.47, 0.80, 0.0],
    },
];

/// Hip-to-foot chains, left then right.
pub(super) const LEG_CHAINS: [BoneSpec; 6] = [
    BoneSpec {
        name: "leftUpperLeg",
        parent: "hips",
        kind: BoneKind::Leg,
        placement: [-0.09, 0.50, 0.0],
    },
    BoneSpec {
        name: "leftLowerLeg",
        parent: "leftUpperLeg",
        kind: BoneKind::Leg,
        placement: [-0.09, 0.27, 0.0],
    },
    BoneSpec {
        name: "leftFoot",
        parent: "leftLowerLeg",
        kind: BoneKind::Leg,
        placement: [-0.09, 0.04, 0.05],
    },
    BoneSpec {
        name: "rightUpperLeg",
        parent: "hips",
        kind: BoneKind::Leg,
        placement: [0.09, 0.50, 0.0],
    },
    BoneSpec {
        name: "rightLowerLeg",
        parent: "rightUpperLeg",
        kind: BoneKind::Leg,
        placement: [0.09, 0.27, 0.0],
    },
    BoneSpec {
        name: "rightFoot",
        parent: "rightLowerLeg",
        kind: BoneKind::Leg,
        placement: [0.09, 0.04, 0.05],
    },
];

/// Anatomy gate a detail bone depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DetailGate {
    Head,
    Arms,
    Legs,
    Torso,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct DetailBoneSpec {
    pub(super) name: &'static str,
    pub(super) parent: &'static str,
    pub(super) gate: DetailGate,
    pub(super) placement: [f32; 3],
}

/// Detail bones in fill priority order: facial detail, then finger chains,
/// then spine subdivision, then toes. A tight budget drops from the end of
/// this table first and never touches the anatomical chains above.
pub(super) const DETAIL_BONES: [DetailBoneSpec; 36] = [
    DetailBoneSpec {
        name: "leftEye",
        parent: "head",
        gate: DetailGate::Head,
        placement: [-0.03, 0.94, 0.06],
    },
    DetailBoneSpec {
        name: "rightEye",
        parent: "head",
        gate: DetailGate::Head,
        placement: [0.03, 0.94, 0.06],
    },
    DetailBoneSpec {
        name: "jaw",
        parent: "head",
        gate: DetailGate::Head,
        placement: [0.0, 0.90, 0.05],
    },
    DetailBoneSpec {
        name: "leftThumbProximal",
        parent: "leftHand",
        gate: DetailGate::Arms,
        placement: [-0.49, 0.80, 0.04],
    },
    DetailBoneSpec {
        name: "leftThumbIntermediate",
        parent: "leftThumbProximal",
        gate: DetailGate::Arms,
        placement: [-0.51, 0.80, 0.05],
    },
    DetailBoneSpec {
        name: "leftThumbDistal",
        parent: "leftThumbIntermediate",
        gate: DetailGate::Arms,
        placement: [-0.53, 0.80, 0.06],
    },
    DetailBoneSpec {
        name: "leftIndexProximal",
        parent: "leftHand",
        gate: DetailGate::Arms,
        placement: [-0.50, 0.80, 0.02],
    },
    DetailBoneSpec {
        name: "leftIndexIntermediate",
        parent: "leftIndexProximal",
        gate: DetailGate::Arms,
        placement: [-0.52, 0.80, 0.02],
    },
    DetailBoneSpec {
        name: "leftIndexDistal",
        parent: "leftIndexIntermediate",
        gate: DetailGate::Arms,
        placement: [-0.54, 0.80, 0.02],
    },
    DetailBoneSpec {
        name: "leftMiddleProximal",
        parent: "leftHand",
        gate: DetailGate::Arms,
        placement: [-0.50, 0.80, 0.0],
    },
    DetailBoneSpec {
        name: "leftMiddleIntermediate",
        parent: "leftMiddleProximal",
        gate: DetailGate::Arms,
        placement: [-0.52, 0.80, 0.0],
    },
    DetailBoneSpec {
        name: "leftMiddleDistal",
        parent: "leftMiddleIntermediate",
        gate: DetailGate::Arms,
        placement: [-0.54, 0.80, 0.0],
    },
    DetailBoneSpec {
        name: "leftRingProximal",
        parent: "leftHand",
        gate: DetailGate::Arms,
        placement: [-0.50, 0.80, -0.02],
    },
    DetailBoneSpec {
        name: "leftRingIntermediate",
        parent: "leftRingProximal",
        gate: DetailGate::Arms,
        placement: [-0.52, 0.80, -0.02],
    },
    DetailBoneSpec {
        name: "leftRingDistal",
        parent: "leftRingIntermediate",
        gate: DetailGate::Arms,
        placement: [-0.54, 0.80, -0.02],
    },
    DetailBoneSpec {
        name: "leftLittleProximal",
        parent: "leftHand",
        gate: DetailGate::Arms,
        placement: [-0.50, 0.80, -0.04],
    },
    DetailBoneSpec {
        name: "leftLittleIntermediate",
        parent: "leftLittleProximal",
        gate: DetailGate::Arms,
        placement: [-0.52, 0.80, -0.04],
    },
    DetailBoneSpec {
        name: "leftLittleDistal",
        parent: "leftLittleIntermediate",
        gate: DetailGate::Arms,
        placement: [-0.54, 0.80, -0.04],
    },
    DetailBoneSpec {
        name: "rightThumbProximal",
        parent: "rightHand",
        gate: DetailGate::Arms,
        placement: [0.49, 0.80, 0.04],
    },
    DetailBoneSpec {
        name: "rightThumbIntermediate",
        parent: "rightThumbProximal",
        gate: DetailGate::Arms,
        placement: [0.51, 0.80, 0.05],
    },
    DetailBoneSpec {
        name: "rightThumbDistal",
        parent: "rightThumbIntermediate",
        gate: DetailGate::Arms,
        placement: [0.53, 0.80, 0.06],
    },
    DetailBoneSpec {
        name: "rightIndexProximal",
        parent: "rightHand",
        gate: DetailGate::Arms,
        placement: [0.50, 0.80, 0.02],
    },
    DetailBoneSpec {
        name: "rightIndexIntermediate",
        parent: "rightIndexProximal",
        gate: DetailGate::Arms,
        placement: [0.52, 0.80, 0.02],
    },
    DetailBoneSpec {
        name: "rightIndexDistal",
        parent: "rightIndexIntermediate",
        gate: DetailGate::Arms,
        placement: [0.54, 0.80, 0.02],
    },
    DetailBoneSpec {
        name: "rightMiddleProximal",
        parent: "rightHand",
        gate: DetailGate::Arms,
        placement: [0.50, 0.80, 0.0],
    },
    DetailBoneSpec {
        name: "rightMiddleIntermediate",
        parent: "rightMiddleProximal",
        gate: DetailGate::Arms,
        placement: [0.52, 0.80, 0.0],
    },
    DetailBoneSpec {
        name: "rightMiddleDistal",
        parent: "rightMiddleIntermediate",
        gate: DetailGate::Arms,
        placement: [0.54, 0.80, 0.0],
    },
    DetailBoneSpec {
        name: "rightRingProximal",
        parent: "rightHand",
        gate: DetailGate::Arms,
        placement: [0.50, 0.80, -0.02],
    },
    DetailBoneSpec {
        name: "rightRingIntermediate",
        parent: "rightRingProximal",
        gate: DetailGate::Arms,
        placement: [0.52, 0.80, -0.02],
    },
    DetailBoneSpec {
        name: "rightRingDistal",
        parent: "rightRingIntermediate",
        gate: DetailGate::Arms,
        placement: [0.54, 0.80, -0.02],
    },
    DetailBoneSpec {
        name: "rightLittleProximal",
        parent: "rightHand",
        gate: DetailGate::Arms,
        placement: [0.50, 0.80, -0.04],
    },
    DetailBoneSpec {
        name: "rightLittleIntermediate",
        parent: "rightLittleProximal",
        gate: DetailGate::Arms,
        placement: [0.52, 0.80, -0.04],
    },
    DetailBoneSpec {
        name: "rightLittleDistal",
        parent: "rightLittleIntermediate",
        gate: DetailGate::Arms,
        placement: [0.54, 0.80, -0.04],
    },
    DetailBoneSpec {
        name: "upperChest",
        parent: "chest",
        gate: DetailGate::Torso,
        placement: [0.0, 0.79, 0.0],
    },
    DetailBoneSpec {
        name: "leftToes",
        parent: "leftFoot",
        gate: DetailGate::Legs,
        placement: [-0.09, 0.01, 0.09],
    },
    DetailBoneSpec {
        name: "rightToes",
        parent: "rightFoot",
        gate: DetailGate::Legs,
        placement: [0.09, 0.01, 0.09],
    },
];

// ─── Morph name tables ────────────────────────────────────────────────────────

/// Facial expression and viseme names, spent first (bounded at 60% of the
/// morph budget).
pub(super) const FACIAL_MORPH_NAMES: [&str; 28] = [
    "neutral",
    "happy",
    "angry",
    "sad",
    "relaxed",
    "surprised",
    "aa",
    "ih",
    "ou",
    "ee",
    "oh",
    "blink",
    "blinkLeft",
    "blinkRight",
    "lookUp",
    "lookDown",
    "lookLeft",
    "lookRight",
    "browInnerUp",
    "browDownLeft",
    "browDownRight",
    "cheekPuff",
    "mouthSmileLeft",
    "mouthSmileRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "jawOpen",
    "tongueOut",
];

/// Body-correction target names (25% of the morph budget).
pub(super) const BODY_MORPH_NAMES: [&str; 12] = [
    "muscular",
    "slim",
    "heavy",
    "broadShoulders",
    "narrowWaist",
    "longTorso",
    "shortTorso",
    "longLegs",
    "shortLegs",
    "bustSize",
    "hipWidth",
    "neckThickness",
];

/// Generic corrective names (remaining 15% of the morph budget).
pub(super) const CORRECTIVE_MORPH_NAMES: [&str; 8] = [
    "elbowCorrectiveLeft",
    "elbowCorrectiveRight",
    "kneeCorrectiveLeft",
    "kneeCorrectiveRight",
    "shoulderCorrectiveLeft",
    "shoulderCorrectiveRight",
    "hipCorrectiveLeft",
    "hipCorrectiveRight",
];

// ─── Analysis types ───────────────────────────────────────────────────────────

/// Severity level used by analysis issues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single issue produced during structural analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

/// Axis-aligned bounds of the analyzed scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    /// Unit cube centered at the origin, the default when the container
    /// declares no extents.
    pub fn unit_cube() -> Self {
        Self {
            min: [-0.5, -0.5, -0.5],
            max: [0.5, 0.5, 0.5],
        }
    }

    /// Grow these bounds to also cover `[min, max]`.
    pub fn expand(&mut self, min: &[f32; 3], max: &[f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(min[axis]);
            self.max[axis] = self.max[axis].max(max[axis]);
        }
    }

    pub fn width(&self) -> f32 {
        (self.max[0] - self.min[0]).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.max[1] - self.min[1]).max(0.0)
    }

    pub fn depth(&self) -> f32 {
        (self.max[2] - self.min[2]).max(0.0)
    }

    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }
}

/// Anatomy regions detected in the source model. Each flag gates the
/// corresponding bone chains during synthesis.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AnatomyFlags {
    pub head: bool,
    pub torso: bool,
    pub arms: bool,
    pub legs: bool,
}

/// Per-mesh summary from the structural chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshSummary {
    pub name: Option<String>,
    pub primitive_count: usize,
    pub vertex_count: usize,
}

/// Read-only result of structural analysis, derived once per input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerAnalysis {
    pub vertex_count: usize,
    pub mesh_summaries: Vec<MeshSummary>,
    pub material_count: usize,
    pub has_existing_skeleton: bool,
    pub has_animations: bool,
    pub bounding_box: BoundingBox,
    /// Geometric humanoid-likelihood score in `[0, 1]`.
    pub humanoid_confidence: f32,
    pub anatomy_flags: AnatomyFlags,
    pub issues: Vec<ValidationIssue>,
}

// ─── Budget types ─────────────────────────────────────────────────────────────

/// Per-subscription-tier resource limits. Upper bounds, never exceeded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierBudget {
    pub max_bones: usize,
    pub max_morph_targets: usize,
    /// Output size limit in MiB.
    pub max_file_size_mb: u32,
}

/// Concrete bone/morph counts fitted to the tier's size envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedBudget {
    pub bone_count: usize,
    pub morph_count: usize,
    /// Names of every adjustment the optimizer applied, in order.
    pub applied_adjustments: Vec<String>,
}

// ─── Rig types ────────────────────────────────────────────────────────────────

/// Coarse bone grouping used for influence weights and fill priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoneKind {
    Root,
    Spine,
    Head,
    Arm,
    Leg,
    Detail,
}

/// A single bone in a synthesized hierarchy.
#[derive(Debug, Clone)]
pub struct Bone {
    /// Dense id starting at 0; parents always precede children.
    pub id: usize,
    pub name: String,
    pub kind: BoneKind,
    /// World-space position.
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    /// `None` exactly once per hierarchy, on the root.
    pub parent_id: Option<usize>,
    /// Influence weight in `[0, 1]`.
    pub weight: f32,
}

/// Rooted bone tree. Build-once: consumed by serialization, never mutated
/// after synthesis completes.
#[derive(Debug, Clone)]
pub struct BoneHierarchy {
    bones: Vec<Bone>,
}

impl BoneHierarchy {
    pub(super) fn from_bones(bones: Vec<Bone>) -> Self {
        Self { bones }
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn root(&self) -> Option<&Bone> {
        self.bones.iter().find(|bone| bone.parent_id.is_none())
    }

    /// Child ids of `id`, derived from parent links so the two views can
    /// never diverge.
    pub fn children_of(&self, id: usize) -> Vec<usize> {
        self.bones
            .iter()
            .filter(|bone| bone.parent_id == Some(id))
            .map(|bone| bone.id)
            .collect()
    }

    /// Number of parent-link steps from `id` to the root, or `None` when a
    /// link is dangling or cyclic.
    pub fn steps_to_root(&self, id: usize) -> Option<usize> {
        let mut current = self.bones.get(id)?;
        let mut steps = 0usize;
        while let Some(parent_id) = current.parent_id {
            steps += 1;
            if steps > self.bones.len() {
                return None;
            }
            current = self.bones.get(parent_id)?;
        }
        Some(steps)
    }
}

/// Deformation-target category, in budget-allocation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MorphCategory {
    Facial,
    Body,
    Corrective,
}

/// A named set of per-vertex position offsets. Immutable once produced;
/// `vertex_deltas.len()` always equals the analysis vertex count.
#[derive(Debug, Clone)]
pub struct MorphTarget {
    pub name: String,
    pub category: MorphCategory,
    pub vertex_deltas: Vec<[f32; 3]>,
    /// Default blend weight in `[0, 1]`.
    pub weight: f32,
}

/// How the rig was written back into the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbedStrategy {
    /// The structural chunk was rewritten in place; untouched payload bytes
    /// are preserved exactly.
    Structural,
    /// The original bytes were kept verbatim and the rig appended after
    /// them with a trailing descriptor.
    SafeAppend,
}

/// Byte and count statistics for one completed rigging run.
#[derive(Debug, Clone, Serialize)]
pub struct RigStatistics {
    pub original_size: usize,
    pub rigged_size: usize,
    pub bone_count: usize,
    pub morph_count: usize,
    pub processing_time_ms: u64,
}

/// Final artifact returned to the caller, owned by the caller after return.
#[derive(Debug)]
pub struct RigResult {
    pub rigged_bytes: Vec<u8>,
    pub bones: BoneHierarchy,
    pub morph_targets: Vec<MorphTarget>,
    pub strategy: EmbedStrategy,
    pub statistics: RigStatistics,
}
