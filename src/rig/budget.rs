use std::collections::HashMap;

use super::types::{ContainerAnalysis, OptimizedBudget, TierBudget};

// ─── Size model ───────────────────────────────────────────────────────────────

pub const MIB: u64 = 1024 * 1024;

/// Three 32-bit floats per vertex per morph target.
pub const MORPH_BYTES_PER_VERTEX: u64 = 12;
/// Node entry, 64-byte inverse bind matrix and weight-table slot per bone.
pub const BONE_PAYLOAD_BYTES: u64 = 384;
/// Constant floor for skin/target bookkeeping in the structural chunk.
pub const EMBED_OVERHEAD_BYTES: u64 = 256 * 1024;

/// Fraction of the tier size limit the rig itself may occupy. The
/// projected-size model deliberately excludes the preserved source scene,
/// so the remainder is reserved for it.
const RIG_ENVELOPE_RATIO: f64 = 0.85;
/// Below this fraction of the envelope the morph budget is grown back.
const REGROWTH_THRESHOLD_RATIO: f64 = 0.80;

/// Enough morphs for a minimal expression set.
pub const MIN_MORPH_TARGETS: usize = 5;
/// Enough bones for a minimal humanoid skeleton.
pub const MIN_BONES: usize = 9;

/// Default tier-independent hard ceiling. Configurable via
/// `EngineConfig::absolute_ceiling_bytes`.
pub const DEFAULT_ABSOLUTE_CEILING_BYTES: u64 = 100 * MIB;

const ADJ_MORPHS_REDUCED: &str = "MORPHS_REDUCED_FOR_SIZE";
const ADJ_BONES_REDUCED: &str = "BONES_REDUCED_FOR_SIZE";
const ADJ_MORPHS_RESTORED: &str = "MORPHS_RESTORED_UNDER_TARGET";
const ADJ_ABSOLUTE_CEILING: &str = "ABSOLUTE_CEILING_CLAMP";

/// Projected rig payload for the given counts.
pub fn projected_rig_bytes(bone_count: usize, morph_count: usize, vertex_count: usize) -> u64 {
    let morph_bytes = morph_count as u64 * vertex_count as u64 * MORPH_BYTES_PER_VERTEX;
    let bone_bytes = bone_count as u64 * BONE_PAYLOAD_BYTES;
    morph_bytes + bone_bytes + EMBED_OVERHEAD_BYTES
}

// ─── Tier provider ────────────────────────────────────────────────────────────

/// External lookup from subscription plan to tier limits. An unknown plan
/// fails the whole operation; no default budget is ever invented.
pub trait TierBudgetProvider {
    fn lookup(&self, plan_id: &str) -> Option<TierBudget>;
}

/// In-memory tier table, the single place plan limits live.
#[derive(Debug, Clone)]
pub struct StaticTierTable {
    tiers: HashMap<String, TierBudget>,
}

impl StaticTierTable {
    pub fn new() -> Self {
        Self {
            tiers: HashMap::new(),
        }
    }

    pub fn with_tier(mut self, plan_id: &str, budget: TierBudget) -> Self {
        self.tiers.insert(plan_id.to_string(), budget);
        self
    }
}

impl Default for StaticTierTable {
    fn default() -> Self {
        Self::new()
            .with_tier(
                "free",
                TierBudget {
                    max_bones: 24,
                    max_morph_targets: 12,
                    max_file_size_mb: 10,
                },
            )
            .with_tier(
                "plus",
                TierBudget {
                    max_bones: 45,
                    max_morph_targets: 40,
                    max_file_size_mb: 15,
                },
            )
            .with_tier(
                "pro",
                TierBudget {
                    max_bones: 65,
                    max_morph_targets: 100,
                    max_file_size_mb: 25,
                },
            )
            .with_tier(
                "studio",
                TierBudget {
                    max_bones: 110,
                    max_morph_targets: 160,
                    max_file_size_mb: 50,
                },
            )
    }
}

impl TierBudgetProvider for StaticTierTable {
    fn lookup(&self, plan_id: &str) -> Option<TierBudget> {
        self.tiers.get(plan_id).copied()
    }
}

// ─── Optimizer ────────────────────────────────────────────────────────────────

/// Fit the tier's nominal maxima into the size envelope.
///
/// Morphs are reduced first (they dominate size at high vertex counts),
/// then bones, each down to a floor; the morph budget is grown back when
/// the projection lands comfortably under target. A final tier-independent
/// ceiling check clamps both counts by the same scale factor. Fully
/// deterministic: identical inputs always yield identical output.
pub fn optimize(
    analysis: &ContainerAnalysis,
    tier: &TierBudget,
    absolute_ceiling_bytes: u64,
) -> OptimizedBudget {
    let vertex_count = analysis.vertex_count;
    let mut bone_count = tier.max_bones;
    let mut morph_count = tier.max_morph_targets;
    let mut applied = Vec::<String>::new();

    let envelope = (tier.max_file_size_mb as u64 * MIB) as f64 * RIG_ENVELOPE_RATIO;
    let envelope = envelope as u64;
    let per_morph = vertex_count as u64 * MORPH_BYTES_PER_VERTEX;

    if projected_rig_bytes(bone_count, morph_count, vertex_count) > envelope {
        if per_morph > 0 {
            let fixed = bone_count as u64 * BONE_PAYLOAD_BYTES + EMBED_OVERHEAD_BYTES;
            let fits = (envelope.saturating_sub(fixed) / per_morph) as usize;
            let floor = MIN_MORPH_TARGETS.min(morph_count);
            let reduced = fits.clamp(floor, morph_count);
            if reduced < morph_count {
                tracing::debug!(from = morph_count, to = reduced, "reducing morph targets");
                morph_count = reduced;
                applied.push(ADJ_MORPHS_REDUCED.to_string());
            }
        }

        if projected_rig_bytes(bone_count, morph_count, vertex_count) > envelope {
            let fixed = morph_count as u64 * per_morph + EMBED_OVERHEAD_BYTES;
            let fits = (envelope.saturating_sub(fixed) / BONE_PAYLOAD_BYTES) as usize;
            let floor = MIN_BONES.min(bone_count);
            let reduced = fits.clamp(floor, bone_count);
            if reduced < bone_count {
                tracing::debug!(from = bone_count, to = reduced, "reducing bones");
                bone_count = reduced;
                applied.push(ADJ_BONES_REDUCED.to_string());
            }
        }
    }

    let regrowth_threshold = (envelope as f64 * REGROWTH_THRESHOLD_RATIO) as u64;
    if projected_rig_bytes(bone_count, morph_count, vertex_count) < regrowth_threshold
        && morph_count < tier.max_morph_targets
        && per_morph > 0
    {
        let fixed = bone_count as u64 * BONE_PAYLOAD_BYTES + EMBED_OVERHEAD_BYTES;
        let fits = (envelope.saturating_sub(fixed) / per_morph) as usize;
        let restored = fits.min(tier.max_morph_targets);
        if restored > morph_count {
            tracing::debug!(from = morph_count, to = restored, "restoring morph targets");
            morph_count = restored;
            applied.push(ADJ_MORPHS_RESTORED.to_string());
        }
    }

    // Tier-independent hard ceiling: both counts shrink by the same factor.
    if projected_rig_bytes(bone_count, morph_count, vertex_count) > absolute_ceiling_bytes {
        let payload = morph_count as u64 * per_morph + bone_count as u64 * BONE_PAYLOAD_BYTES;
        let available = absolute_ceiling_bytes.saturating_sub(EMBED_OVERHEAD_BYTES);
        let scale = if payload > 0 {
            available as f64 / payload as f64
        } else {
            0.0
        };
        morph_count = (morph_count as f64 * scale).floor() as usize;
        bone_count = ((bone_count as f64 * scale).floor() as usize).max(1);

        while projected_rig_bytes(bone_count, morph_count, vertex_count) > absolute_ceiling_bytes
            && morph_count > 0
        {
            morph_count -= 1;
        }
        if projected_rig_bytes(bone_count, morph_count, vertex_count) > absolute_ceiling_bytes {
            bone_count = 1;
        }

        applied.push(ADJ_ABSOLUTE_CEILING.to_string());
        tracing::debug!(bone_count, morph_count, "clamped to absolute ceiling");
    }

    OptimizedBudget {
        bone_count,
        morph_count,
        applied_adjustments: applied,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
