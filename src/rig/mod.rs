pub mod analyzer;
pub mod bones;
pub mod budget;
pub mod classifier;
pub mod codec;
pub mod embedder;
pub mod morphs;
mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::RigError;

pub use budget::{StaticTierTable, TierBudgetProvider};
pub use classifier::{Classifier, ClassifierScore};
pub use codec::{ContainerDocument, ParseError};
pub use types::{
    AnatomyFlags, Bone, BoneHierarchy, BoneKind, BoundingBox, ContainerAnalysis, EmbedStrategy,
    MeshSummary, MorphCategory, MorphTarget, OptimizedBudget, RigResult, RigStatistics, Severity,
    TierBudget, ValidationIssue,
};

// ─── Engine configuration ─────────────────────────────────────────────────────

/// Deployment-level knobs, independent of any subscription tier.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard projected-size ceiling applied after every tier envelope.
    pub absolute_ceiling_bytes: u64,
    /// Deadline for the single classifier attempt per invocation.
    pub classifier_deadline: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            absolute_ceiling_bytes: budget::DEFAULT_ABSOLUTE_CEILING_BYTES,
            classifier_deadline: Duration::from_millis(1500),
        }
    }
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────

/// Run the full auto-rigging pipeline on one container.
///
/// Parse → analyze → optimize → synthesize → embed, as a single synchronous
/// computation owning all of its intermediate state. A malformed container
/// degrades to append-only embedding; an unknown plan or a serialization
/// invariant violation is surfaced as an error.
#[tracing::instrument(skip_all, fields(plan = plan_id, input_size = bytes.len()))]
pub fn rig_container(
    bytes: &[u8],
    plan_id: &str,
    provider: &dyn TierBudgetProvider,
    classifier: Option<&Arc<dyn Classifier>>,
    config: &EngineConfig,
) -> Result<RigResult, RigError> {
    let started = Instant::now();

    let tier = provider
        .lookup(plan_id)
        .ok_or_else(|| RigError::BudgetNotFound(plan_id.to_string()))?;

    if bytes.len() < codec::HEADER_LEN {
        return Err(RigError::ContainerTooSmall {
            actual: bytes.len(),
        });
    }

    let document = match codec::parse(bytes) {
        Ok(document) => Some(document),
        Err(err) => {
            tracing::warn!(%err, "container did not parse, the rig will be appended");
            None
        }
    };

    let mut analysis = match &document {
        Some(document) => analyzer::analyze(document),
        None => analyzer::degraded_analysis(),
    };

    if let Some(classifier) = classifier {
        let descriptor = classifier::build_descriptor(&analysis);
        if let Some(score) =
            classifier::score_with_deadline(classifier, &descriptor, config.classifier_deadline)
        {
            analyzer::apply_classifier_score(&mut analysis, &score);
        }
    }

    let optimized = budget::optimize(&analysis, &tier, config.absolute_ceiling_bytes);
    let hierarchy = bones::synthesize(&analysis, &optimized);
    let morph_targets = morphs::synthesize(&analysis, &optimized);

    let (rigged_bytes, strategy) = embedder::embed(bytes, document, &hierarchy, &morph_targets)?;

    let statistics = RigStatistics {
        original_size: bytes.len(),
        rigged_size: rigged_bytes.len(),
        bone_count: hierarchy.len(),
        morph_count: morph_targets.len(),
        processing_time_ms: started.elapsed().as_millis() as u64,
    };

    tracing::info!(
        strategy = ?strategy,
        bone_count = statistics.bone_count,
        morph_count = statistics.morph_count,
        rigged_size = statistics.rigged_size,
        "rigging complete"
    );

    Ok(RigResult {
        rigged_bytes,
        bones: hierarchy,
        morph_targets,
        strategy,
        statistics,
    })
}

/// Parse and analyze a container without rigging it.
pub fn analyze_container(bytes: &[u8]) -> Result<ContainerAnalysis, ParseError> {
    codec::parse(bytes).map(|document| analyzer::analyze(&document))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    /// A character container with the given vertex count split across two
    /// unnamed meshes, with declared extents and surface attributes.
    fn character_container(vertex_count: usize) -> Vec<u8> {
        let body_vertices = vertex_count / 2;
        let face_vertices = vertex_count - body_vertices;
        let document = ContainerDocument {
            json: json!({
                "asset": {"version": "2.0"},
                "scenes": [{"nodes": [0, 1]}],
                "scene": 0,
                "nodes": [{"mesh": 0}, {"mesh": 1}],
                "meshes": [
                    {"primitives": [{"attributes": {"POSITION": 0, "NORMAL": 1, "TEXCOORD_0": 2}}]},
                    {"primitives": [{"attributes": {"POSITION": 3, "NORMAL": 4, "TEXCOORD_0": 5}}]}
                ],
                "accessors": [
                    {"componentType": 5126, "count": body_vertices, "type": "VEC3",
                     "min": [-0.4, 0.0, -0.2], "max": [0.4, 1.4, 0.2]},
                    {"componentType": 5126, "count": body_vertices, "type": "VEC3"},
                    {"componentType": 5126, "count": body_vertices, "type": "VEC2"},
                    {"componentType": 5126, "count": face_vertices, "type": "VEC3",
                     "min": [-0.12, 1.4, -0.12], "max": [0.12, 1.7, 0.12]},
                    {"componentType": 5126, "count": face_vertices, "type": "VEC3"},
                    {"componentType": 5126, "count": face_vertices, "type": "VEC2"}
                ],
                "materials": [{"name": "skin"}, {"name": "cloth"}]
            }),
            bin: None,
        };
        codec::serialize(&document).expect("fixture should serialize")
    }

    #[test]
    fn given_unknown_plan_then_budget_not_found_is_surfaced() {
        let bytes = character_container(100);
        let result = rig_container(
            &bytes,
            "enterprise",
            &StaticTierTable::default(),
            None,
            &EngineConfig::default(),
        );
        assert!(matches!(result, Err(RigError::BudgetNotFound(plan)) if plan == "enterprise"));
    }

    #[test]
    fn given_buffer_below_header_size_then_operation_fails() {
        let result = rig_container(
            &[0u8; 4],
            "pro",
            &StaticTierTable::default(),
            None,
            &EngineConfig::default(),
        );
        assert!(matches!(
            result,
            Err(RigError::ContainerTooSmall { actual: 4 })
        ));
    }

    #[test]
    fn given_20k_vertex_container_on_pro_tier_then_scenario_holds() {
        let bytes = character_container(20_000);
        let result = rig_container(
            &bytes,
            "pro",
            &StaticTierTable::default(),
            None,
            &EngineConfig::default(),
        )
        .expect("pipeline should succeed");

        // The pro tier allows 100 morph targets, but 100 × 20000 × 12 bytes
        // alone crowds the 25MiB envelope, so morphs shrink while all 65
        // bones survive.
        assert_eq!(result.statistics.bone_count, 65);
        assert!(result.statistics.morph_count < 100);
        assert!(result.statistics.morph_count >= budget::MIN_MORPH_TARGETS);

        assert_eq!(result.strategy, EmbedStrategy::Structural);
        assert!(result.statistics.rigged_size > result.statistics.original_size);

        let reanalysis = analyze_container(&result.rigged_bytes)
            .expect("rigged container must re-parse");
        assert_eq!(reanalysis.vertex_count, 20_000);
    }

    #[test]
    fn given_wrong_magic_then_append_strategy_preserves_original_prefix() {
        let mut bytes = character_container(1_000);
        bytes[0] = b'?';

        let result = rig_container(
            &bytes,
            "free",
            &StaticTierTable::default(),
            None,
            &EngineConfig::default(),
        )
        .expect("pipeline should degrade, not fail");

        assert_eq!(result.strategy, EmbedStrategy::SafeAppend);
        assert!(result.rigged_bytes.len() > bytes.len());
        assert_eq!(&result.rigged_bytes[..bytes.len()], &bytes[..]);
    }

    #[test]
    fn given_round_trip_with_no_rig_then_analysis_is_unchanged() {
        let bytes = character_container(5_000);
        let document = codec::parse(&bytes).expect("fixture should parse");
        let before = analyzer::analyze(&document);

        let reserialized = codec::serialize(&document).expect("serialize should succeed");
        let after = analyze_container(&reserialized).expect("round trip should parse");

        assert_eq!(before.vertex_count, after.vertex_count);
        assert_eq!(before.mesh_summaries.len(), after.mesh_summaries.len());
        assert_eq!(before.bounding_box, after.bounding_box);
    }

    #[test]
    fn given_rigged_output_then_hierarchy_is_a_valid_tree() {
        let bytes = character_container(8_000);
        let result = rig_container(
            &bytes,
            "plus",
            &StaticTierTable::default(),
            None,
            &EngineConfig::default(),
        )
        .expect("pipeline should succeed");

        let roots = result
            .bones
            .bones()
            .iter()
            .filter(|bone| bone.parent_id.is_none())
            .count();
        assert_eq!(roots, 1);
        for bone in result.bones.bones() {
            let steps = result
                .bones
                .steps_to_root(bone.id)
                .expect("every bone must reach the root");
            assert!(steps <= result.bones.len());
        }
    }

    #[test]
    fn given_rigged_output_then_every_morph_matches_vertex_count() {
        let bytes = character_container(3_000);
        let result = rig_container(
            &bytes,
            "plus",
            &StaticTierTable::default(),
            None,
            &EngineConfig::default(),
        )
        .expect("pipeline should succeed");

        for morph in &result.morph_targets {
            assert_eq!(morph.vertex_deltas.len(), 3_000);
        }
    }

    #[test]
    fn given_structural_embed_then_skin_and_targets_appear_in_output() {
        let bytes = character_container(2_000);
        let result = rig_container(
            &bytes,
            "free",
            &StaticTierTable::default(),
            None,
            &EngineConfig::default(),
        )
        .expect("pipeline should succeed");

        let document = codec::parse(&result.rigged_bytes).expect("output must re-parse");
        let skins = document
            .json
            .get("skins")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        assert_eq!(skins.len(), 1);

        let target_count = document
            .json
            .pointer("/meshes/0/primitives/0/targets")
            .and_then(Value::as_array)
            .map(|targets| targets.len())
            .unwrap_or(0);
        assert_eq!(target_count, result.statistics.morph_count);
    }

    #[test]
    fn given_classifier_available_then_result_shape_is_identical() {
        struct UpbeatClassifier;
        impl Classifier for UpbeatClassifier {
            fn score(&self, _descriptor: &str) -> Option<ClassifierScore> {
                Some(ClassifierScore {
                    label: "humanoid".to_string(),
                    confidence: 0.99,
                })
            }
        }

        let bytes = character_container(2_000);
        let table = StaticTierTable::default();
        let config = EngineConfig::default();
        let classifier: Arc<dyn Classifier> = Arc::new(UpbeatClassifier);

        let with = rig_container(&bytes, "free", &table, Some(&classifier), &config)
            .expect("pipeline should succeed");
        let without =
            rig_container(&bytes, "free", &table, None, &config).expect("pipeline should succeed");

        assert_eq!(with.statistics.bone_count, without.statistics.bone_count);
        assert_eq!(with.statistics.morph_count, without.statistics.morph_count);
        assert_eq!(with.strategy, without.strategy);
    }

    #[test]
    fn given_identical_input_then_rigged_bytes_are_identical() {
        let bytes = character_container(2_500);
        let table = StaticTierTable::default();
        let config = EngineConfig::default();

        let first =
            rig_container(&bytes, "plus", &table, None, &config).expect("pipeline should succeed");
        let second =
            rig_container(&bytes, "plus", &table, None, &config).expect("pipeline should succeed");
        assert_eq!(first.rigged_bytes, second.rigged_bytes);
    }
}
