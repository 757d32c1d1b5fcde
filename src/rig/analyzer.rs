use serde_json::Value;

use super::classifier::ClassifierScore;
use super::codec::ContainerDocument;
use super::types::{
    AnatomyFlags, BoundingBox, ContainerAnalysis, MeshSummary, Severity, ValidationIssue,
};

// ─── Humanoid signal constants ────────────────────────────────────────────────

/// Height-to-width range a standing character plausibly falls into.
const HUMANOID_ASPECT_MIN: f32 = 1.4;
const HUMANOID_ASPECT_MAX: f32 = 4.0;
/// Vertex range of a "detailed character" mesh.
const DETAILED_VERTEX_MIN: usize = 2_000;
const DETAILED_VERTEX_MAX: usize = 400_000;
/// Per-primitive vertex count beyond which downstream tooling struggles.
const PRIMITIVE_VERTEX_LIMIT: usize = 65_535;

/// Fixed signal weights; the four sum to exactly 1.0 so the score is
/// bounded in [0, 1] without any external service.
const WEIGHT_ASPECT: f32 = 0.3;
const WEIGHT_VERTEX_RANGE: f32 = 0.25;
const WEIGHT_MULTI_MESH: f32 = 0.2;
const WEIGHT_ATTRIBUTES: f32 = 0.25;

/// Classifier labels accepted as evidence of a humanoid subject.
const HUMANOID_LABELS: [&str; 4] = ["humanoid", "character", "person", "avatar"];
/// Classifier confidence above which anatomy flags are granted wholesale.
const CLASSIFIER_FLAG_THRESHOLD: f32 = 0.7;

// ─── Accessor helpers ─────────────────────────────────────────────────────────

fn accessor(json: &Value, index: usize) -> Option<&Value> {
    json.get("accessors")?.as_array()?.get(index)
}

fn accessor_count(json: &Value, index: usize) -> usize {
    accessor(json, index)
        .and_then(|accessor| accessor.get("count"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}

fn accessor_extents(json: &Value, index: usize) -> Option<([f32; 3], [f32; 3])> {
    let accessor = accessor(json, index)?;
    let read = |key: &str| -> Option<[f32; 3]> {
        let values = accessor.get(key)?.as_array()?;
        if values.len() != 3 {
            return None;
        }
        Some([
            values[0].as_f64()? as f32,
            values[1].as_f64()? as f32,
            values[2].as_f64()? as f32,
        ])
    };
    Some((read("min")?, read("max")?))
}

fn attribute_accessor_index(primitive: &Value, attribute: &str) -> Option<usize> {
    primitive
        .get("attributes")?
        .get(attribute)?
        .as_u64()
        .map(|value| value as usize)
}

fn section_len(json: &Value, key: &str) -> usize {
    json.get(key)
        .and_then(Value::as_array)
        .map(|entries| entries.len())
        .unwrap_or(0)
}

// ─── Analysis ─────────────────────────────────────────────────────────────────

/// Derive the read-only structural analysis from a parsed container.
///
/// Missing sections and attributes contribute zeros rather than failing;
/// anything suspicious is recorded as an issue on the analysis instead.
pub fn analyze(document: &ContainerDocument) -> ContainerAnalysis {
    let json = &document.json;
    let mut issues = Vec::<ValidationIssue>::new();

    let mut mesh_summaries = Vec::<MeshSummary>::new();
    let mut vertex_count = 0usize;
    let mut bounding_box: Option<BoundingBox> = None;
    let mut has_surface_attributes = false;

    if let Some(meshes) = json.get("meshes").and_then(Value::as_array) {
        for (mesh_index, mesh) in meshes.iter().enumerate() {
            let mesh_name = mesh
                .get("name")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned);
            let primitives = mesh
                .get("primitives")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let mut mesh_vertices = 0usize;
            for (primitive_index, primitive) in primitives.iter().enumerate() {
                let Some(position_accessor) = attribute_accessor_index(primitive, "POSITION")
                else {
                    issues.push(ValidationIssue {
                        severity: Severity::Warning,
                        code: "MISSING_POSITION_ATTRIBUTE".to_string(),
                        message: format!(
                            "mesh {mesh_index} primitive {primitive_index} has no position attribute and contributes no vertices"
                        ),
                    });
                    continue;
                };

                let primitive_vertices = accessor_count(json, position_accessor);
                mesh_vertices += primitive_vertices;

                if primitive_vertices > PRIMITIVE_VERTEX_LIMIT {
                    issues.push(ValidationIssue {
                        severity: Severity::Warning,
                        code: "VERTEX_LIMIT_EXCEEDED".to_string(),
                        message: format!(
                            "mesh {mesh_index} primitive {primitive_index} has {primitive_vertices} vertices (limit: {PRIMITIVE_VERTEX_LIMIT})"
                        ),
                    });
                }

                if let Some((min, max)) = accessor_extents(json, position_accessor) {
                    match bounding_box.as_mut() {
                        Some(bbox) => bbox.expand(&min, &max),
                        None => bounding_box = Some(BoundingBox { min, max }),
                    }
                }

                if attribute_accessor_index(primitive, "NORMAL").is_some()
                    && attribute_accessor_index(primitive, "TEXCOORD_0").is_some()
                {
                    has_surface_attributes = true;
                }
            }

            vertex_count += mesh_vertices;
            mesh_summaries.push(MeshSummary {
                name: mesh_name,
                primitive_count: primitives.len(),
                vertex_count: mesh_vertices,
            });
        }
    }

    let bounding_box = bounding_box.unwrap_or_else(|| {
        issues.push(ValidationIssue {
            severity: Severity::Info,
            code: "NO_DECLARED_EXTENTS".to_string(),
            message: "no position accessor declares min/max, defaulting to a unit cube".to_string(),
        });
        BoundingBox::unit_cube()
    });

    let material_count = section_len(json, "materials");
    let has_existing_skeleton = section_len(json, "skins") > 0;
    let has_animations = section_len(json, "animations") > 0;

    let humanoid_confidence = humanoid_confidence(
        &bounding_box,
        vertex_count,
        mesh_summaries.len(),
        has_surface_attributes,
    );

    let anatomy_flags = detect_anatomy(&mesh_summaries, humanoid_confidence);

    tracing::debug!(
        vertex_count,
        mesh_count = mesh_summaries.len(),
        humanoid_confidence,
        "structural analysis complete"
    );

    ContainerAnalysis {
        vertex_count,
        mesh_summaries,
        material_count,
        has_existing_skeleton,
        has_animations,
        bounding_box,
        humanoid_confidence,
        anatomy_flags,
        issues,
    }
}

/// Weighted sum of the four independent geometric humanoid signals. Always
/// computed, even when an external classifier is available, so the
/// pipeline degrades gracefully.
fn humanoid_confidence(
    bounding_box: &BoundingBox,
    vertex_count: usize,
    mesh_count: usize,
    has_surface_attributes: bool,
) -> f32 {
    let mut score = 0.0f32;

    let footprint = bounding_box.width().max(bounding_box.depth());
    if footprint > f32::EPSILON {
        let aspect = bounding_box.height() / footprint;
        if (HUMANOID_ASPECT_MIN..=HUMANOID_ASPECT_MAX).contains(&aspect) {
            score += WEIGHT_ASPECT;
        }
    }

    if (DETAILED_VERTEX_MIN..=DETAILED_VERTEX_MAX).contains(&vertex_count) {
        score += WEIGHT_VERTEX_RANGE;
    }

    if mesh_count >= 2 {
        score += WEIGHT_MULTI_MESH;
    }

    if has_surface_attributes {
        score += WEIGHT_ATTRIBUTES;
    }

    score.clamp(0.0, 1.0)
}

/// Derive anatomy flags from mesh-name hints, falling back to the overall
/// geometric score when no region is named.
fn detect_anatomy(mesh_summaries: &[MeshSummary], humanoid_confidence: f32) -> AnatomyFlags {
    let mut hinted = AnatomyFlags::default();
    let mut any_hint = false;

    for summary in mesh_summaries {
        let Some(name) = summary.name.as_deref() else {
            continue;
        };
        let name = name.to_ascii_lowercase();
        let mut hit = |flag: &mut bool, needles: &[&str]| {
            if needles.iter().any(|needle| name.contains(needle)) {
                *flag = true;
                any_hint = true;
            }
        };
        hit(&mut hinted.head, &["head", "face", "hair", "eye"]);
        hit(&mut hinted.torso, &["body", "torso", "chest"]);
        hit(&mut hinted.arms, &["arm", "hand", "glove"]);
        hit(&mut hinted.legs, &["leg", "foot", "shoe", "boot"]);
    }

    if any_hint {
        return hinted;
    }

    let plausible = humanoid_confidence >= 0.5;
    AnatomyFlags {
        head: plausible,
        torso: plausible,
        arms: plausible,
        legs: plausible,
    }
}

/// Analysis used when the container never parsed: nothing is known about
/// the geometry, so every signal stays at its floor and the rig is later
/// appended rather than embedded structurally.
pub(super) fn degraded_analysis() -> ContainerAnalysis {
    ContainerAnalysis {
        vertex_count: 0,
        mesh_summaries: Vec::new(),
        material_count: 0,
        has_existing_skeleton: false,
        has_animations: false,
        bounding_box: BoundingBox::unit_cube(),
        humanoid_confidence: 0.0,
        anatomy_flags: AnatomyFlags::default(),
        issues: vec![ValidationIssue {
            severity: Severity::Warning,
            code: "UNPARSEABLE_CONTAINER".to_string(),
            message: "container did not parse; analysis reflects an unknown scene".to_string(),
        }],
    }
}

/// Fold an external classifier score into the analysis.
///
/// The classifier may only raise the geometric confidence, never lower it,
/// so an unavailable or hostile classifier can never make the analysis
/// less restrictive than the local fallback.
pub fn apply_classifier_score(analysis: &mut ContainerAnalysis, score: &ClassifierScore) {
    if !score.confidence.is_finite() {
        return;
    }
    let confidence = score.confidence.clamp(0.0, 1.0);
    let label = score.label.to_ascii_lowercase();
    if !HUMANOID_LABELS.iter().any(|known| label.contains(known)) {
        return;
    }

    if confidence > analysis.humanoid_confidence {
        analysis.humanoid_confidence = confidence;
    }
    if confidence >= CLASSIFIER_FLAG_THRESHOLD {
        analysis.anatomy_flags = AnatomyFlags {
            head: true,
            torso: true,
            arms: true,
            legs: true,
        };
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
