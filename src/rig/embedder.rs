use nalgebra::{Matrix4, Translation3};
use serde::Serialize;
use serde_json::{Value, json};

use super::codec::{self, ContainerDocument, align4};
use super::types::{BoneHierarchy, BoneKind, EmbedStrategy, MorphCategory, MorphTarget};
use crate::error::RigError;

// ─── Structural chunk vocabulary ──────────────────────────────────────────────

const COMPONENT_F32: u64 = 5126;
const SKIN_NAME: &str = "synthesized-rig";

// ─── Appended-block layout ────────────────────────────────────────────────────

const APPEND_BLOCK_MAGIC: [u8; 4] = *b"ARIG";
const APPEND_BLOCK_VERSION: u32 = 1;
/// 4-byte magic + u64 block offset + u32 block length.
const APPEND_TRAILER_MAGIC: [u8; 4] = *b"RIGT";
pub const APPEND_TRAILER_LEN: usize = 16;

#[derive(Serialize)]
struct AppendedBone<'a> {
    id: usize,
    name: &'a str,
    kind: BoneKind,
    parent_id: Option<usize>,
    position: [f32; 3],
    rotation: [f32; 4],
    weight: f32,
}

#[derive(Serialize)]
struct AppendedMorph<'a> {
    name: &'a str,
    category: MorphCategory,
    weight: f32,
    delta_count: usize,
}

#[derive(Serialize)]
struct AppendedRigMeta<'a> {
    bones: Vec<AppendedBone<'a>>,
    morph_targets: Vec<AppendedMorph<'a>>,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

/// Write the synthesized rig back into the container.
///
/// When the container parsed, the structural chunk is rewritten in place
/// and the payload grows by the new accessors only; otherwise the original
/// bytes are copied verbatim and a self-contained rig block is appended
/// after them. Either way the output is never smaller than the input and
/// original bytes are never reordered.
pub fn embed(
    original: &[u8],
    document: Option<ContainerDocument>,
    hierarchy: &BoneHierarchy,
    morphs: &[MorphTarget],
) -> Result<(Vec<u8>, EmbedStrategy), RigError> {
    if let Some(document) = document {
        if document.json.is_object() {
            let rigged = embed_structural(document, hierarchy, morphs)?;
            // A heavily pretty-printed source chunk can shrink on re-emit;
            // the size guarantee is kept by appending instead.
            if rigged.len() >= original.len() {
                return Ok((rigged, EmbedStrategy::Structural));
            }
            tracing::warn!(
                original = original.len(),
                rewritten = rigged.len(),
                "structural rewrite shrank the container, appending instead"
            );
        }
    }
    let rigged = embed_appended(original, hierarchy, morphs)?;
    Ok((rigged, EmbedStrategy::SafeAppend))
}

// ─── Binary helpers ───────────────────────────────────────────────────────────

fn pad_to_alignment(bin: &mut Vec<u8>) {
    bin.resize(align4(bin.len()), 0);
}

fn push_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write a MAT4 (column-major) as a little-endian f32 sequence.
fn push_mat4(out: &mut Vec<u8>, matrix: &Matrix4<f32>) {
    for value in matrix.as_slice() {
        push_f32(out, *value);
    }
}

// ─── Structural strategy ──────────────────────────────────────────────────────

/// Mutable access to a top-level array section, creating it when absent
/// and replacing it when a malformed (yet parseable) chunk holds a
/// non-array under that key.
fn entry_array<'a>(json: &'a mut Value, key: &str) -> &'a mut Vec<Value> {
    if !json.is_object() {
        *json = Value::Object(serde_json::Map::new());
    }
    let entry = &mut json[key];
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    match entry {
        Value::Array(items) => items,
        _ => unreachable!("entry was just replaced with an array"),
    }
}

fn section_len(json: &Value, key: &str) -> usize {
    json.get(key)
        .and_then(Value::as_array)
        .map(|entries| entries.len())
        .unwrap_or(0)
}

/// Position-accessor slice of one mesh primitive in global vertex order.
struct PrimitiveSlice {
    mesh_index: usize,
    primitive_index: usize,
    vertex_offset: usize,
    vertex_count: usize,
}

fn collect_primitive_slices(json: &Value) -> Vec<PrimitiveSlice> {
    let mut slices = Vec::new();
    let mut vertex_offset = 0usize;
    let Some(meshes) = json.get("meshes").and_then(Value::as_array) else {
        return slices;
    };
    for (mesh_index, mesh) in meshes.iter().enumerate() {
        let Some(primitives) = mesh.get("primitives").and_then(Value::as_array) else {
            continue;
        };
        for (primitive_index, primitive) in primitives.iter().enumerate() {
            let vertex_count = primitive
                .pointer("/attributes/POSITION")
                .and_then(Value::as_u64)
                .and_then(|accessor| {
                    json.pointer(&format!("/accessors/{accessor}/count"))
                        .and_then(Value::as_u64)
                })
                .unwrap_or(0) as usize;
            slices.push(PrimitiveSlice {
                mesh_index,
                primitive_index,
                vertex_offset,
                vertex_count,
            });
            vertex_offset += vertex_count;
        }
    }
    slices
}

fn delta_extents(deltas: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [0.0f32; 3];
    let mut max = [0.0f32; 3];
    for delta in deltas {
        for axis in 0..3 {
            min[axis] = min[axis].min(delta[axis]);
            max[axis] = max[axis].max(delta[axis]);
        }
    }
    (min, max)
}

/// Rewrite the structural chunk: bone nodes, a skin referencing them, and
/// morph-target accessors on existing mesh primitives. Untouched regions
/// of the binary chunk are preserved exactly; new payload is only appended.
fn embed_structural(
    document: ContainerDocument,
    hierarchy: &BoneHierarchy,
    morphs: &[MorphTarget],
) -> Result<Vec<u8>, RigError> {
    let mut json = document.json;
    let mut bin = document.bin.unwrap_or_default();

    let primitive_slices = collect_primitive_slices(&json);
    let base_view = section_len(&json, "bufferViews");
    let base_accessor = section_len(&json, "accessors");
    let base_node = section_len(&json, "nodes");

    let mut new_views = Vec::<Value>::new();
    let mut new_accessors = Vec::<Value>::new();

    // Inverse bind matrices for every bone, identity rotation with the
    // bind translation inverted.
    pad_to_alignment(&mut bin);
    let ibm_offset = bin.len();
    for bone in hierarchy.bones() {
        let inverse_bind = Translation3::from(-bone.position).to_homogeneous();
        push_mat4(&mut bin, &inverse_bind);
    }
    new_views.push(json!({
        "buffer": 0,
        "byteOffset": ibm_offset,
        "byteLength": hierarchy.len() * 64,
    }));
    new_accessors.push(json!({
        "bufferView": base_view,
        "componentType": COMPONENT_F32,
        "count": hierarchy.len(),
        "type": "MAT4",
    }));
    let ibm_accessor = base_accessor;

    // One delta accessor per (morph, primitive) pair, sliced from the
    // global per-vertex delta list in primitive order.
    let mut targets_per_slice: Vec<Vec<usize>> = vec![Vec::new(); primitive_slices.len()];
    for morph in morphs {
        for (slice_index, slice) in primitive_slices.iter().enumerate() {
            let Some(deltas) = morph
                .vertex_deltas
                .get(slice.vertex_offset..slice.vertex_offset + slice.vertex_count)
            else {
                // Delta list disagrees with the scene; leave this
                // primitive without targets rather than corrupt it.
                continue;
            };

            pad_to_alignment(&mut bin);
            let offset = bin.len();
            for delta in deltas {
                push_f32(&mut bin, delta[0]);
                push_f32(&mut bin, delta[1]);
                push_f32(&mut bin, delta[2]);
            }
            let (min, max) = delta_extents(deltas);

            new_views.push(json!({
                "buffer": 0,
                "byteOffset": offset,
                "byteLength": deltas.len() * 12,
            }));
            let accessor_index = base_accessor + new_accessors.len();
            new_accessors.push(json!({
                "bufferView": base_view + new_views.len() - 1,
                "componentType": COMPONENT_F32,
                "count": deltas.len(),
                "type": "VEC3",
                "min": min,
                "max": max,
            }));
            targets_per_slice[slice_index].push(accessor_index);
        }
    }

    // Bone nodes, children derived from parent links.
    let nodes = entry_array(&mut json, "nodes");
    for bone in hierarchy.bones() {
        let parent_position = bone
            .parent_id
            .and_then(|parent_id| hierarchy.bones().get(parent_id))
            .map(|parent| parent.position)
            .unwrap_or_default();
        let local = bone.position - parent_position;
        let rotation = bone.rotation.coords;

        let mut node = json!({
            "name": bone.name,
            "translation": [local.x, local.y, local.z],
            "rotation": [rotation.x, rotation.y, rotation.z, rotation.w],
        });
        let children: Vec<u64> = hierarchy
            .children_of(bone.id)
            .into_iter()
            .map(|child| (base_node + child) as u64)
            .collect();
        if !children.is_empty() {
            node["children"] = json!(children);
        }
        nodes.push(node);
    }

    // The root bone joins the scene roots so the skeleton is reachable.
    let root_node = hierarchy
        .root()
        .map(|root| base_node + root.id)
        .unwrap_or(base_node);
    let scenes = entry_array(&mut json, "scenes");
    if scenes.is_empty() {
        scenes.push(json!({"nodes": []}));
    }
    if let Some(scene_nodes) = scenes[0]
        .as_object_mut()
        .map(|scene| {
            scene
                .entry("nodes")
                .or_insert_with(|| Value::Array(Vec::new()))
        })
        .and_then(Value::as_array_mut)
    {
        scene_nodes.push(Value::from(root_node as u64));
    }

    // Skin over all synthesized bones.
    let joints: Vec<u64> = hierarchy
        .bones()
        .iter()
        .map(|bone| (base_node + bone.id) as u64)
        .collect();
    let skins = entry_array(&mut json, "skins");
    let skin_index = skins.len();
    skins.push(json!({
        "name": SKIN_NAME,
        "skeleton": root_node as u64,
        "joints": joints,
        "inverseBindMatrices": ibm_accessor,
    }));

    // Attach the skin to every mesh node that is not already skinned.
    let nodes = entry_array(&mut json, "nodes");
    for node in nodes.iter_mut().take(base_node) {
        if node.get("mesh").is_some() && node.get("skin").is_none() {
            node["skin"] = Value::from(skin_index as u64);
        }
    }

    // Morph-target references on existing primitives, names in extras.
    let morph_names: Vec<&str> = morphs.iter().map(|morph| morph.name.as_str()).collect();
    let morph_weights: Vec<f32> = morphs.iter().map(|morph| morph.weight).collect();
    for (slice_index, slice) in primitive_slices.iter().enumerate() {
        let accessors = &targets_per_slice[slice_index];
        if accessors.is_empty() {
            continue;
        }
        let Some(primitive) = json.pointer_mut(&format!(
            "/meshes/{}/primitives/{}",
            slice.mesh_index, slice.primitive_index
        )) else {
            continue;
        };
        primitive["targets"] = Value::Array(
            accessors
                .iter()
                .map(|accessor| json!({"POSITION": accessor}))
                .collect(),
        );
    }
    if !morphs.is_empty() {
        if let Some(meshes) = json.get_mut("meshes").and_then(Value::as_array_mut) {
            for mesh in meshes.iter_mut() {
                if mesh.pointer("/primitives/0/targets").is_none() {
                    continue;
                }
                mesh["weights"] = json!(morph_weights);
                if !mesh["extras"].is_object() {
                    mesh["extras"] = json!({});
                }
                mesh["extras"]["targetNames"] = json!(morph_names);
            }
        }
    }

    entry_array(&mut json, "bufferViews").extend(new_views);
    entry_array(&mut json, "accessors").extend(new_accessors);

    let buffers = entry_array(&mut json, "buffers");
    if buffers.is_empty() {
        buffers.push(json!({"byteLength": bin.len()}));
    } else {
        buffers[0]["byteLength"] = Value::from(bin.len() as u64);
    }

    codec::serialize(&ContainerDocument {
        json,
        bin: Some(bin),
    })
}

// ─── Safe-append strategy ─────────────────────────────────────────────────────

/// Copy the original bytes unmodified and append a self-contained rig
/// block plus a fixed-size trailing descriptor. The original container
/// stays independently openable even if the appended data is never read.
fn embed_appended(
    original: &[u8],
    hierarchy: &BoneHierarchy,
    morphs: &[MorphTarget],
) -> Result<Vec<u8>, RigError> {
    let meta = AppendedRigMeta {
        bones: hierarchy
            .bones()
            .iter()
            .map(|bone| AppendedBone {
                id: bone.id,
                name: &bone.name,
                kind: bone.kind,
                parent_id: bone.parent_id,
                position: [bone.position.x, bone.position.y, bone.position.z],
                rotation: [
                    bone.rotation.coords.x,
                    bone.rotation.coords.y,
                    bone.rotation.coords.z,
                    bone.rotation.coords.w,
                ],
                weight: bone.weight,
            })
            .collect(),
        morph_targets: morphs
            .iter()
            .map(|morph| AppendedMorph {
                name: &morph.name,
                category: morph.category,
                weight: morph.weight,
                delta_count: morph.vertex_deltas.len(),
            })
            .collect(),
    };
    let meta_bytes = serde_json::to_vec(&meta)
        .map_err(|err| RigError::SerializationInvariant(format!("appended rig metadata: {err}")))?;

    let mut out = original.to_vec();
    pad_to_alignment(&mut out);
    let block_offset = out.len();

    out.extend_from_slice(&APPEND_BLOCK_MAGIC);
    out.extend_from_slice(&APPEND_BLOCK_VERSION.to_le_bytes());
    out.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&meta_bytes);
    pad_to_alignment(&mut out);

    // Bone transforms and influence weights.
    for bone in hierarchy.bones() {
        push_f32(&mut out, bone.position.x);
        push_f32(&mut out, bone.position.y);
        push_f32(&mut out, bone.position.z);
        push_f32(&mut out, bone.rotation.coords.x);
        push_f32(&mut out, bone.rotation.coords.y);
        push_f32(&mut out, bone.rotation.coords.z);
        push_f32(&mut out, bone.rotation.coords.w);
        push_f32(&mut out, bone.weight);
    }

    // Morph deltas, per target in order.
    for morph in morphs {
        for delta in &morph.vertex_deltas {
            push_f32(&mut out, delta[0]);
            push_f32(&mut out, delta[1]);
            push_f32(&mut out, delta[2]);
        }
    }

    let block_len = (out.len() - block_offset) as u32;
    out.extend_from_slice(&APPEND_TRAILER_MAGIC);
    out.extend_from_slice(&(block_offset as u64).to_le_bytes());
    out.extend_from_slice(&block_len.to_le_bytes());

    Ok(out)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
