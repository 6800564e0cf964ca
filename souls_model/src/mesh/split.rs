use std::collections::BTreeSet;

use ahash::AHashSet;
use glam::{Vec2, Vec4};
use indexmap::IndexMap;
use log::warn;
use ordered_float::OrderedFloat;
use smol_str::SmolStr;

use crate::{
    IndexMapExt, Material, Skeleton,
    error::SplitMeshError,
    mesh::{Face, MergedMesh, SplitOptions},
    skinning::{self, Influence, SkinWeight},
    vertex::{AttributeData, Submesh},
};

// A submesh vertex row. Corners with the same merged vertex and loop
// values collapse to one vertex within a submesh.
type RowKey = (u32, Vec<[OrderedFloat<f32>; 4]>);

/// Split `mesh` into submeshes for export.
///
/// Faces are grouped by material and partitioned greedily so that no
/// submesh references more distinct bones than
/// [max_bones_per_submesh](SplitOptions::max_bones_per_submesh).
/// Vertex buffers are rebuilt from the loop attribute layers each
/// material declares with identical rows combined.
/// Degenerate and duplicate faces are dropped with a logged count.
#[tracing::instrument(skip_all)]
pub fn split_mesh(
    mesh: &MergedMesh,
    materials: &[Material],
    skeleton: &Skeleton,
    options: &SplitOptions,
) -> Result<Vec<Submesh>, SplitMeshError> {
    validate_mesh(mesh, materials.len())?;
    let vertex_weights = vertex_weights(mesh, skeleton)?;

    // Faces keep their original order within each material.
    let mut material_faces = vec![Vec::new(); materials.len()];
    for (face_index, face) in mesh.faces.iter().enumerate() {
        material_faces[face.material_index].push(face_index);
    }

    let mut submeshes = Vec::new();
    let mut degenerate_count = 0;
    let mut duplicate_count = 0;

    for (material_index, (material, face_indices)) in
        materials.iter().zip(&material_faces).enumerate()
    {
        if face_indices.is_empty() {
            continue;
        }
        let layers = material_layers(mesh, material)?;

        // Drop bad faces before partitioning so they never cost bone table slots.
        let mut kept_faces = Vec::new();
        let mut emitted_faces = AHashSet::new();
        for &face_index in face_indices {
            let corners = &mesh.faces[face_index].vertex_indices;
            if corners[0] == corners[1] || corners[1] == corners[2] || corners[0] == corners[2] {
                degenerate_count += 1;
                continue;
            }
            let mut sorted = [corners[0], corners[1], corners[2]];
            sorted.sort_unstable();
            if !emitted_faces.insert(sorted) {
                duplicate_count += 1;
                continue;
            }
            kept_faces.push(face_index);
        }

        for partition in partition_faces(
            &kept_faces,
            &mesh.faces,
            &vertex_weights,
            options.max_bones_per_submesh,
        )? {
            submeshes.push(build_submesh(
                mesh,
                skeleton,
                material_index,
                &layers,
                partition,
                &vertex_weights,
            )?);
        }
    }

    if degenerate_count > 0 {
        warn!("Dropped {degenerate_count} degenerate faces with repeated vertices.");
    }
    if duplicate_count > 0 {
        warn!("Dropped {duplicate_count} duplicate faces.");
    }

    Ok(submeshes)
}

fn validate_mesh(mesh: &MergedMesh, material_count: usize) -> Result<(), SplitMeshError> {
    let mut loop_count = 0;
    for (face_index, face) in mesh.faces.iter().enumerate() {
        if face.vertex_indices.len() != 3 {
            return Err(SplitMeshError::NonTriangularFace {
                face_index,
                vertex_count: face.vertex_indices.len(),
            });
        }
        if face.material_index >= material_count {
            return Err(SplitMeshError::MaterialIndexOutOfRange {
                face_index,
                material_index: face.material_index,
                material_count,
            });
        }
        if let Some(vertex_index) = face
            .vertex_indices
            .iter()
            .copied()
            .find(|i| *i as usize >= mesh.positions.len())
        {
            return Err(SplitMeshError::VertexIndexOutOfRange {
                face_index,
                vertex_index,
                vertex_count: mesh.positions.len(),
            });
        }
        loop_count += face.vertex_indices.len();
    }

    // Loop arrays must cover every face corner.
    for (layer, found) in [
        ("Normal", mesh.normals.len()),
        ("Tangent", mesh.tangents.len()),
    ] {
        if found != 0 && found != loop_count {
            return Err(SplitMeshError::LoopCountMismatch {
                layer: layer.to_string(),
                expected: loop_count,
                found,
            });
        }
    }
    for (layer, values) in &mesh.uv_layers {
        if values.len() != loop_count {
            return Err(SplitMeshError::LoopCountMismatch {
                layer: layer.to_string(),
                expected: loop_count,
                found: values.len(),
            });
        }
    }
    for (layer, values) in &mesh.color_layers {
        if values.len() != loop_count {
            return Err(SplitMeshError::LoopCountMismatch {
                layer: layer.to_string(),
                expected: loop_count,
                found: values.len(),
            });
        }
    }
    Ok(())
}

// Weighted bones per merged vertex as (skeleton bone index, weight).
fn vertex_weights(
    mesh: &MergedMesh,
    skeleton: &Skeleton,
) -> Result<Vec<Vec<(u16, f32)>>, SplitMeshError> {
    let mut weights = vec![Vec::new(); mesh.positions.len()];
    for influence in &mesh.influences {
        let bone_index = skeleton
            .bones
            .iter()
            .position(|b| b.name == influence.bone_name)
            .ok_or_else(|| SplitMeshError::UnknownInfluenceBone {
                bone: influence.bone_name.clone(),
            })?;
        let bone = u16::try_from(bone_index).map_err(|_| {
            SplitMeshError::BoneIndexUnrepresentable {
                bone: influence.bone_name.clone(),
                bone_index,
            }
        })?;
        for weight in &influence.weights {
            let vertex_weights = weights.get_mut(weight.vertex_index as usize).ok_or_else(
                || SplitMeshError::InfluenceVertexOutOfRange {
                    bone: influence.bone_name.clone(),
                    vertex_index: weight.vertex_index,
                    vertex_count: mesh.positions.len(),
                },
            )?;
            if weight.weight > 0.0 {
                vertex_weights.push((bone, weight.weight));
            }
        }
    }

    // Unweighted vertices only pin to the sole bone of a single bone skeleton.
    if skeleton.bones.len() != 1
        && let Some(vertex_index) = weights.iter().position(|w| w.is_empty())
    {
        return Err(SplitMeshError::UnweightedVertex {
            vertex_index,
            bone_count: skeleton.bones.len(),
        });
    }
    Ok(weights)
}

struct MaterialLayers<'a> {
    uvs: Vec<(&'a SmolStr, &'a [Vec2])>,
    colors: Vec<(&'a SmolStr, Option<&'a [Vec4]>)>,
}

fn material_layers<'a>(
    mesh: &'a MergedMesh,
    material: &'a Material,
) -> Result<MaterialLayers<'a>, SplitMeshError> {
    let mut uvs = Vec::new();
    for layer in &material.uv_layer_names {
        let values = mesh
            .uv_layers
            .get(layer)
            .ok_or_else(|| SplitMeshError::MissingUvLayer {
                material: material.name.clone(),
                layer: layer.to_string(),
            })?;
        uvs.push((layer, values.as_slice()));
    }

    let mut colors = Vec::new();
    for layer in &material.color_layer_names {
        let values = mesh.color_layers.get(layer).map(|v| v.as_slice());
        if values.is_none() {
            warn!(
                "Missing color attribute {layer:?} for material {:?}. Using zero values.",
                material.name
            );
        }
        colors.push((layer, values));
    }

    Ok(MaterialLayers { uvs, colors })
}

struct Partition {
    face_indices: Vec<usize>,
    bone_table: Vec<u16>,
}

// Greedily group faces so each group references at most `max` distinct bones.
fn partition_faces(
    face_indices: &[usize],
    faces: &[Face],
    vertex_weights: &[Vec<(u16, f32)>],
    max: usize,
) -> Result<Vec<Partition>, SplitMeshError> {
    let mut partitions = Vec::new();
    let mut current_faces = Vec::new();
    let mut current_bones = BTreeSet::new();

    for &face_index in face_indices {
        let mut face_bones = BTreeSet::new();
        for vertex_index in &faces[face_index].vertex_indices {
            for (bone, _) in &vertex_weights[*vertex_index as usize] {
                face_bones.insert(*bone);
            }
        }
        if face_bones.len() > max {
            return Err(SplitMeshError::FaceBoneCountExceedsLimit {
                face_index,
                bone_count: face_bones.len(),
                limit: max,
            });
        }

        let added = face_bones.difference(&current_bones).count();
        if current_bones.len() + added > max && !current_faces.is_empty() {
            partitions.push(Partition {
                face_indices: std::mem::take(&mut current_faces),
                bone_table: std::mem::take(&mut current_bones).into_iter().collect(),
            });
        }
        current_bones.extend(face_bones);
        current_faces.push(face_index);
    }

    if !current_faces.is_empty() {
        partitions.push(Partition {
            face_indices: current_faces,
            bone_table: current_bones.into_iter().collect(),
        });
    }
    Ok(partitions)
}

fn build_submesh(
    mesh: &MergedMesh,
    skeleton: &Skeleton,
    material_index: usize,
    layers: &MaterialLayers,
    partition: Partition,
    vertex_weights: &[Vec<(u16, f32)>],
) -> Result<Submesh, SplitMeshError> {
    let Partition {
        face_indices,
        mut bone_table,
    } = partition;

    // An unweighted mesh pins every vertex to the sole bone.
    if bone_table.is_empty() && skeleton.bones.len() == 1 {
        bone_table.push(0);
    }

    let has_normals = !mesh.normals.is_empty();
    let has_tangents = !mesh.tangents.is_empty();

    let mut rows: IndexMap<RowKey, usize, ahash::RandomState> = IndexMap::default();
    let mut row_vertices: Vec<u32> = Vec::new();
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut tangents = Vec::new();
    let mut uvs: Vec<Vec<Vec2>> = vec![Vec::new(); layers.uvs.len()];
    let mut colors: Vec<Vec<Vec4>> = vec![Vec::new(); layers.colors.len()];
    let mut indices = Vec::new();

    for face_index in face_indices {
        let face = &mesh.faces[face_index];
        // Loop arrays run in face order and every face is a triangle.
        let loop_base = face_index * 3;

        for (corner, vertex_index) in face.vertex_indices.iter().enumerate() {
            let loop_index = loop_base + corner;

            let mut loop_values = Vec::new();
            if has_normals {
                loop_values.push(
                    mesh.normals[loop_index]
                        .extend(0.0)
                        .to_array()
                        .map(OrderedFloat),
                );
            }
            if has_tangents {
                loop_values.push(mesh.tangents[loop_index].to_array().map(OrderedFloat));
            }
            for (_, values) in &layers.uvs {
                let uv = values[loop_index];
                loop_values.push([
                    OrderedFloat(uv.x),
                    OrderedFloat(uv.y),
                    OrderedFloat(0.0),
                    OrderedFloat(0.0),
                ]);
            }
            for (_, values) in &layers.colors {
                let color = values.map(|v| v[loop_index]).unwrap_or(Vec4::ZERO);
                loop_values.push(color.to_array().map(OrderedFloat));
            }

            let row = rows.entry_index((*vertex_index, loop_values));
            if row == row_vertices.len() {
                row_vertices.push(*vertex_index);
                positions.push(mesh.positions[*vertex_index as usize]);
                if has_normals {
                    normals.push(mesh.normals[loop_index]);
                }
                if has_tangents {
                    tangents.push(mesh.tangents[loop_index]);
                }
                for (out, (_, values)) in uvs.iter_mut().zip(&layers.uvs) {
                    out.push(values[loop_index]);
                }
                for (out, (_, values)) in colors.iter_mut().zip(&layers.colors) {
                    out.push(values.map(|v| v[loop_index]).unwrap_or(Vec4::ZERO));
                }
            }
            indices.push(row as u32);
        }
    }

    let bone_names: Vec<_> = bone_table
        .iter()
        .map(|i| skeleton.bones[*i as usize].name.as_str())
        .collect();
    let mut influences: Vec<_> = bone_names
        .iter()
        .map(|name| Influence {
            bone_name: name.to_string(),
            weights: Vec::new(),
        })
        .collect();
    for (row, vertex_index) in row_vertices.iter().enumerate() {
        for (bone, weight) in &vertex_weights[*vertex_index as usize] {
            // Partitioning put every referenced bone in the table.
            if let Ok(local) = bone_table.binary_search(bone) {
                influences[local].weights.push(SkinWeight {
                    vertex_index: row as u32,
                    weight: *weight,
                });
            }
        }
    }

    let (bone_indices, bone_weights) =
        skinning::bone_indices_weights(&influences, positions.len(), &bone_names)?;

    let mut attributes = vec![AttributeData::Position(positions)];
    if has_normals {
        attributes.push(AttributeData::Normal(normals));
    }
    if has_tangents {
        attributes.push(AttributeData::Tangent(tangents));
    }
    for ((name, _), values) in layers.uvs.iter().zip(uvs) {
        attributes.push(AttributeData::Uv((*name).clone(), values));
    }
    for ((name, _), values) in layers.colors.iter().zip(colors) {
        attributes.push(AttributeData::Color((*name).clone(), values));
    }
    match skinning::pinned_bone_indices(&bone_indices, &bone_weights) {
        Some(pinned) => attributes.push(AttributeData::BoneIndices(pinned)),
        None => {
            attributes.push(AttributeData::BoneIndices(bone_indices));
            attributes.push(AttributeData::BoneWeights(bone_weights));
        }
    }

    Ok(Submesh {
        material_index,
        bone_table,
        attributes,
        indices,
    })
}
