use ahash::AHashSet;
use glam::{Vec2, Vec3, Vec4};
use indexmap::IndexMap;
use log::warn;
use ordered_float::OrderedFloat;
use smol_str::SmolStr;

use crate::{
    IndexMapExt, ModelRoot, Skeleton,
    error::MergeMeshError,
    mesh::{Face, MergedMesh},
    skinning::{self, Influence, SkinWeight},
    vertex::{AttributeData, Submesh},
};

// A vertex row for combining identical vertices across submeshes.
// Loop values like UVs are not part of vertex identity.
type VertexKey = ([OrderedFloat<f32>; 3], Vec<(usize, OrderedFloat<f32>)>);

/// Combine every submesh of `root` into one [MergedMesh].
///
/// Vertices with identical positions and skin weights are combined across submeshes.
/// Attribute layers with the same name share one layer in the result,
/// and loops from submeshes without a layer use zero values.
/// Degenerate faces with repeated vertices and faces repeating
/// an already emitted vertex set are dropped with a logged count.
#[tracing::instrument(skip_all)]
pub fn merge_submeshes(root: &ModelRoot) -> Result<MergedMesh, MergeMeshError> {
    // Collect layer names first so every loop has a value for every layer.
    let mut uv_names: Vec<SmolStr> = Vec::new();
    let mut color_names: Vec<SmolStr> = Vec::new();
    let mut has_normals = false;
    let mut has_tangents = false;
    for submesh in &root.submeshes {
        for attribute in &submesh.attributes {
            match attribute {
                AttributeData::Normal(_) => has_normals = true,
                AttributeData::Tangent(_) => has_tangents = true,
                AttributeData::Uv(name, _) => {
                    if !uv_names.contains(name) {
                        uv_names.push(name.clone());
                    }
                }
                AttributeData::Color(name, _) => {
                    if !color_names.contains(name) {
                        color_names.push(name.clone());
                    }
                }
                _ => (),
            }
        }
    }

    let mut positions: Vec<Vec3> = Vec::new();
    let mut influences: Vec<Influence> = root
        .skeleton
        .bones
        .iter()
        .map(|b| Influence {
            bone_name: b.name.clone(),
            weights: Vec::new(),
        })
        .collect();
    let mut faces = Vec::new();
    let mut normals = Vec::new();
    let mut tangents = Vec::new();
    let mut uv_layers: IndexMap<SmolStr, Vec<Vec2>> =
        uv_names.iter().cloned().map(|n| (n, Vec::new())).collect();
    let mut color_layers: IndexMap<SmolStr, Vec<Vec4>> = color_names
        .iter()
        .cloned()
        .map(|n| (n, Vec::new()))
        .collect();

    let mut vertex_indices: IndexMap<VertexKey, usize, ahash::RandomState> = IndexMap::default();
    let mut emitted_faces: AHashSet<[u32; 3]> = AHashSet::new();
    let mut degenerate_count = 0;
    let mut duplicate_count = 0;

    for (submesh_index, submesh) in root.submeshes.iter().enumerate() {
        let submesh_positions = validate_submesh(submesh, submesh_index, root.materials.len())?;
        let vertex_keys =
            submesh_vertex_keys(submesh, submesh_index, &root.skeleton, submesh_positions)?;

        let submesh_normals = submesh.attributes.iter().find_map(|a| match a {
            AttributeData::Normal(values) => Some(values.as_slice()),
            _ => None,
        });
        let submesh_tangents = submesh.attributes.iter().find_map(|a| match a {
            AttributeData::Tangent(values) => Some(values.as_slice()),
            _ => None,
        });
        let submesh_uvs: Vec<Option<&[Vec2]>> = uv_names
            .iter()
            .map(|name| {
                submesh.attributes.iter().find_map(|a| match a {
                    AttributeData::Uv(n, values) if n == name => Some(values.as_slice()),
                    _ => None,
                })
            })
            .collect();
        let submesh_colors: Vec<Option<&[Vec4]>> = color_names
            .iter()
            .map(|name| {
                submesh.attributes.iter().find_map(|a| match a {
                    AttributeData::Color(n, values) if n == name => Some(values.as_slice()),
                    _ => None,
                })
            })
            .collect();

        for triangle in submesh.indices.chunks_exact(3) {
            let corners = [
                triangle[0] as usize,
                triangle[1] as usize,
                triangle[2] as usize,
            ];

            // Compare rows rather than indices so corners
            // that dedup to the same vertex also count as repeats.
            if vertex_keys[corners[0]] == vertex_keys[corners[1]]
                || vertex_keys[corners[1]] == vertex_keys[corners[2]]
                || vertex_keys[corners[0]] == vertex_keys[corners[2]]
            {
                degenerate_count += 1;
                continue;
            }

            let merged = corners.map(|i| {
                let index = vertex_indices.entry_index(vertex_keys[i].clone());
                if index == positions.len() {
                    // The first occurrence defines the vertex row.
                    positions.push(submesh_positions[i]);
                    for (bone, weight) in &vertex_keys[i].1 {
                        influences[*bone].weights.push(SkinWeight {
                            vertex_index: index as u32,
                            weight: weight.0,
                        });
                    }
                }
                index as u32
            });

            let mut sorted = merged;
            sorted.sort_unstable();
            if !emitted_faces.insert(sorted) {
                duplicate_count += 1;
                continue;
            }

            for i in corners {
                if has_normals {
                    normals.push(submesh_normals.map(|v| v[i]).unwrap_or(Vec3::ZERO));
                }
                if has_tangents {
                    tangents.push(submesh_tangents.map(|v| v[i]).unwrap_or(Vec4::ZERO));
                }
                for (layer, values) in uv_layers.values_mut().zip(&submesh_uvs) {
                    layer.push(values.map(|v| v[i]).unwrap_or(Vec2::ZERO));
                }
                for (layer, values) in color_layers.values_mut().zip(&submesh_colors) {
                    layer.push(values.map(|v| v[i]).unwrap_or(Vec4::ZERO));
                }
            }

            faces.push(Face {
                vertex_indices: merged.to_vec(),
                material_index: submesh.material_index,
            });
        }
    }

    if degenerate_count > 0 {
        warn!("Dropped {degenerate_count} degenerate faces with repeated vertices.");
    }
    if duplicate_count > 0 {
        warn!("Dropped {duplicate_count} duplicate faces.");
    }

    Ok(MergedMesh {
        positions,
        influences,
        faces,
        normals,
        tangents,
        uv_layers,
        color_layers,
    })
}

fn validate_submesh<'a>(
    submesh: &'a Submesh,
    submesh_index: usize,
    material_count: usize,
) -> Result<&'a [Vec3], MergeMeshError> {
    let positions = submesh
        .positions()
        .ok_or(MergeMeshError::MissingPositions { submesh_index })?;

    for attribute in &submesh.attributes {
        if attribute.len() != positions.len() {
            return Err(MergeMeshError::AttributeLengthMismatch {
                submesh_index,
                expected: positions.len(),
                found: attribute.len(),
            });
        }
    }

    if submesh.indices.len() % 3 != 0 {
        return Err(MergeMeshError::InvalidTriangleList {
            submesh_index,
            index_count: submesh.indices.len(),
        });
    }

    if let Some(vertex_index) = submesh
        .indices
        .iter()
        .copied()
        .find(|i| *i as usize >= positions.len())
    {
        return Err(MergeMeshError::VertexIndexOutOfRange {
            submesh_index,
            vertex_index,
            vertex_count: positions.len(),
        });
    }

    if submesh.material_index >= material_count {
        return Err(MergeMeshError::MaterialIndexOutOfRange {
            submesh_index,
            material_index: submesh.material_index,
            material_count,
        });
    }

    Ok(positions)
}

fn submesh_vertex_keys(
    submesh: &Submesh,
    submesh_index: usize,
    skeleton: &Skeleton,
    positions: &[Vec3],
) -> Result<Vec<VertexKey>, MergeMeshError> {
    let mut vertex_weights = vec![Vec::new(); positions.len()];
    let influences = skinning::bone_influences(submesh, submesh_index, skeleton)?;
    for (bone, influence) in influences.iter().enumerate() {
        for weight in &influence.weights {
            if let Some(weights) = vertex_weights.get_mut(weight.vertex_index as usize) {
                weights.push((bone, OrderedFloat(weight.weight)));
            }
        }
    }

    Ok(positions
        .iter()
        .zip(vertex_weights)
        .map(|(position, weights)| (position.to_array().map(OrderedFloat), weights))
        .collect())
}
