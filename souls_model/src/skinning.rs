//! Conversions between per vertex skin weights and per bone influences.
use glam::Vec4;

use crate::{
    Skeleton,
    error::{MergeMeshError, SplitMeshError},
    vertex::Submesh,
};

// Using a bone name allows using different skeleton hierarchies.
// Model and animation skeletons use different orderings, for example.
// Consuming code can create their own mappings from names to indices.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct Influence {
    pub bone_name: String,
    pub weights: Vec<SkinWeight>,
}

#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct SkinWeight {
    pub vertex_index: u32,
    pub weight: f32,
}

/// Convert the per vertex indices and weights of `submesh` to per bone influences.
///
/// The result contains one [Influence] per skeleton bone in order,
/// so unreferenced bones have an empty weight list.
/// Submeshes without a bone index attribute produce only empty weight lists.
///
/// A vertex storing one bone index in all four slots with every weight zero
/// is pinned to that bone with a weight of 1.0.
/// Map pieces and other unskinned models store all of their vertices this way.
///
/// `submesh_index` is only used for error reporting.
pub fn bone_influences(
    submesh: &Submesh,
    submesh_index: usize,
    skeleton: &Skeleton,
) -> Result<Vec<Influence>, MergeMeshError> {
    let mut influences: Vec<_> = skeleton
        .bones
        .iter()
        .map(|b| Influence {
            bone_name: b.name.clone(),
            weights: Vec::new(),
        })
        .collect();

    let Some(bone_indices) = submesh.bone_indices() else {
        return Ok(influences);
    };
    let bone_weights = submesh.bone_weights();

    let to_skeleton_index = |vertex_index: usize, local_index: u16| {
        let entry = submesh.bone_table.get(local_index as usize).copied().ok_or(
            MergeMeshError::BoneIndexOutOfRange {
                submesh_index,
                vertex_index,
                bone_index: local_index,
                bone_table_len: submesh.bone_table.len(),
            },
        )?;
        if (entry as usize) < skeleton.bones.len() {
            Ok(entry as usize)
        } else {
            Err(MergeMeshError::BoneTableEntryOutOfRange {
                submesh_index,
                entry,
                bone_count: skeleton.bones.len(),
            })
        }
    };

    for (vertex_index, local_indices) in bone_indices.iter().enumerate() {
        let weights = bone_weights
            .and_then(|w| w.get(vertex_index))
            .copied()
            .unwrap_or(Vec4::ZERO);

        let pinned =
            weights == Vec4::ZERO && local_indices[1..].iter().all(|i| *i == local_indices[0]);
        if pinned {
            let bone = to_skeleton_index(vertex_index, local_indices[0])?;
            influences[bone].weights.push(SkinWeight {
                vertex_index: vertex_index as u32,
                weight: 1.0,
            });
        } else {
            for i in 0..4 {
                if weights[i] > 0.0 {
                    let bone = to_skeleton_index(vertex_index, local_indices[i])?;
                    influences[bone].weights.push(SkinWeight {
                        vertex_index: vertex_index as u32,
                        weight: weights[i],
                    });
                }
            }
        }
    }

    Ok(influences)
}

/// Convert the per bone `influences` to per vertex indices and weights.
/// The `bone_names` provide the mapping from bone names to bone indices.
///
/// Vertices with no weighted influences are pinned to the only bone
/// if `bone_names` has exactly one entry.
/// More than 4 weighted influences for a vertex is an error
/// since the values cannot be stored losslessly.
pub fn bone_indices_weights<S: AsRef<str>>(
    influences: &[Influence],
    vertex_count: usize,
    bone_names: &[S],
) -> Result<(Vec<[u16; 4]>, Vec<Vec4>), SplitMeshError> {
    // Count weighted influences first so errors report the full count.
    let mut influence_counts = vec![0usize; vertex_count];
    for influence in influences {
        if !bone_names
            .iter()
            .any(|n| n.as_ref() == influence.bone_name)
        {
            return Err(SplitMeshError::UnknownInfluenceBone {
                bone: influence.bone_name.clone(),
            });
        }

        for weight in &influence.weights {
            if weight.weight > 0.0 {
                let i = weight.vertex_index as usize;
                if i >= vertex_count {
                    return Err(SplitMeshError::InfluenceVertexOutOfRange {
                        bone: influence.bone_name.clone(),
                        vertex_index: weight.vertex_index,
                        vertex_count,
                    });
                }
                influence_counts[i] += 1;
            }
        }
    }

    for (vertex_index, count) in influence_counts.iter().enumerate() {
        if *count > 4 {
            return Err(SplitMeshError::TooManyBoneInfluences {
                vertex_index,
                count: *count,
            });
        }
        if *count == 0 && bone_names.len() != 1 {
            return Err(SplitMeshError::UnweightedVertex {
                vertex_index,
                bone_count: bone_names.len(),
            });
        }
    }

    let mut assigned = vec![0usize; vertex_count];
    let mut indices = vec![[0u16; 4]; vertex_count];
    let mut weights = vec![Vec4::ZERO; vertex_count];

    for influence in influences {
        // Already checked above.
        if let Some(bone_index) = bone_names
            .iter()
            .position(|n| n.as_ref() == influence.bone_name)
        {
            for weight in &influence.weights {
                if weight.weight > 0.0 {
                    let i = weight.vertex_index as usize;
                    indices[i][assigned[i]] = bone_index as u16;
                    weights[i][assigned[i]] = weight.weight;
                    assigned[i] += 1;
                }
            }
        }
    }

    Ok((indices, weights))
}

/// Detect submeshes that can use the unweighted layout
/// with a bone index duplicated across all four slots and no weight attribute.
///
/// Returns the duplicated indices if every vertex
/// is either already pinned or fully weighted to a single bone.
pub fn pinned_bone_indices(indices: &[[u16; 4]], weights: &[Vec4]) -> Option<Vec<[u16; 4]>> {
    indices
        .iter()
        .zip(weights)
        .map(|(index, weight)| {
            if *weight == Vec4::ZERO && index[1..].iter().all(|i| *i == index[0]) {
                Some([index[0]; 4])
            } else if *weight == Vec4::new(1.0, 0.0, 0.0, 0.0) {
                Some([index[0]; 4])
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::vec4;

    use crate::{Transform, skeleton::Bone, vertex::AttributeData};

    fn skeleton(names: &[&str]) -> Skeleton {
        Skeleton {
            bones: names
                .iter()
                .map(|name| Bone {
                    name: name.to_string(),
                    transform: Transform::IDENTITY,
                    parent_index: None,
                })
                .collect(),
        }
    }

    fn weight(vertex_index: u32, weight: f32) -> SkinWeight {
        SkinWeight {
            vertex_index,
            weight,
        }
    }

    #[test]
    fn bone_influences_weighted_and_pinned() {
        let submesh = Submesh {
            material_index: 0,
            bone_table: vec![3, 1],
            attributes: vec![
                AttributeData::BoneIndices(vec![[0, 1, 0, 0], [1, 1, 1, 1]]),
                AttributeData::BoneWeights(vec![vec4(0.75, 0.25, 0.0, 0.0), Vec4::ZERO]),
            ],
            indices: Vec::new(),
        };

        assert_eq!(
            vec![
                Influence {
                    bone_name: "a".to_string(),
                    weights: Vec::new(),
                },
                Influence {
                    bone_name: "b".to_string(),
                    weights: vec![weight(0, 0.25), weight(1, 1.0)],
                },
                Influence {
                    bone_name: "c".to_string(),
                    weights: Vec::new(),
                },
                Influence {
                    bone_name: "d".to_string(),
                    weights: vec![weight(0, 0.75)],
                },
            ],
            bone_influences(&submesh, 0, &skeleton(&["a", "b", "c", "d"])).unwrap()
        );
    }

    #[test]
    fn bone_influences_no_weight_attribute() {
        // Map pieces only store duplicated bone indices.
        let submesh = Submesh {
            material_index: 0,
            bone_table: vec![0],
            attributes: vec![AttributeData::BoneIndices(vec![[0; 4], [0; 4]])],
            indices: Vec::new(),
        };

        assert_eq!(
            vec![Influence {
                bone_name: "a".to_string(),
                weights: vec![weight(0, 1.0), weight(1, 1.0)],
            }],
            bone_influences(&submesh, 0, &skeleton(&["a"])).unwrap()
        );
    }

    #[test]
    fn bone_influences_index_out_of_range() {
        let submesh = Submesh {
            material_index: 0,
            bone_table: vec![0],
            attributes: vec![
                AttributeData::BoneIndices(vec![[7, 7, 7, 7]]),
                AttributeData::BoneWeights(vec![Vec4::ZERO]),
            ],
            indices: Vec::new(),
        };

        assert!(matches!(
            bone_influences(&submesh, 0, &skeleton(&["a"])),
            Err(MergeMeshError::BoneIndexOutOfRange { bone_index: 7, .. })
        ));
    }

    #[test]
    fn bone_influences_table_entry_out_of_range() {
        let submesh = Submesh {
            material_index: 0,
            bone_table: vec![9],
            attributes: vec![
                AttributeData::BoneIndices(vec![[0; 4]]),
                AttributeData::BoneWeights(vec![Vec4::ZERO]),
            ],
            indices: Vec::new(),
        };

        assert!(matches!(
            bone_influences(&submesh, 0, &skeleton(&["a"])),
            Err(MergeMeshError::BoneTableEntryOutOfRange { entry: 9, .. })
        ));
    }

    #[test]
    fn bone_indices_weights_multiple_influences() {
        assert_eq!(
            (
                vec![[0, 1, 0, 0], [2, 0, 0, 0], [0, 2, 0, 0]],
                vec![
                    vec4(0.1, 0.9, 0.0, 0.0),
                    vec4(1.0, 0.0, 0.0, 0.0),
                    vec4(0.7, 0.3, 0.0, 0.0)
                ]
            ),
            bone_indices_weights(
                &[
                    Influence {
                        bone_name: "a".to_string(),
                        weights: vec![weight(0, 0.1), weight(2, 0.7)],
                    },
                    Influence {
                        bone_name: "b".to_string(),
                        weights: vec![weight(0, 0.9)],
                    },
                    Influence {
                        bone_name: "c".to_string(),
                        weights: vec![weight(1, 1.0), weight(2, 0.3)],
                    },
                ],
                3,
                &["a", "b", "c"]
            )
            .unwrap()
        );
    }

    #[test]
    fn bone_indices_weights_too_many_influences() {
        let influences: Vec<_> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|name| Influence {
                bone_name: name.to_string(),
                weights: vec![weight(0, 0.2)],
            })
            .collect();

        assert!(matches!(
            bone_indices_weights(&influences, 1, &["a", "b", "c", "d", "e"]),
            Err(SplitMeshError::TooManyBoneInfluences {
                vertex_index: 0,
                count: 5
            })
        ));
    }

    #[test]
    fn bone_indices_weights_unweighted_single_bone() {
        // Unweighted vertices pin to the only bone.
        assert_eq!(
            (vec![[0u16; 4]; 2], vec![Vec4::ZERO; 2]),
            bone_indices_weights(&[], 2, &["a"]).unwrap()
        );
    }

    #[test]
    fn bone_indices_weights_unweighted_ambiguous() {
        assert!(matches!(
            bone_indices_weights(&[], 1, &["a", "b"]),
            Err(SplitMeshError::UnweightedVertex {
                vertex_index: 0,
                bone_count: 2
            })
        ));
    }

    #[test]
    fn bone_indices_weights_unknown_bone() {
        assert!(matches!(
            bone_indices_weights(
                &[Influence {
                    bone_name: "ghost".to_string(),
                    weights: Vec::new(),
                }],
                0,
                &["a"]
            ),
            Err(SplitMeshError::UnknownInfluenceBone { .. })
        ));
    }

    #[test]
    fn bone_indices_weights_vertex_out_of_range() {
        assert!(matches!(
            bone_indices_weights(
                &[Influence {
                    bone_name: "a".to_string(),
                    weights: vec![weight(4, 1.0)],
                }],
                2,
                &["a"]
            ),
            Err(SplitMeshError::InfluenceVertexOutOfRange {
                vertex_index: 4,
                ..
            })
        ));
    }

    #[test]
    fn pinned_layout_detection() {
        assert_eq!(
            Some(vec![[2u16; 4], [0u16; 4]]),
            pinned_bone_indices(
                &[[2, 0, 0, 0], [0, 0, 0, 0]],
                &[vec4(1.0, 0.0, 0.0, 0.0), Vec4::ZERO]
            )
        );

        assert_eq!(
            None,
            pinned_bone_indices(&[[0, 1, 0, 0]], &[vec4(0.5, 0.5, 0.0, 0.0)])
        );
    }
}
