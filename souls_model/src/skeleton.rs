use glam::Mat4;
use indexmap::IndexMap;
use log::warn;

use crate::{Transform, error::SkeletonError};

/// The bone hierarchy for a model or animation rig.
///
/// The model and animation files for one character often disagree on the
/// exact bone list. Use [merge_skeletons] to combine them by bone name.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct Skeleton {
    /// The hierarchy of bones ordered with parents before children.
    pub bones: Vec<Bone>,
}

/// A single node in the skeleton hierarchy.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct Bone {
    /// The name used by animations and skin weights to identify this bone.
    /// Unique within a [Skeleton].
    pub name: String,
    /// The rest pose transform of the bone relative to its parent.
    ///
    /// Unanimated props store their entire pose here,
    /// so rest transforms are not always a bind pose.
    pub transform: Transform,
    /// The index of the parent [Bone] in [bones](struct.Skeleton.html#structfield.bones)
    /// or `None` if this is a root bone.
    pub parent_index: Option<usize>,
}

impl Skeleton {
    /// Creates a skeleton from `(name, parent name, transform)` entries
    /// with each `transform` relative to the bone's parent.
    ///
    /// Bones are reordered so parents precede children.
    /// Missing parents, duplicate names, and parenting cycles are errors.
    pub fn from_named_bones(
        bones: impl IntoIterator<Item = (String, Option<String>, Transform)>,
    ) -> Result<Self, SkeletonError> {
        let bones: Vec<_> = bones.into_iter().collect();
        named_bones_ordered(bones).map(|bones| Self { bones })
    }

    /// Creates a skeleton from `(name, parent name, transform)` entries
    /// with each `transform` in armature space relative to the skeleton root.
    ///
    /// Editing applications usually author rest poses in armature space.
    /// The transforms are converted to the parent relative form during construction.
    pub fn from_armature_space_bones(
        bones: impl IntoIterator<Item = (String, Option<String>, Transform)>,
    ) -> Result<Self, SkeletonError> {
        let bones = named_bones_ordered(bones.into_iter().collect())?;

        // The input transforms are armature space, so the local transform
        // only needs the parent's armature space matrix inverted once.
        let armature_space: Vec<_> = bones.iter().map(|b| b.transform.to_matrix()).collect();
        let bones = bones
            .into_iter()
            .enumerate()
            .map(|(i, bone)| Bone {
                transform: match bone.parent_index {
                    Some(p) => {
                        Transform::from_matrix(armature_space[p].inverse() * armature_space[i])
                    }
                    None => bone.transform,
                },
                ..bone
            })
            .collect();

        Ok(Self { bones })
    }

    /// The transform for each bone in armature space relative to the skeleton root
    /// by recursively applying the parent transform.
    ///
    /// For a bind pose skeleton this is also known as the bone's "rest pose" or "bind pose".
    /// For inverse bind matrices, convert the transforms to a matrix and invert.
    pub fn armature_space_transforms(&self) -> Vec<Transform> {
        let mut final_transforms: Vec<_> = self.bones.iter().map(|b| b.transform).collect();

        // Accumulation relies on bones appearing after their parents.
        for i in 0..final_transforms.len() {
            if let Some(parent) = self.bones[i].parent_index
                && parent < i
            {
                final_transforms[i] = final_transforms[parent] * self.bones[i].transform;
            }
        }

        final_transforms
    }

    /// [Self::armature_space_transforms] in matrix form for conversions
    /// that need to be exact under non uniform scale.
    pub(crate) fn armature_space_matrices(&self) -> Vec<Mat4> {
        let mut matrices: Vec<_> = self.bones.iter().map(|b| b.transform.to_matrix()).collect();

        for i in 0..matrices.len() {
            if let Some(parent) = self.bones[i].parent_index
                && parent < i
            {
                matrices[i] = matrices[parent] * self.bones[i].transform.to_matrix();
            }
        }

        matrices
    }

    /// Checks the hierarchy invariants that conversions rely on.
    ///
    /// Bone names must be unique and parent indices must be in range and acyclic.
    /// Bones appearing before their parents only log a warning
    /// since accumulated transforms will still be well defined.
    pub fn validate(&self) -> Result<(), SkeletonError> {
        let mut names = std::collections::BTreeSet::new();
        for (i, bone) in self.bones.iter().enumerate() {
            if !names.insert(bone.name.as_str()) {
                return Err(SkeletonError::DuplicateBoneName {
                    name: bone.name.clone(),
                });
            }

            if let Some(p) = bone.parent_index {
                if p >= self.bones.len() {
                    return Err(SkeletonError::ParentIndexOutOfRange {
                        bone: bone.name.clone(),
                        parent_index: p,
                        bone_count: self.bones.len(),
                    });
                }
                if p > i {
                    warn!("Bone {i} appears before parent {p} and will not convert properly.");
                }
            }

            // Walk to the root to reject parenting cycles.
            let mut steps = 0;
            let mut current = bone.parent_index;
            while let Some(p) = current {
                if p >= self.bones.len() {
                    break;
                }
                steps += 1;
                if steps > self.bones.len() {
                    return Err(SkeletonError::BoneCycle {
                        bone: bone.name.clone(),
                    });
                }
                current = self.bones[p].parent_index;
            }
        }
        Ok(())
    }
}

fn named_bones_ordered(
    mut remaining: Vec<(String, Option<String>, Transform)>,
) -> Result<Vec<Bone>, SkeletonError> {
    let mut names = std::collections::BTreeSet::new();
    for (name, _, _) in &remaining {
        if !names.insert(name.as_str()) {
            return Err(SkeletonError::DuplicateBoneName { name: name.clone() });
        }
    }
    for (name, parent, _) in &remaining {
        if let Some(parent) = parent
            && !names.contains(parent.as_str())
        {
            return Err(SkeletonError::MissingParent {
                bone: name.clone(),
                parent: parent.clone(),
            });
        }
    }

    // Emit bones whose parent has already been emitted until none are left.
    // A pass without progress means the remaining bones parent each other.
    let mut bones = Vec::with_capacity(remaining.len());
    let mut emitted: IndexMap<String, usize> = IndexMap::new();
    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|(name, parent, transform)| {
            let parent_index = match parent {
                None => None,
                Some(parent) => match emitted.get(parent.as_str()) {
                    Some(i) => Some(*i),
                    None => return true,
                },
            };
            emitted.insert(name.clone(), bones.len());
            bones.push(Bone {
                name: name.clone(),
                transform: *transform,
                parent_index,
            });
            false
        });
        if remaining.len() == before {
            return Err(SkeletonError::BoneCycle {
                bone: remaining[0].0.clone(),
            });
        }
    }

    Ok(bones)
}

/// Merge all bones in `skeletons` into a single [Skeleton].
///
/// Bones are matched by name with parents remapped into the combined skeleton.
/// This is necessary since model skinning data and animation rigs
/// can each define bones the other lacks.
pub fn merge_skeletons(skeletons: &[Skeleton]) -> Option<Skeleton> {
    let (base, skeletons) = skeletons.split_first()?;
    let mut combined = base.clone();

    for skeleton in skeletons {
        // Add missing bones first so parents can be remapped by name
        // in a second pass regardless of bone order.
        let mut added = Vec::new();
        for (source_index, bone) in skeleton.bones.iter().enumerate() {
            if !combined.bones.iter().any(|b| b.name == bone.name) {
                added.push((combined.bones.len(), source_index));
                combined.bones.push(Bone {
                    parent_index: None,
                    ..bone.clone()
                });
            }
        }

        for (combined_index, source_index) in added {
            combined.bones[combined_index].parent_index = skeleton.bones[source_index]
                .parent_index
                .and_then(|p| skeleton.bones.get(p))
                .and_then(|parent| combined.bones.iter().position(|b| b.name == parent.name));
        }
    }

    Some(combined)
}
