//! Utilities for converting animation data between bone spaces.
//!
//! Animation files sample each bone in armature space relative to the skeleton root.
//! Posing applications want "basis" values relative to the bone's parent and rest pose.
//! [Animation::basis_curves] and [BasisCurves::armature_space_frames]
//! convert between the two representations.
use std::collections::{BTreeMap, BTreeSet};

use glam::{Mat4, Quat, Vec3};
use log::warn;

use crate::{Skeleton, Transform, error::SkeletonError};

/// Discrete per frame animation samples in armature space.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct Animation {
    pub name: String,
    pub frames_per_second: f32,
    /// Armature space transforms for each sampled bone name at each frame.
    ///
    /// Frames do not need to sample every bone in the skeleton.
    pub frames: Vec<BTreeMap<String, Transform>>,
    /// Translation at each frame for the skeleton root.
    pub root_motion: Option<Vec<Vec3>>,
}

/// Ordered per bone curve values relative to the parent and rest pose.
///
/// Every channel for a bone has one value per animation frame.
#[derive(Debug, PartialEq, Clone)]
pub struct BasisCurves {
    pub translation: BTreeMap<String, Vec<Vec3>>,
    pub rotation: BTreeMap<String, Vec<Quat>>,
    pub scale: BTreeMap<String, Vec<Vec3>>,
}

impl Animation {
    /// Calculate curve values for each animated bone
    /// relative to the bone's parent and the skeleton's rest pose.
    ///
    /// Sampled bones missing from the skeleton are dropped.
    /// Bones missing from some frames use the rest pose for those frames.
    /// Any [root_motion](#structfield.root_motion) is folded into
    /// the root bone's transforms before converting.
    ///
    /// Returns an error if `skeleton` violates its hierarchy invariants.
    #[tracing::instrument(skip_all)]
    pub fn basis_curves(&self, skeleton: &Skeleton) -> Result<BasisCurves, SkeletonError> {
        skeleton.validate()?;

        let rest_armature = skeleton.armature_space_matrices();
        let animated = animated_bone_indices(self, skeleton);

        let mut translation_points = BTreeMap::new();
        let mut rotation_points = BTreeMap::new();
        let mut scale_points = BTreeMap::new();

        let mut warned_missing = BTreeSet::new();

        for (frame_index, frame) in self.frames.iter().enumerate() {
            // Track the animated armature pose for every bone
            // so children of unsampled bones still resolve correctly.
            let mut armature = rest_armature.clone();

            // Siblings share the same parent inverse, so compute each one at most once.
            let mut parent_inverses: Vec<Option<Mat4>> = vec![None; skeleton.bones.len()];

            for (i, bone) in skeleton.bones.iter().enumerate() {
                let mut sample = frame.get(&bone.name).map(|t| t.to_matrix());

                // Fold root motion into the root bone's armature space transform.
                if i == 0
                    && let Some(motion) = &self.root_motion
                {
                    let translation = motion.get(frame_index).copied().unwrap_or(Vec3::ZERO);
                    let m = sample.get_or_insert(rest_armature[i]);
                    m.w_axis += translation.extend(0.0);
                }

                match sample {
                    Some(m) => {
                        armature[i] = m;

                        let basis = match bone.parent_index {
                            Some(p) => {
                                let parent_inverse =
                                    *parent_inverses[p].get_or_insert_with(|| armature[p].inverse());
                                bone.transform.to_matrix().inverse() * (parent_inverse * m)
                            }
                            None => rest_armature[i].inverse() * m,
                        };

                        let (s, r, t) = basis.to_scale_rotation_translation();
                        insert_curve_point(&mut translation_points, &bone.name, t);
                        insert_rotation_point(&mut rotation_points, &bone.name, r);
                        insert_curve_point(&mut scale_points, &bone.name, s);
                    }
                    None => {
                        // Unsampled bones follow their parent at the rest pose offset.
                        if let Some(p) = bone.parent_index {
                            armature[i] = armature[p] * bone.transform.to_matrix();
                        }

                        if animated.contains(&i) {
                            if warned_missing.insert(i) {
                                warn!(
                                    "Bone {:?} is not sampled in every frame of {:?}. Missing frames use the rest pose.",
                                    bone.name, self.name
                                );
                            }
                            insert_curve_point(&mut translation_points, &bone.name, Vec3::ZERO);
                            insert_rotation_point(&mut rotation_points, &bone.name, Quat::IDENTITY);
                            insert_curve_point(&mut scale_points, &bone.name, Vec3::ONE);
                        }
                    }
                }
            }
        }

        Ok(BasisCurves {
            translation: translation_points,
            rotation: rotation_points,
            scale: scale_points,
        })
    }
}

impl BasisCurves {
    /// The number of frames in the longest channel.
    pub fn frame_count(&self) -> usize {
        self.translation
            .values()
            .map(Vec::len)
            .chain(self.rotation.values().map(Vec::len))
            .chain(self.scale.values().map(Vec::len))
            .max()
            .unwrap_or(0)
    }

    /// Calculate the armature space transform of each animated bone at each frame.
    ///
    /// This inverts [Animation::basis_curves],
    /// so converting the result back produces the same curve values.
    /// Channels shorter than [Self::frame_count] use the rest pose for missing frames.
    ///
    /// Returns an error if `skeleton` violates its hierarchy invariants.
    pub fn armature_space_frames(
        &self,
        skeleton: &Skeleton,
    ) -> Result<Vec<BTreeMap<String, Transform>>, SkeletonError> {
        skeleton.validate()?;

        let rest_armature = skeleton.armature_space_matrices();

        let mut frames = Vec::with_capacity(self.frame_count());
        for frame_index in 0..self.frame_count() {
            let mut armature = rest_armature.clone();
            let mut frame = BTreeMap::new();

            for (i, bone) in skeleton.bones.iter().enumerate() {
                match self.sample_basis(&bone.name, frame_index) {
                    Some(basis) => {
                        armature[i] = match bone.parent_index {
                            Some(p) => armature[p] * bone.transform.to_matrix() * basis.to_matrix(),
                            None => rest_armature[i] * basis.to_matrix(),
                        };
                        frame.insert(bone.name.clone(), Transform::from_matrix(armature[i]));
                    }
                    None => {
                        if let Some(p) = bone.parent_index {
                            armature[i] = armature[p] * bone.transform.to_matrix();
                        }
                    }
                }
            }

            frames.push(frame);
        }

        Ok(frames)
    }

    fn sample_basis(&self, name: &str, frame: usize) -> Option<Transform> {
        let translation = self.translation.get(name);
        let rotation = self.rotation.get(name);
        let scale = self.scale.get(name);
        if translation.is_none() && rotation.is_none() && scale.is_none() {
            return None;
        }

        Some(Transform {
            translation: translation
                .and_then(|c| c.get(frame))
                .copied()
                .unwrap_or(Vec3::ZERO),
            rotation: rotation
                .and_then(|c| c.get(frame))
                .copied()
                .unwrap_or(Quat::IDENTITY),
            scale: scale.and_then(|c| c.get(frame)).copied().unwrap_or(Vec3::ONE),
        })
    }
}

fn animated_bone_indices(animation: &Animation, skeleton: &Skeleton) -> BTreeSet<usize> {
    let name_to_index: BTreeMap<&str, usize> = skeleton
        .bones
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.as_str(), i))
        .collect();

    let mut indices = BTreeSet::new();
    let mut unknown = BTreeSet::new();
    for frame in &animation.frames {
        for name in frame.keys() {
            match name_to_index.get(name.as_str()) {
                Some(i) => {
                    indices.insert(*i);
                }
                None => {
                    if unknown.insert(name.as_str()) {
                        warn!(
                            "No bone in skeleton for sampled bone {name:?}. Dropping its samples."
                        );
                    }
                }
            }
        }
    }

    // Root motion animates the root even if no frame samples it.
    if animation.root_motion.is_some() && !skeleton.bones.is_empty() {
        indices.insert(0);
    }

    indices
}

fn insert_curve_point<T: Copy>(points: &mut BTreeMap<String, Vec<T>>, name: &str, point: T) {
    points
        .entry(name.to_string())
        .and_modify(|channel| channel.push(point))
        .or_insert(vec![point]);
}

fn insert_rotation_point(points: &mut BTreeMap<String, Vec<Quat>>, name: &str, rotation: Quat) {
    let channel = points.entry(name.to_string()).or_default();

    // The decomposition can flip sign between frames since q and -q
    // represent the same rotation. Negate to keep each sample in the same
    // hemisphere as the immediately preceding frame.
    let rotation = match channel.last() {
        Some(prev) if prev.dot(rotation) < 0.0 => -rotation,
        _ => rotation,
    };

    channel.push(rotation);
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::vec3;

    use crate::skeleton::Bone;

    macro_rules! assert_matrix_relative_eq {
        ($a:expr, $b:expr) => {
            assert!(
                $a.to_cols_array()
                    .iter()
                    .zip($b.to_cols_array().iter())
                    .all(|(a, b)| approx::relative_eq!(a, b, epsilon = 0.0001f32)),
                "Matrices not equal to within 0.0001.\nleft = {:?}\nright = {:?}",
                $a,
                $b
            )
        };
    }

    fn bind_pose_skeleton() -> Skeleton {
        Skeleton {
            bones: vec![
                Bone {
                    name: "root".to_string(),
                    transform: Transform {
                        translation: vec3(0.0, 1.0, 0.0),
                        rotation: Quat::from_rotation_z(0.5),
                        scale: Vec3::ONE,
                    },
                    parent_index: None,
                },
                Bone {
                    name: "arm".to_string(),
                    transform: Transform {
                        translation: vec3(2.0, 0.0, 0.0),
                        rotation: Quat::from_rotation_x(-0.3),
                        scale: Vec3::ONE,
                    },
                    parent_index: Some(0),
                },
                Bone {
                    name: "hand".to_string(),
                    transform: Transform {
                        translation: vec3(0.5, 0.25, 0.0),
                        rotation: Quat::IDENTITY,
                        scale: vec3(-1.0, 1.0, 1.0),
                    },
                    parent_index: Some(1),
                },
            ],
        }
    }

    // Accumulate local pose transforms so tests can author frames in armature space.
    fn armature_frame(skeleton: &Skeleton, locals: &[Transform]) -> BTreeMap<String, Transform> {
        let mut armature = vec![Mat4::IDENTITY; locals.len()];
        for i in 0..locals.len() {
            armature[i] = match skeleton.bones[i].parent_index {
                Some(p) => armature[p] * locals[i].to_matrix(),
                None => locals[i].to_matrix(),
            };
        }

        skeleton
            .bones
            .iter()
            .zip(armature)
            .map(|(bone, m)| (bone.name.clone(), Transform::from_matrix(m)))
            .collect()
    }

    #[test]
    fn basis_curves_round_trip_bind_pose() {
        let skeleton = bind_pose_skeleton();

        // Uniform scale on interior bones and mirroring or stretch on the leaf
        // keep every armature pose expressible as a 10 component transform.
        let frames = vec![
            armature_frame(
                &skeleton,
                &[
                    Transform {
                        translation: vec3(0.0, 1.5, 0.0),
                        rotation: Quat::from_rotation_z(0.7),
                        scale: vec3(2.0, 2.0, 2.0),
                    },
                    Transform {
                        translation: vec3(2.0, 0.0, 0.1),
                        rotation: Quat::from_rotation_x(-0.5),
                        scale: Vec3::ONE,
                    },
                    Transform {
                        translation: vec3(0.5, 0.25, 0.0),
                        rotation: Quat::from_rotation_y(0.25),
                        scale: vec3(-1.0, 1.0, 1.0),
                    },
                ],
            ),
            armature_frame(
                &skeleton,
                &[
                    Transform {
                        translation: vec3(0.0, 2.0, 0.5),
                        rotation: Quat::from_rotation_z(-0.7),
                        scale: vec3(0.5, 0.5, 0.5),
                    },
                    Transform {
                        translation: vec3(2.0, 0.0, 0.2),
                        rotation: Quat::from_rotation_x(0.5),
                        scale: Vec3::ONE,
                    },
                    Transform {
                        translation: vec3(0.5, 0.25, -0.1),
                        rotation: Quat::from_rotation_y(-0.25),
                        scale: vec3(-1.0, 1.0, 2.0),
                    },
                ],
            ),
        ];

        let animation = Animation {
            name: "walk".to_string(),
            frames_per_second: 30.0,
            frames: frames.clone(),
            root_motion: None,
        };

        let curves = animation.basis_curves(&skeleton).unwrap();
        assert_eq!(2, curves.frame_count());

        let restored = curves.armature_space_frames(&skeleton).unwrap();
        assert_eq!(frames.len(), restored.len());
        for (expected, actual) in frames.iter().zip(&restored) {
            assert_eq!(
                expected.keys().collect::<Vec<_>>(),
                actual.keys().collect::<Vec<_>>()
            );
            for (name, transform) in expected {
                assert_matrix_relative_eq!(transform.to_matrix(), actual[name].to_matrix());
            }
        }
    }

    #[test]
    fn basis_curves_round_trip_identity_rest() {
        // Unanimated props store identity rest transforms
        // and express the entire pose through per frame data.
        let skeleton = Skeleton {
            bones: vec![
                Bone {
                    name: "piece".to_string(),
                    transform: Transform::IDENTITY,
                    parent_index: None,
                },
                Bone {
                    name: "lid".to_string(),
                    transform: Transform::IDENTITY,
                    parent_index: Some(0),
                },
            ],
        };

        let pose = Transform {
            translation: vec3(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(1.2),
            scale: vec3(2.0, 2.0, 2.0),
        };
        let frames = vec![armature_frame(&skeleton, &[pose, Transform::IDENTITY])];

        let animation = Animation {
            name: "static".to_string(),
            frames_per_second: 30.0,
            frames: frames.clone(),
            root_motion: None,
        };

        let curves = animation.basis_curves(&skeleton).unwrap();

        // With identity rest transforms the root basis is the armature pose itself.
        assert_eq!(vec![pose.translation], curves.translation["piece"]);

        let restored = curves.armature_space_frames(&skeleton).unwrap();
        for (name, transform) in &frames[0] {
            assert_matrix_relative_eq!(transform.to_matrix(), restored[0][name].to_matrix());
        }
    }

    #[test]
    fn basis_curves_rotation_continuity() {
        let skeleton = Skeleton {
            bones: vec![Bone {
                name: "spin".to_string(),
                transform: Transform::IDENTITY,
                parent_index: None,
            }],
        };

        // Angles that cross the 180 degree boundary where
        // matrix decomposition flips the quaternion hemisphere.
        let angles = [0.0f32, 120.0, 240.0, 360.0];
        let frames = angles
            .iter()
            .map(|degrees| {
                [(
                    "spin".to_string(),
                    Transform {
                        rotation: Quat::from_rotation_y(degrees.to_radians()),
                        ..Transform::IDENTITY
                    },
                )]
                .into()
            })
            .collect();

        let animation = Animation {
            name: "spin".to_string(),
            frames_per_second: 30.0,
            frames,
            root_motion: None,
        };

        let rotations = &animation.basis_curves(&skeleton).unwrap().rotation["spin"];
        assert_eq!(angles.len(), rotations.len());

        for pair in rotations.windows(2) {
            assert!(pair[0].dot(pair[1]) >= 0.0);
        }

        // Sign correction must not change the rotation itself.
        for (degrees, rotation) in angles.iter().zip(rotations) {
            assert_matrix_relative_eq!(
                Mat4::from_rotation_y(degrees.to_radians()),
                Mat4::from_quat(*rotation)
            );
        }
    }

    #[test]
    fn basis_curves_drops_unknown_bones() {
        let skeleton = Skeleton {
            bones: vec![Bone {
                name: "root".to_string(),
                transform: Transform::IDENTITY,
                parent_index: None,
            }],
        };

        let animation = Animation {
            name: "test".to_string(),
            frames_per_second: 30.0,
            frames: vec![
                [
                    ("root".to_string(), Transform::IDENTITY),
                    ("ghost".to_string(), Transform::IDENTITY),
                ]
                .into(),
            ],
            root_motion: None,
        };

        let curves = animation.basis_curves(&skeleton).unwrap();
        assert_eq!(vec!["root"], curves.translation.keys().collect::<Vec<_>>());
    }

    #[test]
    fn basis_curves_missing_frames_use_rest_pose() {
        let skeleton = Skeleton {
            bones: vec![
                Bone {
                    name: "root".to_string(),
                    transform: Transform::IDENTITY,
                    parent_index: None,
                },
                Bone {
                    name: "flap".to_string(),
                    transform: Transform {
                        translation: vec3(0.0, 1.0, 0.0),
                        ..Transform::IDENTITY
                    },
                    parent_index: Some(0),
                },
            ],
        };

        let animation = Animation {
            name: "test".to_string(),
            frames_per_second: 30.0,
            frames: vec![
                [(
                    "flap".to_string(),
                    Transform {
                        translation: vec3(0.0, 1.0, 0.5),
                        ..Transform::IDENTITY
                    },
                )]
                .into(),
                BTreeMap::new(),
            ],
            root_motion: None,
        };

        let curves = animation.basis_curves(&skeleton).unwrap();
        assert_eq!(
            vec![vec3(0.0, 0.0, 0.5), Vec3::ZERO],
            curves.translation["flap"]
        );
        assert_eq!(Quat::IDENTITY, curves.rotation["flap"][1]);
        assert_eq!(Vec3::ONE, curves.scale["flap"][1]);
    }

    #[test]
    fn basis_curves_folds_root_motion() {
        let skeleton = Skeleton {
            bones: vec![Bone {
                name: "root".to_string(),
                transform: Transform::IDENTITY,
                parent_index: None,
            }],
        };

        let animation = Animation {
            name: "run".to_string(),
            frames_per_second: 30.0,
            frames: vec![BTreeMap::new(), BTreeMap::new()],
            root_motion: Some(vec![vec3(1.0, 0.0, 0.0), vec3(2.0, 0.0, 0.0)]),
        };

        let curves = animation.basis_curves(&skeleton).unwrap();
        assert_eq!(
            vec![vec3(1.0, 0.0, 0.0), vec3(2.0, 0.0, 0.0)],
            curves.translation["root"]
        );
    }

    #[test]
    fn basis_curves_invalid_skeleton() {
        let skeleton = Skeleton {
            bones: vec![Bone {
                name: "root".to_string(),
                transform: Transform::IDENTITY,
                parent_index: Some(5),
            }],
        };

        let animation = Animation {
            name: "test".to_string(),
            frames_per_second: 30.0,
            frames: Vec::new(),
            root_motion: None,
        };

        assert!(matches!(
            animation.basis_curves(&skeleton),
            Err(SkeletonError::ParentIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn frame_count_longest_channel() {
        let curves = BasisCurves {
            translation: [("a".to_string(), vec![Vec3::ZERO; 2])].into(),
            rotation: [("b".to_string(), vec![Quat::IDENTITY; 5])].into(),
            scale: BTreeMap::new(),
        };
        assert_eq!(5, curves.frame_count());
    }

    #[test]
    fn insert_rotation_point_negates_flipped() {
        let mut points = BTreeMap::new();
        insert_rotation_point(&mut points, "a", Quat::from_xyzw(0.0, 0.0, 0.0, 1.0));
        insert_rotation_point(&mut points, "a", Quat::from_xyzw(0.0, 0.0, 0.0, -1.0));
        assert_eq!(
            vec![
                Quat::from_xyzw(0.0, 0.0, 0.0, 1.0),
                Quat::from_xyzw(0.0, 0.0, 0.0, 1.0)
            ],
            points["a"]
        );
    }
}
