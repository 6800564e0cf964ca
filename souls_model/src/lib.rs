//! # souls_model
//! souls_model provides high level data access for FromSoftware model and
//! animation data in a form independent of any editing application.
//!
//! Geometry uses merged meshes for editing and submeshes for drawing.
//! Animations convert between armature space samples and pose basis curves.
//! Binary model and animation codecs are intentionally out of scope.
//! Importers supply decode functions for the formats they support
//! and resolve files with [souls_binder](../souls_binder/index.html).
use std::hash::{BuildHasher, Hash};

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::vertex::Submesh;

pub use animation::{Animation, BasisCurves};
pub use mesh::{Face, MergedMesh, SplitOptions, merge_submeshes, split_mesh};
pub use skeleton::{Bone, Skeleton, merge_skeletons};
pub use skinning::{Influence, SkinWeight};
pub use transform::Transform;

pub mod animation;
pub mod batch;
pub mod error;
pub mod mesh;
pub mod skeleton;
pub mod skinning;
pub mod transform;
pub mod vertex;

/// The data for one model, including its skeleton, materials, and geometry.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct ModelRoot {
    /// The name of the model, usually the file stem like `"c2240"`.
    pub name: String,
    pub skeleton: Skeleton,
    pub materials: Vec<Material>,
    pub submeshes: Vec<Submesh>,
}

#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct Material {
    pub name: String,
    /// The game path of the material or shader definition
    /// like `"N:\\FDP\\data\\Material\\mtd\\p_metal[sm].mtd"`.
    pub shader_path: String,
    /// The names of the UV layers sampled by this material
    /// in submesh attribute order.
    pub uv_layer_names: Vec<SmolStr>,
    /// The names of the color layers used by this material
    /// in submesh attribute order.
    pub color_layer_names: Vec<SmolStr>,
}

pub trait IndexMapExt<K> {
    /// The index of `key`, inserting a new entry at the end if necessary.
    fn entry_index(&mut self, key: K) -> usize;
}

impl<K: Hash + Eq, S: BuildHasher> IndexMapExt<K> for IndexMap<K, usize, S> {
    fn entry_index(&mut self, key: K) -> usize {
        let index = self.len();
        *self.entry(key).or_insert(index)
    }
}
