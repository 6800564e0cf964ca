//! Merged mesh data for editing and the conversions to and from submeshes.
//!
//! Game models draw one submesh per material with hard per draw bone limits.
//! Editing applications want all of that geometry as a single mesh.
//! [merge_submeshes] combines the submeshes of a model and
//! [split_mesh] rebuilds draw ready submeshes from the edited result.
use glam::{Vec2, Vec3, Vec4};
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::skinning::Influence;

pub use merge::merge_submeshes;
pub use split::split_mesh;

mod merge;
mod split;

/// Every submesh of a model combined into one editable mesh.
///
/// Vertex positions and skin weights are stored per vertex.
/// Normals, tangents, and named layers are stored per loop,
/// where a loop is one corner of one face in face order.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct MergedMesh {
    pub positions: Vec<Vec3>,
    /// Per bone skin weights with vertex indices into [positions](#structfield.positions).
    pub influences: Vec<Influence>,
    pub faces: Vec<Face>,
    /// Loop normals or empty if no submesh had normals.
    pub normals: Vec<Vec3>,
    /// Loop tangents or empty if no submesh had tangents.
    pub tangents: Vec<Vec4>,
    /// Loop UV layers unioned by name across all materials.
    pub uv_layers: IndexMap<SmolStr, Vec<Vec2>>,
    /// Loop color layers unioned by name across all materials.
    pub color_layers: IndexMap<SmolStr, Vec<Vec4>>,
}

/// A face over merged vertices tagged with its originating material.
///
/// Merging only produces triangles.
/// Other sizes can only come from edits and will not split.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct Face {
    /// Indices into [positions](struct.MergedMesh.html#structfield.positions).
    pub vertex_indices: Vec<u32>,
    pub material_index: usize,
}

impl MergedMesh {
    /// The total number of face corners.
    pub fn loop_count(&self) -> usize {
        self.faces.iter().map(|f| f.vertex_indices.len()).sum()
    }
}

/// Options controlling [split_mesh].
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct SplitOptions {
    /// The maximum number of bones one submesh may reference.
    ///
    /// Materials that reference more bones are split into multiple submeshes.
    pub max_bones_per_submesh: usize,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            // The bone table limit for FLVER2 meshes in older games.
            max_bones_per_submesh: 38,
        }
    }
}
