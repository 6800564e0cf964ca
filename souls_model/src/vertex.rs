//! Utilities for working with vertex buffer data.
//!
//! The main type for representing vertex data is [AttributeData].
//! Storing the values separately like this is often called a "struct of arrays" layout.
//! This makes editing individual attributes cache friendly
//! and allows submeshes to carry different sets of attributes.
//! Game formats interleave the attributes per vertex,
//! so codecs pack and unpack a collection of [AttributeData] per buffer.
use glam::{Vec2, Vec3, Vec4};
use smol_str::SmolStr;

/// The per vertex values for a vertex attribute.
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub enum AttributeData {
    Position(Vec<Vec3>),
    Normal(Vec<Vec3>),
    Tangent(Vec<Vec4>),
    /// A UV channel with the layer name used by materials.
    Uv(SmolStr, Vec<Vec2>),
    /// A color channel with the layer name used by materials.
    Color(SmolStr, Vec<Vec4>),
    /// Indices into the submesh [bone_table](struct.Submesh.html#structfield.bone_table).
    BoneIndices(Vec<[u16; 4]>),
    BoneWeights(Vec<Vec4>),
}

impl AttributeData {
    pub fn len(&self) -> usize {
        match self {
            AttributeData::Position(v) => v.len(),
            AttributeData::Normal(v) => v.len(),
            AttributeData::Tangent(v) => v.len(),
            AttributeData::Uv(_, v) => v.len(),
            AttributeData::Color(_, v) => v.len(),
            AttributeData::BoneIndices(v) => v.len(),
            AttributeData::BoneWeights(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A drawable range of vertex data with a single material.
///
/// Each submesh owns its vertex buffer.
/// Identical vertices shared between submeshes are only combined
/// when merging into a [MergedMesh](crate::mesh::MergedMesh).
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, PartialEq, Clone)]
pub struct Submesh {
    /// The index of the [Material](crate::Material) for this submesh.
    pub material_index: usize,
    /// Maps local bone indices in [AttributeData::BoneIndices]
    /// to bone indices in the model [Skeleton](crate::Skeleton).
    ///
    /// Games cap the table length, so one material may need several submeshes.
    pub bone_table: Vec<u16>,
    pub attributes: Vec<AttributeData>,
    /// Triangle list indices into [attributes](#structfield.attributes).
    pub indices: Vec<u32>,
}

impl Submesh {
    /// The vertex count from the first attribute.
    ///
    /// All attributes should have the same length.
    pub fn vertex_count(&self) -> usize {
        self.attributes.first().map(|a| a.len()).unwrap_or_default()
    }

    pub fn positions(&self) -> Option<&[Vec3]> {
        self.attributes.iter().find_map(|a| match a {
            AttributeData::Position(values) => Some(values.as_slice()),
            _ => None,
        })
    }

    pub fn bone_indices(&self) -> Option<&[[u16; 4]]> {
        self.attributes.iter().find_map(|a| match a {
            AttributeData::BoneIndices(values) => Some(values.as_slice()),
            _ => None,
        })
    }

    pub fn bone_weights(&self) -> Option<&[Vec4]> {
        self.attributes.iter().find_map(|a| match a {
            AttributeData::BoneWeights(values) => Some(values.as_slice()),
            _ => None,
        })
    }
}
