use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkeletonError {
    #[error("bone {bone:?} references parent bone {parent:?} not present in the skeleton")]
    MissingParent { bone: String, parent: String },

    #[error("bone {bone:?} is part of a parenting cycle")]
    BoneCycle { bone: String },

    #[error("duplicate bone name {name:?}")]
    DuplicateBoneName { name: String },

    #[error(
        "parent index {parent_index} for bone {bone:?} out of range for skeleton with {bone_count} bones"
    )]
    ParentIndexOutOfRange {
        bone: String,
        parent_index: usize,
        bone_count: usize,
    },
}

#[derive(Debug, Error)]
pub enum MergeMeshError {
    #[error("submesh {submesh_index} has no position attribute")]
    MissingPositions { submesh_index: usize },

    #[error(
        "submesh {submesh_index} attribute lengths do not match: expected {expected}, found {found}"
    )]
    AttributeLengthMismatch {
        submesh_index: usize,
        expected: usize,
        found: usize,
    },

    #[error("submesh {submesh_index} index count {index_count} is not a multiple of 3")]
    InvalidTriangleList {
        submesh_index: usize,
        index_count: usize,
    },

    #[error(
        "submesh {submesh_index} vertex index {vertex_index} out of range for {vertex_count} vertices"
    )]
    VertexIndexOutOfRange {
        submesh_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    #[error(
        "submesh {submesh_index} material index {material_index} out of range for {material_count} materials"
    )]
    MaterialIndexOutOfRange {
        submesh_index: usize,
        material_index: usize,
        material_count: usize,
    },

    #[error(
        "submesh {submesh_index} vertex {vertex_index} bone index {bone_index} out of range for bone table of length {bone_table_len}"
    )]
    BoneIndexOutOfRange {
        submesh_index: usize,
        vertex_index: usize,
        bone_index: u16,
        bone_table_len: usize,
    },

    #[error(
        "submesh {submesh_index} bone table entry {entry} out of range for skeleton with {bone_count} bones"
    )]
    BoneTableEntryOutOfRange {
        submesh_index: usize,
        entry: u16,
        bone_count: usize,
    },
}

#[derive(Debug, Error)]
pub enum SplitMeshError {
    #[error("face {face_index} has {vertex_count} vertices but only triangles are supported")]
    NonTriangularFace {
        face_index: usize,
        vertex_count: usize,
    },

    #[error(
        "face {face_index} material index {material_index} out of range for {material_count} materials"
    )]
    MaterialIndexOutOfRange {
        face_index: usize,
        material_index: usize,
        material_count: usize,
    },

    #[error(
        "face {face_index} vertex index {vertex_index} out of range for {vertex_count} vertices"
    )]
    VertexIndexOutOfRange {
        face_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    #[error("vertex {vertex_index} has {count} bone influences but at most 4 are supported")]
    TooManyBoneInfluences { vertex_index: usize, count: usize },

    #[error(
        "vertex {vertex_index} has no bone influences and the skeleton has {bone_count} bones instead of exactly one"
    )]
    UnweightedVertex {
        vertex_index: usize,
        bone_count: usize,
    },

    #[error("influence references bone {bone:?} not present in the skeleton")]
    UnknownInfluenceBone { bone: String },

    #[error("bone {bone:?} at index {bone_index} does not fit in a 16 bit bone table")]
    BoneIndexUnrepresentable { bone: String, bone_index: usize },

    #[error(
        "influence for bone {bone:?} references vertex {vertex_index} out of range for {vertex_count} vertices"
    )]
    InfluenceVertexOutOfRange {
        bone: String,
        vertex_index: u32,
        vertex_count: usize,
    },

    #[error("loop attribute layer {layer:?} has {found} values but the mesh has {expected} loops")]
    LoopCountMismatch {
        layer: String,
        expected: usize,
        found: usize,
    },

    #[error("material {material:?} uses UV layer {layer:?} not present in the mesh")]
    MissingUvLayer { material: String, layer: String },

    #[error(
        "face {face_index} alone references {bone_count} bones, exceeding the submesh limit {limit}"
    )]
    FaceBoneCountExceedsLimit {
        face_index: usize,
        bone_count: usize,
        limit: usize,
    },
}
