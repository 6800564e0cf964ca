#![no_main]

use libfuzzer_sys::fuzz_target;

#[derive(Debug, arbitrary::Arbitrary)]
struct Input {
    mesh: souls_model::MergedMesh,
    materials: Vec<souls_model::Material>,
    skeleton: souls_model::Skeleton,
    options: souls_model::SplitOptions,
}

fuzz_target!(|input: Input| {
    let _ = souls_model::split_mesh(
        &input.mesh,
        &input.materials,
        &input.skeleton,
        &input.options,
    );
});
