#![no_main]

use libfuzzer_sys::fuzz_target;

#[derive(Debug, arbitrary::Arbitrary)]
struct Input {
    animation: souls_model::Animation,
    skeleton: souls_model::Skeleton,
}

fuzz_target!(|input: Input| {
    let _ = input.animation.basis_curves(&input.skeleton);
});
