#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|root: souls_model::ModelRoot| {
    let _ = souls_model::merge_submeshes(&root);
});
