#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|skeletons: Vec<souls_model::Skeleton>| {
    let _ = souls_model::merge_skeletons(&skeletons);
});
