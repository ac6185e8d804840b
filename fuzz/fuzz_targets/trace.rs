#![no_main]
use libfuzzer_sys::{fuzz_target, Corpus};

fuzz_target!(|data: &[u8]| -> Corpus {
    let _ = env_logger::try_init();
    if hangover::fuzz_one_input(data) < 0 {
        Corpus::Reject
    } else {
        Corpus::Keep
    }
});
