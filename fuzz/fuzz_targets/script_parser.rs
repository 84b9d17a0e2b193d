#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use kvbench::generator::{CommandSource, Feedback, ScriptSource};
use kvbench::{Config, KeyType};
use libfuzzer_sys::fuzz_target;
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Arbitrary, Debug)]
struct Input {
    key_type: u8,
    text: String,
}

fuzz_target!(|input: Input| {
    let key_type = match input.key_type % 5 {
        0 => KeyType::Uint8,
        1 => KeyType::Uint16,
        2 => KeyType::Uint32,
        3 => KeyType::Uint64,
        _ => KeyType::Binary,
    };
    let mut conf = Config::default();
    conf.key_type(key_type);

    // parsing may reject the input but must never panic, and an accepted
    // script must drain without panicking either
    if let Ok(mut source) = ScriptSource::from_reader(Arc::new(conf), input.text.as_bytes()) {
        let feedback = Feedback::default();
        while source.next_command(&feedback).is_some() {}
    }
});
