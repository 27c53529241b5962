#![no_main]

use libfuzzer_sys::fuzz_target;
use simnet::core::codec::{Fetcher, FrameFetcher, FrameSeparator, PacketCodec, Separator};
use simnet::Packet;

fuzz_target!(|input: (u16, Vec<u8>)| {
    let (chunk, payload) = input;
    let Ok(codec) = PacketCodec::new(64 * 1024) else {
        return;
    };
    let Ok(mut separator) = FrameSeparator::new(codec, usize::from(chunk).max(1)) else {
        return;
    };

    let packet = Packet::new(payload);
    let Ok(chunks) = separator.separate(&packet) else {
        return;
    };

    let mut fetcher = FrameFetcher::new(codec);
    let mut out = Vec::new();
    for piece in &chunks {
        out.extend(fetcher.fetch(piece).expect("separator output must decode"));
    }
    assert_eq!(out, vec![packet]);
});
