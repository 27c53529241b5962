#![no_main]

use libfuzzer_sys::fuzz_target;
use simnet::core::codec::{Fetcher, FrameFetcher, PacketCodec};
use simnet::Packet;

fuzz_target!(|data: &[u8]| {
    // Whole-frame decoding must reject, never panic
    let _ = Packet::from_bytes(data);

    // Streaming decode with the input cut at every third byte
    if let Ok(codec) = PacketCodec::new(64 * 1024) {
        let mut fetcher = FrameFetcher::new(codec);
        for read in data.chunks(3) {
            if fetcher.fetch(read).is_err() {
                assert_eq!(fetcher.buffered(), 0);
                break;
            }
        }
    }
});
